//! Shared helpers for integration tests

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use camrelay_server::camera_directory::MemoryDirectory;
use camrelay_server::state::{AppConfig, AppState};
use camrelay_server::web_api;
use reqwest::{Client, Method};
use tokio::net::TcpListener;

const FAKE_FFMPEG: &str = include_str!("../fixtures/fake_ffmpeg.sh");

pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    let path = dir.join("ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{}", FAKE_FFMPEG)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Serve the full router on an ephemeral port
pub async fn spawn_server(dir: &Path) -> (AppState, SocketAddr) {
    let config = AppConfig {
        ffmpeg_bin: fake_ffmpeg(dir),
        records_dir: dir.join("records"),
        viewer_queue_depth: 4,
        ..Default::default()
    };
    let state = AppState::new(config, Arc::new(MemoryDirectory::new()));
    let app = web_api::create_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, addr)
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{}{}", addr, path)
}

/// JSON API call, returns status and the parsed body
pub async fn http(
    addr: SocketAddr,
    method: Method,
    path: &str,
    body: Option<serde_json::Value>,
) -> (u16, serde_json::Value) {
    let mut request = Client::new().request(method, url(addr, path));
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.unwrap();
    let status = response.status().as_u16();
    let json = response.json::<serde_json::Value>().await.unwrap();

    (status, json)
}
