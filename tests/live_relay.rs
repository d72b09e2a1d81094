//! End-to-end tests over HTTP and WebSocket with a fake ffmpeg

#![cfg(unix)]

mod common;

use std::time::Duration;

use camrelay_server::camera_directory::CameraDescriptor;
use futures::StreamExt;
use serde_json::json;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite};
use tungstenite::Message;

use common::{http, spawn_server, url};
use reqwest::Method;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn viewer_receives_frames_until_camera_removed() {
    let tmp = tempfile::tempdir().unwrap();
    let (state, addr) = spawn_server(tmp.path()).await;

    state
        .directory
        .upsert_camera(CameraDescriptor::new("C1", "rtsp://admin:pw@cam1/sub"))
        .await
        .unwrap();
    let report = state.streams.reconcile_all().await.unwrap();
    assert_eq!(report.started, vec!["C1"]);

    let (mut ws, _) = connect_async(format!("ws://{}/stream/C1", addr))
        .await
        .unwrap();

    let first = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
    match first {
        Message::Binary(data) => {
            assert_eq!(&data[..2], &[0xFF, 0xD8]);
            assert_eq!(&data[data.len() - 2..], &[0xFF, 0xD9]);
        }
        other => panic!("expected a binary frame, got {:?}", other),
    }

    state.directory.remove_camera("C1").await.unwrap();
    let report = state.streams.reconcile_all().await.unwrap();
    assert_eq!(report.stopped, vec!["C1"]);
    assert!(state.registry().get("C1").await.is_none());

    // Queued frames may still arrive before the close
    let closed = timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Binary(_))) => continue,
                _ => break,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn unknown_camera_is_rejected_without_upgrade() {
    let tmp = tempfile::tempdir().unwrap();
    let (_state, addr) = spawn_server(tmp.path()).await;

    match connect_async(format!("ws://{}/stream/nope", addr)).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 404);
            assert!(response.body().as_ref().map_or(true, |b| b.is_empty()));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}

#[tokio::test]
async fn events_report_pipeline_lifecycle() {
    let tmp = tempfile::tempdir().unwrap();
    let (state, addr) = spawn_server(tmp.path()).await;

    let (mut events, _) = connect_async(format!("ws://{}/events", addr)).await.unwrap();
    timeout(WAIT, async {
        while state.realtime.connection_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let (status, body) = http(
        addr,
        Method::PUT,
        "/api/cameras/C2",
        Some(json!({ "preview_url": "rtsp://cam2/sub", "record_url": "rtsp://cam2/main" })),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"]["reconcile"]["started"][0], "C2");

    let msg = timeout(WAIT, events.next()).await.unwrap().unwrap().unwrap();
    let text = match msg {
        Message::Text(text) => text,
        other => panic!("expected text event, got {:?}", other),
    };
    let event: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(event["type"], "pipeline_started");
    assert_eq!(event["data"]["camera_id"], "C2");

    let (status, body) = http(addr, Method::GET, "/api/pipelines", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["camera_id"], "C2");

    state.registry().stop_all().await;
}

#[tokio::test]
async fn record_then_convert_over_http() {
    let tmp = tempfile::tempdir().unwrap();
    let (state, addr) = spawn_server(tmp.path()).await;
    state
        .directory
        .upsert_camera(
            CameraDescriptor::new("C1", "rtsp://cam1/sub").with_record_url("rtsp://cam1/main"),
        )
        .await
        .unwrap();

    let (status, body) = http(
        addr,
        Method::POST,
        "/api/records/C1/start",
        Some(json!({ "user": "alice" })),
    )
    .await;
    assert_eq!(status, 201);
    let ts_file = body["data"]["file"].as_str().unwrap().to_string();
    assert!(ts_file.starts_with("record_C1_") && ts_file.ends_with(".ts"));

    let (status, body) = http(
        addr,
        Method::POST,
        "/api/records/C1/start",
        Some(json!({ "user": "alice" })),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error_code"], "ALREADY_RECORDING");

    let (status, body) = http(addr, Method::POST, "/api/records/C1/stop", None).await;
    assert_eq!(status, 200);
    let mp4_file = body["data"]["file"].as_str().unwrap().to_string();
    assert_eq!(mp4_file, ts_file.replace(".ts", ".mp4"));
    assert!(tmp.path().join("records/alice").join(&mp4_file).exists());

    let (_, body) = http(addr, Method::GET, "/api/records/C1", None).await;
    assert_eq!(body["data"]["state"], "idle");

    let (status, body) = http(addr, Method::POST, "/api/records/C1/stop", None).await;
    assert_eq!(status, 409);
    assert_eq!(body["error_code"], "NOT_RECORDING");

    let (_, body) = http(addr, Method::GET, "/api/users/alice/records", None).await;
    assert_eq!(body["data"][0]["file"], mp4_file.as_str());

    let response = reqwest::get(url(addr, &format!("/records/alice/{}", mp4_file)))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"fake transport stream");
}
