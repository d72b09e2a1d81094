//! Camrelay Server
//!
//! Main entry point for the camera relay.

use camrelay_server::{
    camera_directory::MemoryDirectory,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camrelay_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Camrelay Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env();
    tracing::info!(
        ffmpeg = %config.ffmpeg_bin.display(),
        records_dir = %config.records_dir.display(),
        stream_fps = config.stream_fps,
        stream_quality = config.stream_quality,
        viewer_queue_depth = config.viewer_queue_depth,
        "Configuration loaded"
    );

    let directory = match &config.cameras_file {
        Some(path) => Arc::new(MemoryDirectory::load(path).await?),
        None => {
            tracing::warn!("CAMERAS_FILE not set, starting with an empty camera directory");
            Arc::new(MemoryDirectory::new())
        }
    };

    tokio::fs::create_dir_all(&config.records_dir).await?;

    // Create application state
    let state = AppState::new(config, directory);

    // Initial reconcile
    let report = state.streams.reconcile_all().await?;
    for failure in &report.failed {
        tracing::error!(
            camera_id = %failure.camera_id,
            error_code = %failure.error_code,
            message = %failure.message,
            "Camera failed to start"
        );
    }

    let mut app = web_api::create_router(state.clone());
    if let Some(static_dir) = &state.config.static_dir {
        let serve_dir = ServeDir::new(static_dir)
            .not_found_service(ServeFile::new(static_dir.join("index.html")));
        app = app.fallback_service(serve_dir);
        tracing::info!(static_dir = %static_dir.display(), "Static file serving enabled");
    }
    let app = app
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
            // Closing pipelines also closes every viewer socket
            shutdown_state.registry().stop_all().await;
        })
        .await?;

    state.registry().stop_all().await;
    tracing::info!("Server stopped");

    Ok(())
}
