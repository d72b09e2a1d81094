//! WebAPI - HTTP and WebSocket endpoints
//!
//! ## Responsibilities
//!
//! - JSON control API (pipelines, cameras, recordings)
//! - `/stream/:camera_id` live viewer sockets and `/events`
//! - Static serving of finished recordings

mod routes;
mod stream_routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::{ApiResponse, CameraRecordState, HealthResponse, SystemStatus};
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        pipelines: state.registry().len().await,
        event_clients: state.realtime.connection_count(),
    };

    Json(response)
}

/// Pipelines, record sessions and event clients in one view
pub async fn system_status(State(state): State<AppState>) -> impl IntoResponse {
    let recordings = state
        .recorder
        .active()
        .into_iter()
        .map(|(camera_id, record)| CameraRecordState {
            camera_id,
            state: record,
        })
        .collect();

    Json(ApiResponse::success(SystemStatus {
        pipelines: state.registry().status().await,
        recordings,
        event_clients: state.realtime.connection_count(),
    }))
}
