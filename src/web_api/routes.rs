//! API Routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use tower_http::services::ServeDir;

use super::stream_routes;
use crate::camera_directory::CameraDirectory;
use crate::error::Result;
use crate::models::{ApiResponse, CameraView, StartRecordingRequest, UpsertCameraRequest};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    let records = ServeDir::new(&state.config.records_dir);

    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::system_status))
        // Pipelines
        .route("/api/pipelines", get(list_pipelines))
        .route("/api/pipelines/reconcile", post(reconcile_all))
        .route("/api/pipelines/:id/start", post(start_pipeline))
        .route("/api/pipelines/:id/restart", post(restart_pipeline))
        .route("/api/pipelines/:id", delete(stop_pipeline))
        .route("/api/groups/:id/reconcile", post(reconcile_group))
        // Directory
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras/:id", put(upsert_camera).delete(delete_camera))
        .route("/api/streams/:id/cameras", get(stream_cameras))
        // Recordings
        .route("/api/records/:camera_id", get(recording_status))
        .route("/api/records/:camera_id/start", post(start_recording))
        .route("/api/records/:camera_id/stop", post(stop_recording))
        .route("/api/users/:user/records", get(list_user_recordings))
        .route("/api/users/:user/records/:file", delete(delete_user_recording))
        // Live viewers and events
        .merge(stream_routes::stream_routes())
        .nest_service("/records", records)
        .with_state(state)
}

// ========================================
// Pipeline Handlers
// ========================================

async fn list_pipelines(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.registry().status().await))
}

async fn reconcile_all(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let report = state.streams.reconcile_all().await?;
    Ok(Json(ApiResponse::success(report)))
}

async fn reconcile_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let report = state.streams.reconcile_group(&id).await?;
    Ok(Json(ApiResponse::success(report)))
}

async fn start_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let pipeline = state.streams.start_camera(&id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(pipeline.status())),
    ))
}

async fn restart_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let pipeline = state.streams.restart_camera(&id).await?;
    Ok(Json(ApiResponse::success(pipeline.status())))
}

async fn stop_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let stopped = state.streams.stop_camera(&id).await;
    Json(ApiResponse::success(json!({ "camera_id": id, "stopped": stopped })))
}

// ========================================
// Directory Handlers
// ========================================

async fn list_cameras(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let running = state.registry().running_ids().await;
    let cameras: Vec<CameraView> = state
        .directory
        .list_cameras()
        .await?
        .iter()
        .map(|camera| CameraView::new(camera, running.contains(&camera.id)))
        .collect();

    Ok(Json(ApiResponse::success(cameras)))
}

/// Changed locators of a running camera only apply after a restart
async fn upsert_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpsertCameraRequest>,
) -> Result<impl IntoResponse> {
    let camera = req.into_descriptor(&id);
    let created = state.directory.upsert_camera(camera.clone()).await?;
    let reconcile = state.streams.reconcile_all().await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let running = state.registry().get(&id).await.is_some();

    Ok((
        status,
        Json(ApiResponse::success(json!({
            "camera": CameraView::new(&camera, running),
            "created": created,
            "reconcile": reconcile,
        }))),
    ))
}

async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let camera = state.directory.remove_camera(&id).await?;
    let reconcile = state.streams.reconcile_all().await?;

    Ok(Json(ApiResponse::success(json!({
        "camera": CameraView::new(&camera, false),
        "reconcile": reconcile,
    }))))
}

async fn stream_cameras(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let cameras = state.streams.cameras_for_stream(&id).await?;
    Ok(Json(ApiResponse::success(cameras)))
}

// ========================================
// Recording Handlers
// ========================================

async fn recording_status(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    Json(ApiResponse::success(state.recorder.status(&camera_id)))
}

async fn start_recording(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Json(req): Json<StartRecordingRequest>,
) -> Result<impl IntoResponse> {
    let started = state.recorder.start(&camera_id, &req.user).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(started))))
}

async fn stop_recording(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> Result<impl IntoResponse> {
    let finished = state.recorder.stop(&camera_id).await?;
    Ok(Json(ApiResponse::success(finished)))
}

async fn list_user_recordings(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<impl IntoResponse> {
    let files = state.recorder.list_recordings(&user).await?;
    Ok(Json(ApiResponse::success(files)))
}

async fn delete_user_recording(
    State(state): State<AppState>,
    Path((user, file)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    state.recorder.delete_recording(&user, &file).await?;
    Ok(Json(ApiResponse::success(json!({ "user": user, "file": file }))))
}
