//! Shared API models
//!
//! Response wrapper and request/response bodies used by the web API.

use serde::{Deserialize, Serialize};

use crate::camera_directory::CameraDescriptor;
use crate::pipeline::PipelineStatus;
use crate::recorder::RecordState;

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub pipelines: usize,
    pub event_clients: u64,
}

/// `/api/status` body
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub pipelines: Vec<PipelineStatus>,
    pub recordings: Vec<CameraRecordState>,
    pub event_clients: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraRecordState {
    pub camera_id: String,
    #[serde(flatten)]
    pub state: RecordState,
}

/// Camera as listed by the API, locators redacted
#[derive(Debug, Clone, Serialize)]
pub struct CameraView {
    pub id: String,
    pub name: String,
    pub preview_url: String,
    pub record_url: String,
    pub account: Option<String>,
    pub streaming: bool,
}

impl CameraView {
    pub fn new(camera: &CameraDescriptor, streaming: bool) -> Self {
        Self {
            id: camera.id.clone(),
            name: camera.name.clone(),
            preview_url: camera.preview_url_redacted(),
            record_url: camera.record_url_redacted(),
            account: camera.account.clone(),
            streaming,
        }
    }
}

/// `PUT /api/cameras/:id` body. The id comes from the path.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertCameraRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub preview_url: String,
    /// Defaults to the preview locator
    #[serde(default)]
    pub record_url: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
}

impl UpsertCameraRequest {
    pub fn into_descriptor(self, id: &str) -> CameraDescriptor {
        let record_url = self.record_url.unwrap_or_else(|| self.preview_url.clone());
        CameraDescriptor {
            id: id.to_string(),
            name: self.name.unwrap_or_else(|| id.to_string()),
            preview_url: self.preview_url,
            record_url,
            account: self.account,
        }
    }
}

/// `POST /api/records/:camera_id/start` body
#[derive(Debug, Clone, Deserialize)]
pub struct StartRecordingRequest {
    pub user: String,
}
