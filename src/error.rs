//! Error handling for the camera relay server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// External process could not be launched
    #[error("Failed to spawn {process}: {message}")]
    Spawn { process: String, message: String },

    /// A pipeline for this camera is already running
    #[error("Pipeline already running for camera {0}")]
    AlreadyRunning(String),

    /// A record session for this camera is not idle
    #[error("Recording already running for camera {0}")]
    AlreadyRecording(String),

    /// Stop requested for a camera that is not recording
    #[error("No recording in progress for camera {0}")]
    NotRecording(String),

    /// Decode or record process terminated on its own
    #[error("Process for camera {camera_id} exited unexpectedly ({status})")]
    UnexpectedExit { camera_id: String, status: String },

    /// Post-record transcode failed or had nothing to convert
    #[error("Conversion failed for camera {camera_id}: {message}")]
    Conversion { camera_id: String, message: String },

    /// Viewer asked for a camera with no running pipeline
    #[error("No live stream for camera {0}")]
    RouteNotFound(String),

    /// Camera missing from the directory
    #[error("Camera not found: {0}")]
    CameraNotFound(String),

    /// Group missing from the catalog
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// Stream missing from the catalog
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    /// Finished recording missing on disk
    #[error("Recording not found: {0}")]
    RecordingNotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn spawn(process: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Spawn {
            process: process.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn conversion(camera_id: &str, message: impl Into<String>) -> Self {
        Error::Conversion {
            camera_id: camera_id.to_string(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code, also used in event payloads
    pub fn code(&self) -> &'static str {
        match self {
            Error::Spawn { .. } => "SPAWN_ERROR",
            Error::AlreadyRunning(_) => "ALREADY_RUNNING",
            Error::AlreadyRecording(_) => "ALREADY_RECORDING",
            Error::NotRecording(_) => "NOT_RECORDING",
            Error::UnexpectedExit { .. } => "UNEXPECTED_EXIT",
            Error::Conversion { .. } => "CONVERSION_ERROR",
            Error::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            Error::CameraNotFound(_) => "CAMERA_NOT_FOUND",
            Error::GroupNotFound(_) => "GROUP_NOT_FOUND",
            Error::StreamNotFound(_) => "STREAM_NOT_FOUND",
            Error::RecordingNotFound(_) => "RECORDING_NOT_FOUND",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Spawn { .. } => StatusCode::BAD_GATEWAY,
            Error::AlreadyRunning(_) | Error::AlreadyRecording(_) | Error::NotRecording(_) => {
                StatusCode::CONFLICT
            }
            Error::UnexpectedExit { .. } => StatusCode::BAD_GATEWAY,
            Error::Conversion { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::RouteNotFound(_)
            | Error::CameraNotFound(_)
            | Error::GroupNotFound(_)
            | Error::StreamNotFound(_)
            | Error::RecordingNotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Config(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        // Rejected viewer upgrades get no payload
        if let Error::RouteNotFound(camera_id) = &self {
            tracing::debug!(camera_id = %camera_id, "Viewer rejected: camera not streaming");
            return status.into_response();
        }

        let error_code = self.code();
        let message = self.to_string();

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mismatch_maps_to_conflict() {
        assert_eq!(
            Error::AlreadyRecording("1".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(Error::NotRecording("1".into()).status(), StatusCode::CONFLICT);
        assert_eq!(Error::AlreadyRunning("1".into()).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_route_not_found_has_empty_body() {
        let response = Error::RouteNotFound("7".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("content-type").is_none());
    }

    #[test]
    fn test_spawn_message() {
        let err = Error::spawn("decoder", "No such file or directory");
        assert_eq!(err.code(), "SPAWN_ERROR");
        assert!(err.to_string().contains("decoder"));
    }
}
