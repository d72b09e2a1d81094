//! Record session states

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::ffmpeg_process::FfmpegProcess;

/// Live recording process and where it writes
pub(super) struct ActiveRecording {
    pub session_id: Uuid,
    pub process: Arc<FfmpegProcess>,
    pub user: String,
    pub file: String,
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// Non-idle session. A camera with no entry is idle.
pub(super) enum SessionSlot {
    Recording(ActiveRecording),
    Stopping {
        session_id: Uuid,
        user: String,
        file: String,
    },
    Converting {
        session_id: Uuid,
        user: String,
        source: String,
        destination: String,
    },
}

impl SessionSlot {
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionSlot::Recording(active) => active.session_id,
            SessionSlot::Stopping { session_id, .. } => *session_id,
            SessionSlot::Converting { session_id, .. } => *session_id,
        }
    }

    pub fn snapshot(&self) -> RecordState {
        match self {
            SessionSlot::Recording(active) => RecordState::Recording {
                user: active.user.clone(),
                file: active.file.clone(),
                started_at: active.started_at,
            },
            SessionSlot::Stopping { user, file, .. } => RecordState::Stopping {
                user: user.clone(),
                file: file.clone(),
            },
            SessionSlot::Converting {
                user,
                source,
                destination,
                ..
            } => RecordState::Converting {
                user: user.clone(),
                source: source.clone(),
                destination: destination.clone(),
            },
        }
    }
}

/// Public view of a camera's record session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordState {
    Idle,
    Recording {
        user: String,
        file: String,
        started_at: DateTime<Utc>,
    },
    Stopping {
        user: String,
        file: String,
    },
    Converting {
        user: String,
        source: String,
        destination: String,
    },
}

impl RecordState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RecordState::Idle)
    }
}

/// Returned by a successful start
#[derive(Debug, Clone, Serialize)]
pub struct RecordingStarted {
    pub camera_id: String,
    pub user: String,
    pub file: String,
}

/// Returned by a successful stop
#[derive(Debug, Clone, Serialize)]
pub struct RecordingFinished {
    pub camera_id: String,
    pub user: String,
    /// Converted `.mp4` file name
    pub file: String,
    pub size: u64,
}

/// Finished recording on disk
#[derive(Debug, Clone, Serialize)]
pub struct RecordingFile {
    pub file: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}
