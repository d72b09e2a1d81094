//! RealtimeHub - lifecycle event distribution
//!
//! ## Responsibilities
//!
//! - `/events` WebSocket connection management
//! - Broadcasting pipeline and recording lifecycle events as JSON text
//!
//! Frames never go through the hub; each camera has its own
//! `FrameBroadcaster`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    PipelineStarted(PipelineMessage),
    /// Stopped on request (reconcile, explicit stop, shutdown)
    PipelineStopped(PipelineMessage),
    /// Decoder died on its own; viewers were closed
    PipelineExited(PipelineExitedMessage),
    RecordingStarted(RecordingMessage),
    /// Converted file is ready
    RecordingFinished(RecordingMessage),
    RecordingFailed(RecordingFailedMessage),
}

impl HubMessage {
    fn kind(&self) -> &'static str {
        match self {
            HubMessage::PipelineStarted(_) => "pipeline_started",
            HubMessage::PipelineStopped(_) => "pipeline_stopped",
            HubMessage::PipelineExited(_) => "pipeline_exited",
            HubMessage::RecordingStarted(_) => "recording_started",
            HubMessage::RecordingFinished(_) => "recording_finished",
            HubMessage::RecordingFailed(_) => "recording_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMessage {
    pub camera_id: String,
    pub generation: u64,
    pub timestamp: String,
}

impl PipelineMessage {
    pub fn new(camera_id: &str, generation: u64) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            generation,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExitedMessage {
    pub camera_id: String,
    pub generation: u64,
    /// e.g. "exit code 1"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMessage {
    pub camera_id: String,
    pub user: String,
    /// File name relative to the user's record directory
    pub file: String,
    pub timestamp: String,
}

impl RecordingMessage {
    pub fn new(camera_id: &str, user: &str, file: &str) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            user: user.to_string(),
            file: file.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingFailedMessage {
    pub camera_id: String,
    pub error_code: String,
    pub message: String,
    pub timestamp: String,
}

/// Client connection
struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, ClientConnection { id, tx });
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);
        tracing::info!(connection_id = %id, "Event client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Event client disconnected");
        }
    }

    /// Broadcast message to all clients
    pub async fn broadcast(&self, message: HubMessage) {
        let msg_type = message.kind();

        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        tracing::debug!(
            message_type = %msg_type,
            client_count = connections.len(),
            "Broadcasting event"
        );

        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_clients() {
        let hub = RealtimeHub::new();
        let (_a, mut rx_a) = hub.register().await;
        let (b, mut rx_b) = hub.register().await;
        assert_eq!(hub.connection_count(), 2);

        hub.broadcast(HubMessage::PipelineStarted(PipelineMessage::new("7", 3)))
            .await;

        let json: serde_json::Value = serde_json::from_str(&rx_a.recv().await.unwrap()).unwrap();
        assert_eq!(json["type"], "pipeline_started");
        assert_eq!(json["data"]["camera_id"], "7");
        assert_eq!(json["data"]["generation"], 3);
        assert!(rx_b.recv().await.is_some());

        hub.unregister(&b).await;
        hub.unregister(&b).await;
        assert_eq!(hub.connection_count(), 1);
    }
}
