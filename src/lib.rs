//! Camrelay Server Library
//!
//! Live camera relay: one ffmpeg decoder per camera fanned out to WebSocket
//! viewers, plus per-camera record-then-convert sessions.
//!
//! ## Architecture
//!
//! 1. CameraDirectory - cameras, groups and streamings (read-only to the core)
//! 2. FfmpegProcess - supervised external processes (decode, record, convert)
//! 3. FrameBroadcaster - per-camera non-blocking frame fan-out
//! 4. Pipeline - decoder + broadcaster for one camera
//! 5. PipelineRegistry - running pipelines, start/stop/reconcile
//! 6. StreamManager - directory-driven reconciliation
//! 7. Recorder - record sessions
//! 8. RealtimeHub - lifecycle events on `/events`
//! 9. WebAPI - HTTP control API and WebSocket routes
//!
//! ## Design Principles
//!
//! - At most one pipeline and one active record session per camera id
//! - Reconciliation compares ids only
//! - A stop completes only after the process is gone

pub mod camera_directory;
pub mod camera_locks;
pub mod ffmpeg_process;
pub mod frame_broadcast;
pub mod pipeline;
pub mod pipeline_registry;
pub mod stream_manager;
pub mod recorder;
pub mod realtime_hub;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

#[cfg(all(test, unix))]
mod test_support;

pub use error::{Error, Result};
pub use state::AppState;
