//! Pipeline - one camera's decoder wired to its viewers
//!
//! ## Responsibilities
//!
//! - Spawn the decoder and pump its stdout through the MJPEG splitter
//! - Publish every complete frame to the camera's `FrameBroadcaster`
//! - Teardown: decoder gone first, then every viewer closed
//!
//! A pipeline never restarts itself. The registry watches `wait_exit` and
//! removes pipelines whose decoder died.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::task::JoinHandle;

use crate::camera_directory::CameraDescriptor;
use crate::error::Result;
use crate::ffmpeg_process::{DecodeProcess, ExitInfo, FfmpegSettings};
use crate::frame_broadcast::{FrameBroadcaster, MjpegSplitter};

const READ_CHUNK: usize = 64 * 1024;
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Pipeline snapshot for the status API
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub camera_id: String,
    pub name: String,
    pub generation: u64,
    pub running: bool,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub viewers: usize,
    pub frames: u64,
    pub bytes: u64,
}

#[derive(Default)]
struct FrameCounters {
    frames: AtomicU64,
    bytes: AtomicU64,
}

pub struct Pipeline {
    camera: CameraDescriptor,
    generation: u64,
    started_at: DateTime<Utc>,
    decoder: DecodeProcess,
    broadcaster: Arc<FrameBroadcaster>,
    counters: Arc<FrameCounters>,
    pump: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Pipeline {
    /// Spawn the decoder and start pumping frames
    pub fn start(
        camera: CameraDescriptor,
        generation: u64,
        settings: &FfmpegSettings,
        viewer_queue_depth: usize,
    ) -> Result<Arc<Self>> {
        let (decoder, stdout) = DecodeProcess::spawn(&camera, settings)?;
        let broadcaster = FrameBroadcaster::new(camera.id.clone(), viewer_queue_depth);
        let counters = Arc::new(FrameCounters::default());

        let pump = tokio::spawn(pump_frames(
            camera.id.clone(),
            stdout,
            broadcaster.clone(),
            counters.clone(),
        ));

        tracing::info!(
            camera_id = %camera.id,
            generation = generation,
            pid = ?decoder.pid(),
            "Pipeline started"
        );

        Ok(Arc::new(Self {
            camera,
            generation,
            started_at: Utc::now(),
            decoder,
            broadcaster,
            counters,
            pump: Mutex::new(Some(pump)),
            running: AtomicBool::new(true),
        }))
    }

    pub fn camera_id(&self) -> &str {
        &self.camera.id
    }

    pub fn camera(&self) -> &CameraDescriptor {
        &self.camera
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn broadcaster(&self) -> &Arc<FrameBroadcaster> {
        &self.broadcaster
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_decoder_error(&self) -> Option<String> {
        self.decoder.last_stderr_line()
    }

    /// Kill the decoder, wait for it, then close all viewers. Idempotent.
    pub async fn stop(&self) -> ExitInfo {
        self.running.store(false, Ordering::SeqCst);
        let exit = self.decoder.stop().await;

        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.broadcaster.close_all();

        tracing::info!(
            camera_id = %self.camera.id,
            generation = self.generation,
            exit = %exit,
            frames = self.counters.frames.load(Ordering::Relaxed),
            "Pipeline stopped"
        );
        exit
    }

    /// Resolve when the decoder exits, requested or not
    pub async fn wait_exit(&self) -> ExitInfo {
        self.decoder.wait().await
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            camera_id: self.camera.id.clone(),
            name: self.camera.name.clone(),
            generation: self.generation,
            running: self.is_running() && !self.decoder.has_exited(),
            pid: self.decoder.pid(),
            started_at: self.started_at,
            viewers: self.broadcaster.viewer_count(),
            frames: self.counters.frames.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
        }
    }
}

async fn pump_frames(
    camera_id: String,
    mut stdout: ChildStdout,
    broadcaster: Arc<FrameBroadcaster>,
    counters: Arc<FrameCounters>,
) {
    let mut splitter = MjpegSplitter::new(MAX_FRAME_BYTES);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(camera_id = %camera_id, error = %e, "Decoder output read failed");
                break;
            }
        };

        for frame in splitter.push(&chunk[..n]) {
            counters.frames.fetch_add(1, Ordering::Relaxed);
            counters.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
            broadcaster.publish(frame);
        }
    }

    tracing::debug!(camera_id = %camera_id, "Decoder output closed");
}
