//! Application state
//!
//! Holds all shared components and state

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera_directory::MemoryDirectory;
use crate::ffmpeg_process::FfmpegSettings;
use crate::pipeline_registry::{PipelineRegistry, RegistryConfig};
use crate::realtime_hub::RealtimeHub;
use crate::recorder::{Recorder, RecorderConfig};
use crate::stream_manager::StreamManager;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// ffmpeg executable
    pub ffmpeg_bin: PathBuf,
    /// Root of per-user recording directories
    pub records_dir: PathBuf,
    /// JSON seed for cameras, groups and streams
    pub cameras_file: Option<PathBuf>,
    /// Frontend build served as fallback
    pub static_dir: Option<PathBuf>,
    pub stream_fps: u32,
    pub stream_quality: u32,
    pub record_audio_bitrate: String,
    /// Frames buffered per viewer before dropping
    pub viewer_queue_depth: usize,
    /// Grace period for a recorder to quit
    pub stop_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            records_dir: PathBuf::from("./records"),
            cameras_file: None,
            static_dir: None,
            stream_fps: 15,
            stream_quality: 5,
            record_audio_bitrate: "128k".to_string(),
            viewer_queue_depth: 8,
            stop_timeout: Duration::from_millis(5000),
        }
    }
}

impl AppConfig {
    /// Read configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT", defaults.port),
            ffmpeg_bin: std::env::var("FFMPEG_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_bin),
            records_dir: std::env::var("RECORDS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.records_dir),
            cameras_file: std::env::var("CAMERAS_FILE").ok().map(PathBuf::from),
            static_dir: std::env::var("STATIC_DIR").ok().map(PathBuf::from),
            stream_fps: env_parse("STREAM_FPS", defaults.stream_fps),
            stream_quality: env_parse("STREAM_QUALITY", defaults.stream_quality),
            record_audio_bitrate: std::env::var("RECORD_AUDIO_BITRATE")
                .unwrap_or(defaults.record_audio_bitrate),
            viewer_queue_depth: env_parse("VIEWER_QUEUE_DEPTH", defaults.viewer_queue_depth),
            stop_timeout: Duration::from_millis(env_parse(
                "STOP_TIMEOUT_MS",
                defaults.stop_timeout.as_millis() as u64,
            )),
        }
    }

    pub fn ffmpeg_settings(&self) -> FfmpegSettings {
        FfmpegSettings {
            binary: self.ffmpeg_bin.clone(),
            stream_fps: self.stream_fps,
            stream_quality: self.stream_quality,
            audio_bitrate: self.record_audio_bitrate.clone(),
        }
    }
}

fn env_parse<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = %key, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Camera directory and group catalog
    pub directory: Arc<MemoryDirectory>,
    /// Directory-driven pipeline control (owns the registry)
    pub streams: Arc<StreamManager>,
    /// Record sessions
    pub recorder: Arc<Recorder>,
    /// `/events` distribution
    pub realtime: Arc<RealtimeHub>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every component around a directory
    pub fn new(config: AppConfig, directory: Arc<MemoryDirectory>) -> Self {
        let realtime = Arc::new(RealtimeHub::new());
        let ffmpeg = config.ffmpeg_settings();

        let registry = PipelineRegistry::new(
            RegistryConfig {
                ffmpeg: ffmpeg.clone(),
                viewer_queue_depth: config.viewer_queue_depth,
            },
            realtime.clone(),
        );
        let streams = Arc::new(StreamManager::new(
            directory.clone(),
            directory.clone(),
            registry,
        ));
        let recorder = Recorder::new(
            RecorderConfig {
                ffmpeg,
                records_dir: config.records_dir.clone(),
                stop_timeout: config.stop_timeout,
            },
            directory.clone(),
            realtime.clone(),
        );

        Self {
            config,
            directory,
            streams,
            recorder,
            realtime,
            started_at: Instant::now(),
        }
    }

    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        self.streams.registry()
    }
}
