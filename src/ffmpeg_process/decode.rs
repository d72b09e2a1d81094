//! Live decoder process for one camera

use std::sync::Arc;

use tokio::process::ChildStdout;

use super::{ExitInfo, FfmpegProcess, FfmpegSettings, Pipes};
use crate::camera_directory::CameraDescriptor;
use crate::error::{Error, Result};

/// Decoder turning the camera's preview stream into JPEGs on stdout
pub struct DecodeProcess {
    process: Arc<FfmpegProcess>,
}

impl DecodeProcess {
    /// Launch the decoder. The returned stdout carries concatenated JPEGs.
    pub fn spawn(
        camera: &CameraDescriptor,
        settings: &FfmpegSettings,
    ) -> Result<(Self, ChildStdout)> {
        let args = settings.decode_args(&camera.preview_url);
        let label = format!("decoder:{}", camera.id);

        tracing::info!(
            camera_id = %camera.id,
            source = %camera.preview_url_redacted(),
            "Starting decoder"
        );

        let pipes = Pipes {
            stdin: false,
            stdout: true,
        };
        let (process, stdout) = FfmpegProcess::spawn(label, &settings.binary, &args, pipes)?;
        let stdout = stdout.ok_or_else(|| Error::spawn(process.label(), "stdout not captured"))?;

        Ok((
            Self {
                process: Arc::new(process),
            },
            stdout,
        ))
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn has_exited(&self) -> bool {
        self.process.has_exited()
    }

    pub fn last_stderr_line(&self) -> Option<String> {
        self.process.last_stderr_line()
    }

    /// Kill the decoder and wait for it to be gone
    pub async fn stop(&self) -> ExitInfo {
        self.process.stop().await
    }

    /// Resolve when the decoder exits for any reason
    pub async fn wait(&self) -> ExitInfo {
        self.process.wait().await
    }
}
