//! ffmpeg command lines

use std::path::{Path, PathBuf};

/// Shared ffmpeg settings
#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    /// Executable to launch
    pub binary: PathBuf,
    /// Output frame rate of the live decoder
    pub stream_fps: u32,
    /// MJPEG quality scale (2 best .. 31 worst)
    pub stream_quality: u32,
    /// AAC bitrate for recordings, e.g. "128k"
    pub audio_bitrate: String,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            stream_fps: 15,
            stream_quality: 5,
            audio_bitrate: "128k".to_string(),
        }
    }
}

impl FfmpegSettings {
    /// Live decoder: RTSP over TCP in, concatenated JPEGs on stdout
    pub fn decode_args(&self, preview_url: &str) -> Vec<String> {
        let fps = self.stream_fps.max(1).to_string();
        let quality = self.stream_quality.clamp(2, 31).to_string();

        [
            "-rtsp_transport",
            "tcp",
            "-fflags",
            "nobuffer",
            "-flags",
            "low_delay",
            "-i",
            preview_url,
            "-an",
            "-f",
            "mjpeg",
            "-q:v",
            quality.as_str(),
            "-r",
            fps.as_str(),
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Recorder: video copied, audio to AAC, MPEG-TS container
    pub fn record_args(&self, record_url: &str, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();

        [
            "-rtsp_transport",
            "tcp",
            "-i",
            record_url,
            "-c:v",
            "copy",
            "-c:a",
            "aac",
            "-b:a",
            self.audio_bitrate.as_str(),
            "-y",
            &*output,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Post-record remux from .ts into a seekable .mp4
    pub fn convert_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();

        [
            "-i",
            &*input,
            "-c:v",
            "copy",
            "-c:a",
            "aac",
            "-b:a",
            self.audio_bitrate.as_str(),
            "-movflags",
            "+faststart",
            "-y",
            &*output,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}
