//! stderr drain
//!
//! ffmpeg writes progress updates terminated by `\r`, so lines are split on
//! either `\r` or `\n`. Progress lines are dropped, everything else goes to
//! the debug log.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;

const MAX_LINE: usize = 4096;

pub(super) async fn drain(label: String, stderr: ChildStderr, last: Arc<Mutex<Option<String>>>) {
    let mut reader = BufReader::new(stderr);
    let mut line: Vec<u8> = Vec::with_capacity(256);

    loop {
        let buf = match reader.fill_buf().await {
            Ok(buf) => buf,
            Err(e) => {
                tracing::debug!(process = %label, error = %e, "stderr read failed");
                break;
            }
        };
        if buf.is_empty() {
            break;
        }

        let consumed = buf.len();
        for &byte in buf {
            if byte == b'\r' || byte == b'\n' {
                emit(&label, &line, &last);
                line.clear();
            } else if line.len() < MAX_LINE {
                line.push(byte);
            }
        }
        reader.consume(consumed);
    }

    emit(&label, &line, &last);
}

fn emit(label: &str, raw: &[u8], last: &Mutex<Option<String>>) {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() || is_progress_noise(text) {
        return;
    }

    tracing::debug!(process = %label, "{}", text);
    *last.lock() = Some(text.to_string());
}

pub(crate) fn is_progress_noise(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("frame=")
        || line.starts_with("size=")
        || line.contains("speed=")
        || (line.contains("time=") && line.contains("bitrate="))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_noise() {
        assert!(is_progress_noise(
            "frame=  120 fps= 15 q=5.0 size=    2048kB time=00:00:08.00 bitrate=2097.2kbits/s speed=1.0x"
        ));
        assert!(is_progress_noise("size=     512kB time=00:00:04.00 bitrate=1048.6kbits/s"));
        assert!(!is_progress_noise("rtsp://cam/sub: Connection refused"));
        assert!(!is_progress_noise("Input #0, rtsp, from 'rtsp://cam/sub':"));
    }
}
