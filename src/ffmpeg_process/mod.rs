//! FfmpegProcess - supervised external ffmpeg invocations
//!
//! ## Responsibilities
//!
//! - Spawn ffmpeg with piped stderr (and optionally stdin/stdout)
//! - Drain stderr into the log without buffering it
//! - Forceful stop that only returns once the OS process is gone
//! - Exit notification for any number of waiters
//!
//! Each process is owned by one supervisor task. The handle talks to it
//! through a oneshot kill request and a `watch` channel carrying the exit.

mod args;
mod decode;
mod stderr;

pub use args::FfmpegSettings;
pub use decode::DecodeProcess;

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch};

use crate::error::{Error, Result};

/// How an external process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown exit"),
        }
    }
}

/// Which standard streams to pipe besides stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct Pipes {
    pub stdin: bool,
    pub stdout: bool,
}

/// Handle to one running ffmpeg process
pub struct FfmpegProcess {
    label: String,
    pid: Option<u32>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    last_stderr: Arc<Mutex<Option<String>>>,
}

impl FfmpegProcess {
    /// Spawn `program args...`
    ///
    /// Returns the handle and, if requested, the child's stdout. Dropping the
    /// handle kills the process.
    pub fn spawn(
        label: impl Into<String>,
        program: &Path,
        args: &[String],
        pipes: Pipes,
    ) -> Result<(Self, Option<ChildStdout>)> {
        let label = label.into();

        let mut child = Command::new(program)
            .args(args)
            .stdin(if pipes.stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(if pipes.stdout { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::spawn(&label, e))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        let last_stderr = Arc::new(Mutex::new(None));
        if let Some(err_stream) = child.stderr.take() {
            tokio::spawn(stderr::drain(label.clone(), err_stream, last_stderr.clone()));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(supervise(label.clone(), child, kill_rx, exit_tx));

        tracing::debug!(process = %label, pid = ?pid, "Process spawned");

        Ok((
            Self {
                label,
                pid,
                stdin: tokio::sync::Mutex::new(stdin),
                kill_tx: Mutex::new(Some(kill_tx)),
                exit_rx,
                last_stderr,
            },
            stdout,
        ))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has already exited
    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Last diagnostic line that was not progress noise
    pub fn last_stderr_line(&self) -> Option<String> {
        self.last_stderr.lock().clone()
    }

    /// Send SIGKILL without waiting. Idempotent.
    pub fn kill(&self) {
        if let Some(tx) = self.kill_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    /// Kill and wait until the OS process is gone. Idempotent.
    pub async fn stop(&self) -> ExitInfo {
        self.kill();
        self.wait().await
    }

    /// Wait for the process to exit on its own
    pub async fn wait(&self) -> ExitInfo {
        let mut rx = self.exit_rx.clone();
        let exit = match rx.wait_for(|exit| exit.is_some()).await {
            Ok(exit) => exit.clone().unwrap_or_else(ExitInfo::unknown),
            // Supervisor vanished without reporting
            Err(_) => ExitInfo::unknown(),
        };
        exit
    }

    /// Ask ffmpeg to finish its output cleanly by typing `q` on stdin.
    ///
    /// Stdin is closed afterwards.
    pub async fn request_quit(&self) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| Error::Internal(format!("{}: stdin not available", self.label)))?;

        stdin.write_all(b"q").await?;
        stdin.flush().await?;
        guard.take();

        Ok(())
    }
}

async fn supervise(
    label: String,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
) {
    // A dropped sender counts as a kill request
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill_rx => None,
    };

    let status = match exited {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(process = %label, error = %e, "Kill failed, process already gone");
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => ExitInfo::from(status),
        Err(e) => {
            tracing::warn!(process = %label, error = %e, "Failed to collect exit status");
            ExitInfo::unknown()
        }
    };

    tracing::debug!(process = %label, exit = %exit, "Process exited");
    let _ = exit_tx.send(Some(exit));
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::script;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let result = FfmpegProcess::spawn(
            "missing",
            &PathBuf::from("/nonexistent/ffmpeg"),
            &[],
            Pipes::default(),
        );
        assert!(matches!(result, Err(Error::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "sleeper", "sleep 30");

        let (process, _) = FfmpegProcess::spawn("sleeper", &bin, &[], Pipes::default()).unwrap();
        assert!(!process.has_exited());

        let first = tokio::time::timeout(Duration::from_secs(5), process.stop())
            .await
            .unwrap();
        assert_eq!(first.signal, Some(9));
        assert!(process.has_exited());

        let second = process.stop().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_wait_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "failer", "echo 'Connection refused' >&2\nexit 3");

        let (process, _) = FfmpegProcess::spawn("failer", &bin, &[], Pipes::default()).unwrap();
        let exit = process.wait().await;

        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
        assert_eq!(exit.to_string(), "exit code 3");
    }

    #[tokio::test]
    async fn test_request_quit_closes_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "reader", "cat > /dev/null\nexit 0");

        let pipes = Pipes {
            stdin: true,
            stdout: false,
        };
        let (process, _) = FfmpegProcess::spawn("reader", &bin, &[], pipes).unwrap();

        process.request_quit().await.unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .unwrap();
        assert!(exit.success());

        // stdin is gone after the first quit
        assert!(process.request_quit().await.is_err());
    }
}
