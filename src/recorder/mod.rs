//! Recorder - per-camera record-then-convert sessions
//!
//! ## Responsibilities
//!
//! - One session per camera: Idle → Recording → Stopping → Converting → Idle
//! - Recording writes `<records_dir>/<user>/record_<camera>_<millis>.ts`
//! - Stopping asks ffmpeg to quit, then remuxes to a `.mp4` sibling
//! - Listing and deleting a user's finished recordings
//!
//! Sessions are independent of live pipelines. The stop workflow runs in
//! its own task, so the session returns to Idle even if the caller goes
//! away mid-conversion.

mod session;

pub use session::{RecordState, RecordingFile, RecordingFinished, RecordingStarted};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::camera_directory::CameraDirectory;
use crate::error::{Error, Result};
use crate::ffmpeg_process::{ExitInfo, FfmpegProcess, FfmpegSettings, Pipes};
use crate::realtime_hub::{HubMessage, RealtimeHub, RecordingFailedMessage, RecordingMessage};
use session::{ActiveRecording, SessionSlot};

type Sessions = Arc<Mutex<HashMap<String, SessionSlot>>>;

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub ffmpeg: FfmpegSettings,
    pub records_dir: PathBuf,
    /// Grace period after `q` before the recorder is killed
    pub stop_timeout: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: FfmpegSettings::default(),
            records_dir: PathBuf::from("./records"),
            stop_timeout: Duration::from_millis(5000),
        }
    }
}

pub struct Recorder {
    config: RecorderConfig,
    directory: Arc<dyn CameraDirectory>,
    sessions: Sessions,
    last_stamp: AtomicI64,
    hub: Arc<RealtimeHub>,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        directory: Arc<dyn CameraDirectory>,
        hub: Arc<RealtimeHub>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            directory,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            last_stamp: AtomicI64::new(0),
            hub,
        })
    }

    pub fn records_dir(&self) -> &Path {
        &self.config.records_dir
    }

    pub fn status(&self, camera_id: &str) -> RecordState {
        self.sessions
            .lock()
            .get(camera_id)
            .map(SessionSlot::snapshot)
            .unwrap_or(RecordState::Idle)
    }

    /// Every non-idle session
    pub fn active(&self) -> BTreeMap<String, RecordState> {
        self.sessions
            .lock()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.snapshot()))
            .collect()
    }

    /// Begin recording a camera's record stream on behalf of `user`
    pub async fn start(self: &Arc<Self>, camera_id: &str, user: &str) -> Result<RecordingStarted> {
        validate_name("user", user)?;

        if self.sessions.lock().contains_key(camera_id) {
            return Err(Error::AlreadyRecording(camera_id.to_string()));
        }

        let camera = self
            .directory
            .get_camera(camera_id)
            .await?
            .ok_or_else(|| Error::CameraNotFound(camera_id.to_string()))?;

        let user_dir = self.config.records_dir.join(user);
        tokio::fs::create_dir_all(&user_dir).await?;
        let (file, path) = self.allocate_file(&user_dir, camera_id).await?;

        let args = self.config.ffmpeg.record_args(&camera.record_url, &path);
        let session_id = Uuid::new_v4();
        let pipes = Pipes {
            stdin: true,
            stdout: false,
        };

        let process = {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(camera_id) {
                return Err(Error::AlreadyRecording(camera_id.to_string()));
            }

            let (process, _) = FfmpegProcess::spawn(
                format!("recorder:{}", camera_id),
                &self.config.ffmpeg.binary,
                &args,
                pipes,
            )
            .map_err(|e| {
                tracing::error!(camera_id = %camera_id, error = %e, "Recorder spawn failed");
                e
            })?;
            let process = Arc::new(process);

            sessions.insert(
                camera_id.to_string(),
                SessionSlot::Recording(ActiveRecording {
                    session_id,
                    process: process.clone(),
                    user: user.to_string(),
                    file: file.clone(),
                    path,
                    started_at: Utc::now(),
                }),
            );
            process
        };

        self.spawn_exit_watch(camera_id.to_string(), session_id, process);

        tracing::info!(
            camera_id = %camera_id,
            user = %user,
            file = %file,
            source = %camera.record_url_redacted(),
            "Recording started"
        );
        self.hub
            .broadcast(HubMessage::RecordingStarted(RecordingMessage::new(
                camera_id, user, &file,
            )))
            .await;

        Ok(RecordingStarted {
            camera_id: camera_id.to_string(),
            user: user.to_string(),
            file,
        })
    }

    /// Stop recording and convert. Returns the `.mp4` file name.
    pub async fn stop(self: &Arc<Self>, camera_id: &str) -> Result<RecordingFinished> {
        let active = {
            let mut sessions = self.sessions.lock();
            match sessions.remove(camera_id) {
                Some(SessionSlot::Recording(active)) => {
                    sessions.insert(
                        camera_id.to_string(),
                        SessionSlot::Stopping {
                            session_id: active.session_id,
                            user: active.user.clone(),
                            file: active.file.clone(),
                        },
                    );
                    active
                }
                Some(other) => {
                    sessions.insert(camera_id.to_string(), other);
                    return Err(Error::NotRecording(camera_id.to_string()));
                }
                None => return Err(Error::NotRecording(camera_id.to_string())),
            }
        };

        let recorder = self.clone();
        let camera_id = camera_id.to_string();
        tokio::spawn(async move { recorder.finish(camera_id, active).await })
            .await
            .map_err(|e| Error::Internal(format!("record stop task failed: {}", e)))?
    }

    async fn finish(
        self: Arc<Self>,
        camera_id: String,
        active: ActiveRecording,
    ) -> Result<RecordingFinished> {
        let reset = SessionReset {
            sessions: self.sessions.clone(),
            camera_id: camera_id.clone(),
            session_id: active.session_id,
        };

        tracing::info!(camera_id = %camera_id, file = %active.file, "Stopping recording");

        if let Err(e) = active.process.request_quit().await {
            tracing::warn!(camera_id = %camera_id, error = %e, "Graceful quit failed, killing recorder");
            active.process.kill();
        }

        let exit = match tokio::time::timeout(self.config.stop_timeout, active.process.wait()).await
        {
            Ok(exit) => exit,
            Err(_) => {
                tracing::warn!(
                    camera_id = %camera_id,
                    timeout_ms = self.config.stop_timeout.as_millis() as u64,
                    "Recorder did not exit in time, killing"
                );
                active.process.stop().await
            }
        };
        tracing::debug!(camera_id = %camera_id, exit = %exit, "Recorder exited");

        let destination = active.path.with_extension("mp4");
        let dest_file = file_name(&destination);
        self.set_converting(&camera_id, &active, &dest_file);

        let result = self.convert(&camera_id, &active.path, &destination).await;
        drop(reset);

        match result {
            Ok(size) => {
                tracing::info!(camera_id = %camera_id, file = %dest_file, size = size, "Recording converted");
                self.hub
                    .broadcast(HubMessage::RecordingFinished(RecordingMessage::new(
                        &camera_id,
                        &active.user,
                        &dest_file,
                    )))
                    .await;
                Ok(RecordingFinished {
                    camera_id,
                    user: active.user,
                    file: dest_file,
                    size,
                })
            }
            Err(e) => {
                tracing::error!(camera_id = %camera_id, error = %e, "Recording conversion failed");
                self.publish_failure(&camera_id, &e).await;
                Err(e)
            }
        }
    }

    fn set_converting(&self, camera_id: &str, active: &ActiveRecording, destination: &str) {
        let mut sessions = self.sessions.lock();
        let current = sessions
            .get(camera_id)
            .is_some_and(|slot| slot.session_id() == active.session_id);
        if current {
            sessions.insert(
                camera_id.to_string(),
                SessionSlot::Converting {
                    session_id: active.session_id,
                    user: active.user.clone(),
                    source: active.file.clone(),
                    destination: destination.to_string(),
                },
            );
        }
    }

    /// Remux `source` into `destination`, returning the output size
    async fn convert(&self, camera_id: &str, source: &Path, destination: &Path) -> Result<u64> {
        let raw_len = tokio::fs::metadata(source).await.map(|m| m.len()).unwrap_or(0);
        if raw_len == 0 {
            return Err(Error::conversion(camera_id, "recording produced no data"));
        }

        let args = self.config.ffmpeg.convert_args(source, destination);
        let (process, _) = FfmpegProcess::spawn(
            format!("converter:{}", camera_id),
            &self.config.ffmpeg.binary,
            &args,
            Pipes::default(),
        )
        .map_err(|e| Error::conversion(camera_id, e.to_string()))?;

        let exit = process.wait().await;
        if !exit.success() {
            let detail = process
                .last_stderr_line()
                .map(|line| format!(": {}", line))
                .unwrap_or_default();
            return Err(Error::conversion(
                camera_id,
                format!("converter ended with {}{}", exit, detail),
            ));
        }

        let size = tokio::fs::metadata(destination)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(Error::conversion(camera_id, "converter produced no output"));
        }
        Ok(size)
    }

    fn spawn_exit_watch(self: &Arc<Self>, camera_id: String, session_id: Uuid, process: Arc<FfmpegProcess>) {
        let recorder = Arc::downgrade(self);
        tokio::spawn(async move {
            let exit = process.wait().await;
            if let Some(recorder) = recorder.upgrade() {
                recorder
                    .handle_exit(&camera_id, session_id, exit, process.last_stderr_line())
                    .await;
            }
        });
    }

    async fn handle_exit(
        &self,
        camera_id: &str,
        session_id: Uuid,
        exit: ExitInfo,
        last_error: Option<String>,
    ) {
        let removed = {
            let mut sessions = self.sessions.lock();
            let current = matches!(
                sessions.get(camera_id),
                Some(SessionSlot::Recording(active)) if active.session_id == session_id
            );
            if current {
                sessions.remove(camera_id)
            } else {
                None
            }
        };

        // Exits during Stopping are the normal path
        if removed.is_none() {
            return;
        }

        let err = Error::UnexpectedExit {
            camera_id: camera_id.to_string(),
            status: exit.to_string(),
        };
        tracing::warn!(
            camera_id = %camera_id,
            last_error = ?last_error,
            error = %err,
            "Recorder exited while recording, session reset"
        );
        self.publish_failure(camera_id, &err).await;
    }

    async fn publish_failure(&self, camera_id: &str, err: &Error) {
        self.hub
            .broadcast(HubMessage::RecordingFailed(RecordingFailedMessage {
                camera_id: camera_id.to_string(),
                error_code: err.code().to_string(),
                message: err.to_string(),
                timestamp: Utc::now().to_rfc3339(),
            }))
            .await;
    }

    /// Pick a file name whose timestamp is later than any handed out before
    async fn allocate_file(&self, user_dir: &Path, camera_id: &str) -> Result<(String, PathBuf)> {
        loop {
            let file = format!("record_{}_{}.ts", camera_id, self.next_stamp());
            let path = user_dir.join(&file);
            if !tokio::fs::try_exists(&path).await? {
                return Ok((file, path));
            }
        }
    }

    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_stamp.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_stamp
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Finished recordings of a user, newest first
    pub async fn list_recordings(&self, user: &str) -> Result<Vec<RecordingFile>> {
        validate_name("user", user)?;
        let user_dir = self.config.records_dir.join(user);

        let mut entries = match tokio::fs::read_dir(&user_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".mp4") {
                continue;
            }
            let meta = entry.metadata().await?;
            files.push(RecordingFile {
                file: name,
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.file.cmp(&a.file)));
        Ok(files)
    }

    /// Delete one finished recording of a user
    pub async fn delete_recording(&self, user: &str, file: &str) -> Result<()> {
        validate_name("user", user)?;
        validate_name("file", file)?;
        if !file.ends_with(".mp4") {
            return Err(Error::Validation("only .mp4 recordings can be deleted".to_string()));
        }

        let path = self.config.records_dir.join(user).join(file);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(user = %user, file = %file, "Recording deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::RecordingNotFound(format!("{}/{}", user, file)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Returns the session to Idle when the stop workflow ends, however it ends
struct SessionReset {
    sessions: Sessions,
    camera_id: String,
    session_id: Uuid,
}

impl Drop for SessionReset {
    fn drop(&mut self) {
        let mut sessions = self.sessions.lock();
        let current = sessions
            .get(&self.camera_id)
            .is_some_and(|slot| slot.session_id() == self.session_id);
        if current {
            sessions.remove(&self.camera_id);
        }
    }
}

fn validate_name(what: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value.contains('/')
        || value.contains('\\')
        || value == "."
        || value.contains("..")
        || value.contains('\0')
    {
        return Err(Error::Validation(format!("invalid {} name: {:?}", what, value)));
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
