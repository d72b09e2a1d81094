//! PipelineRegistry - which cameras are currently streaming
//!
//! ## Responsibilities
//!
//! - Keyed set of running pipelines, at most one per camera id
//! - Explicit start / stop / restart
//! - Reconciliation against a desired camera set (identity only)
//! - Removing pipelines whose decoder exits on its own
//!
//! ## Ordering
//!
//! Every per-camera mutation runs under that camera's lease from
//! `CameraLocks`. A stop removes the map entry, waits for the decoder to exit
//! and closes the viewers before releasing the lease.

mod reconcile;

pub use reconcile::{ReconcileFailure, ReconcileReport};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;

use crate::camera_directory::CameraDescriptor;
use crate::camera_locks::CameraLocks;
use crate::error::{Error, Result};
use crate::ffmpeg_process::{ExitInfo, FfmpegSettings};
use crate::pipeline::{Pipeline, PipelineStatus};
use crate::realtime_hub::{HubMessage, PipelineExitedMessage, PipelineMessage, RealtimeHub};

/// Settings shared by every pipeline
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub ffmpeg: FfmpegSettings,
    /// Per-viewer outbound queue, in frames
    pub viewer_queue_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ffmpeg: FfmpegSettings::default(),
            viewer_queue_depth: 8,
        }
    }
}

pub struct PipelineRegistry {
    config: RegistryConfig,
    pipelines: RwLock<HashMap<String, Arc<Pipeline>>>,
    locks: CameraLocks,
    next_generation: AtomicU64,
    hub: Arc<RealtimeHub>,
}

impl PipelineRegistry {
    pub fn new(config: RegistryConfig, hub: Arc<RealtimeHub>) -> Arc<Self> {
        Arc::new(Self {
            config,
            pipelines: RwLock::new(HashMap::new()),
            locks: CameraLocks::new(),
            next_generation: AtomicU64::new(1),
            hub,
        })
    }

    /// Running pipeline for a camera
    pub async fn get(&self, camera_id: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.read().await.get(camera_id).cloned()
    }

    pub async fn running_ids(&self) -> BTreeSet<String> {
        self.pipelines.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.pipelines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pipelines.read().await.is_empty()
    }

    pub async fn status(&self) -> Vec<PipelineStatus> {
        let mut list: Vec<_> = self
            .pipelines
            .read()
            .await
            .values()
            .map(|p| p.status())
            .collect();
        list.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        list
    }

    /// Start a pipeline. `AlreadyRunning` if one exists for this id.
    pub async fn start(self: &Arc<Self>, camera: CameraDescriptor) -> Result<Arc<Pipeline>> {
        let _lease = self.locks.acquire(&camera.id).await;
        self.start_locked(camera).await
    }

    async fn start_locked(self: &Arc<Self>, camera: CameraDescriptor) -> Result<Arc<Pipeline>> {
        if self.pipelines.read().await.contains_key(&camera.id) {
            return Err(Error::AlreadyRunning(camera.id));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let camera_id = camera.id.clone();

        let pipeline = match Pipeline::start(
            camera,
            generation,
            &self.config.ffmpeg,
            self.config.viewer_queue_depth,
        ) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(camera_id = %camera_id, error = %e, "Pipeline start failed");
                return Err(e);
            }
        };

        self.pipelines
            .write()
            .await
            .insert(camera_id.clone(), pipeline.clone());

        self.spawn_exit_watch(pipeline.clone());

        self.hub
            .broadcast(HubMessage::PipelineStarted(PipelineMessage::new(
                &camera_id, generation,
            )))
            .await;

        Ok(pipeline)
    }

    /// Stop a pipeline and wait for the decoder to be gone.
    /// Returns false if nothing was running.
    pub async fn stop(&self, camera_id: &str) -> bool {
        let _lease = self.locks.acquire(camera_id).await;
        self.stop_locked(camera_id).await
    }

    async fn stop_locked(&self, camera_id: &str) -> bool {
        let removed = self.pipelines.write().await.remove(camera_id);
        let Some(pipeline) = removed else {
            tracing::debug!(camera_id = %camera_id, "Stop requested, nothing running");
            return false;
        };

        pipeline.stop().await;

        self.hub
            .broadcast(HubMessage::PipelineStopped(PipelineMessage::new(
                camera_id,
                pipeline.generation(),
            )))
            .await;
        true
    }

    /// Stop then start, picking up a changed descriptor
    pub async fn restart(self: &Arc<Self>, camera: CameraDescriptor) -> Result<Arc<Pipeline>> {
        let _lease = self.locks.acquire(&camera.id).await;
        self.stop_locked(&camera.id).await;
        self.start_locked(camera).await
    }

    /// Stop every pipeline
    pub async fn stop_all(&self) -> usize {
        let ids = self.running_ids().await;
        let results = join_all(ids.iter().map(|id| self.stop(id))).await;
        let stopped = results.into_iter().filter(|s| *s).count();
        tracing::info!(stopped = stopped, "All pipelines stopped");
        stopped
    }

    /// Make the running set equal to `desired`
    pub async fn reconcile(self: &Arc<Self>, desired: &[CameraDescriptor]) -> ReconcileReport {
        self.apply(desired, None).await
    }

    /// Like `reconcile`, but only ids in `scope` are considered
    pub async fn reconcile_scoped(
        self: &Arc<Self>,
        desired: &[CameraDescriptor],
        scope: &HashSet<String>,
    ) -> ReconcileReport {
        self.apply(desired, Some(scope)).await
    }

    async fn apply(
        self: &Arc<Self>,
        desired: &[CameraDescriptor],
        scope: Option<&HashSet<String>>,
    ) -> ReconcileReport {
        let in_scope = |id: &str| scope.map_or(true, |s| s.contains(id));

        let desired: HashMap<&str, &CameraDescriptor> = desired
            .iter()
            .filter(|c| in_scope(&c.id))
            .map(|c| (c.id.as_str(), c))
            .collect();
        let running: BTreeSet<String> = self
            .running_ids()
            .await
            .into_iter()
            .filter(|id| in_scope(id))
            .collect();

        let plan = reconcile::plan(&running, &desired);
        let mut report = ReconcileReport {
            unchanged: plan.unchanged,
            ..Default::default()
        };

        // Stops first, so a camera that moves never runs twice
        let stopped = join_all(plan.to_stop.iter().map(|id| self.stop(id))).await;
        for (id, was_running) in plan.to_stop.into_iter().zip(stopped) {
            if was_running {
                report.stopped.push(id);
            }
        }

        let started = join_all(
            plan.to_start
                .iter()
                .map(|id| self.start(desired[id.as_str()].clone())),
        )
        .await;
        for (id, result) in plan.to_start.into_iter().zip(started) {
            match result {
                Ok(_) => report.started.push(id),
                // Someone else started it in between
                Err(Error::AlreadyRunning(_)) => report.unchanged.push(id),
                Err(e) => report.failed.push(ReconcileFailure {
                    camera_id: id,
                    error_code: e.code().to_string(),
                    message: e.to_string(),
                }),
            }
        }

        tracing::info!(
            started = report.started.len(),
            stopped = report.stopped.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            scoped = scope.is_some(),
            "Reconcile finished"
        );

        report
    }

    fn spawn_exit_watch(self: &Arc<Self>, pipeline: Arc<Pipeline>) {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let exit = pipeline.wait_exit().await;
            if let Some(registry) = registry.upgrade() {
                registry.handle_exit(pipeline, exit).await;
            }
        });
    }

    async fn handle_exit(&self, pipeline: Arc<Pipeline>, exit: ExitInfo) {
        let camera_id = pipeline.camera_id().to_string();
        let _lease = self.locks.acquire(&camera_id).await;

        let removed = {
            let mut pipelines = self.pipelines.write().await;
            let current = pipelines
                .get(&camera_id)
                .is_some_and(|p| Arc::ptr_eq(p, &pipeline));
            if current {
                pipelines.remove(&camera_id)
            } else {
                None
            }
        };

        // Already stopped on request, or replaced by a newer generation
        if removed.is_none() {
            return;
        }

        pipeline.stop().await;

        let err = Error::UnexpectedExit {
            camera_id: camera_id.clone(),
            status: exit.to_string(),
        };
        let last_error = pipeline.last_decoder_error();
        tracing::warn!(
            camera_id = %camera_id,
            generation = pipeline.generation(),
            last_error = ?last_error,
            error = %err,
            "Decoder exited, pipeline removed"
        );

        self.hub
            .broadcast(HubMessage::PipelineExited(PipelineExitedMessage {
                camera_id,
                generation: pipeline.generation(),
                status: exit.to_string(),
                last_error,
                timestamp: chrono::Utc::now().to_rfc3339(),
            }))
            .await;
    }
}
