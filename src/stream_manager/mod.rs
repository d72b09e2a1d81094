//! StreamManager - directory-driven pipeline control
//!
//! Bridges the camera directory and group catalog to the registry:
//! `reconcile_all` matches the running set to every active camera,
//! `reconcile_group` only touches one group's members.

use std::collections::HashSet;
use std::sync::Arc;

use crate::camera_directory::{CameraDescriptor, CameraDirectory, GroupCatalog};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::pipeline_registry::{PipelineRegistry, ReconcileReport};

pub struct StreamManager {
    directory: Arc<dyn CameraDirectory>,
    catalog: Arc<dyn GroupCatalog>,
    registry: Arc<PipelineRegistry>,
}

impl StreamManager {
    pub fn new(
        directory: Arc<dyn CameraDirectory>,
        catalog: Arc<dyn GroupCatalog>,
        registry: Arc<PipelineRegistry>,
    ) -> Self {
        Self {
            directory,
            catalog,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    /// Match running pipelines to every camera in the directory
    pub async fn reconcile_all(&self) -> Result<ReconcileReport> {
        let cameras = self.directory.list_cameras().await?;
        tracing::debug!(cameras = cameras.len(), "Reconciling all cameras");
        Ok(self.registry.reconcile(&cameras).await)
    }

    /// Reconcile only the members of one group
    ///
    /// Members no longer in the directory are stopped; pipelines outside the
    /// group are left alone.
    pub async fn reconcile_group(&self, group_id: &str) -> Result<ReconcileReport> {
        let members = self
            .catalog
            .group_members(group_id)
            .await?
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;

        let scope: HashSet<String> = members.into_iter().collect();
        let desired: Vec<CameraDescriptor> = self
            .directory
            .list_cameras()
            .await?
            .into_iter()
            .filter(|c| scope.contains(&c.id))
            .collect();

        tracing::debug!(group_id = %group_id, members = scope.len(), "Reconciling group");
        Ok(self.registry.reconcile_scoped(&desired, &scope).await)
    }

    /// Camera ids shown by a streaming
    pub async fn cameras_for_stream(&self, stream_id: &str) -> Result<Vec<String>> {
        self.catalog
            .stream_members(stream_id)
            .await?
            .ok_or_else(|| Error::StreamNotFound(stream_id.to_string()))
    }

    pub async fn start_camera(&self, camera_id: &str) -> Result<Arc<Pipeline>> {
        let camera = self.lookup(camera_id).await?;
        self.registry.start(camera).await
    }

    /// Stop and start again with the directory's current descriptor
    pub async fn restart_camera(&self, camera_id: &str) -> Result<Arc<Pipeline>> {
        let camera = self.lookup(camera_id).await?;
        self.registry.restart(camera).await
    }

    pub async fn stop_camera(&self, camera_id: &str) -> bool {
        self.registry.stop(camera_id).await
    }

    async fn lookup(&self, camera_id: &str) -> Result<CameraDescriptor> {
        self.directory
            .get_camera(camera_id)
            .await?
            .ok_or_else(|| Error::CameraNotFound(camera_id.to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::camera_directory::{CameraGroup, DirectorySeed, MemoryDirectory};
    use crate::ffmpeg_process::FfmpegSettings;
    use crate::pipeline_registry::RegistryConfig;
    use crate::realtime_hub::RealtimeHub;
    use crate::test_support::fake_ffmpeg;
    use std::path::Path;

    fn manager(binary: &Path) -> (Arc<MemoryDirectory>, StreamManager) {
        let seed = DirectorySeed {
            cameras: vec![
                CameraDescriptor::new("1", "rtsp://cam1/sub"),
                CameraDescriptor::new("2", "rtsp://cam2/sub"),
                CameraDescriptor::new("3", "rtsp://cam3/sub"),
            ],
            groups: vec![CameraGroup {
                id: "lobby".into(),
                name: "Lobby".into(),
                description: None,
                cameras: vec!["1".into(), "2".into()],
                owner: None,
            }],
            streams: vec![],
        };
        let directory = Arc::new(MemoryDirectory::from_seed(seed).unwrap());
        let config = RegistryConfig {
            ffmpeg: FfmpegSettings {
                binary: binary.to_path_buf(),
                ..Default::default()
            },
            viewer_queue_depth: 4,
        };
        let registry = PipelineRegistry::new(config, Arc::new(RealtimeHub::new()));
        let manager = StreamManager::new(directory.clone(), directory.clone(), registry);
        (directory, manager)
    }

    #[tokio::test]
    async fn test_reconcile_all_follows_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (directory, manager) = manager(&fake_ffmpeg(dir.path()));

        let report = manager.reconcile_all().await.unwrap();
        assert_eq!(report.started, vec!["1", "2", "3"]);

        directory.remove_camera("2").await.unwrap();
        let report = manager.reconcile_all().await.unwrap();
        assert_eq!(report.stopped, vec!["2"]);
        assert_eq!(report.unchanged, vec!["1", "3"]);

        manager.registry().stop_all().await;
    }

    #[tokio::test]
    async fn test_reconcile_group_is_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let (_directory, manager) = manager(&fake_ffmpeg(dir.path()));

        let report = manager.reconcile_group("lobby").await.unwrap();
        assert_eq!(report.started, vec!["1", "2"]);
        assert!(manager.registry().get("3").await.is_none());

        assert!(matches!(
            manager.reconcile_group("nope").await,
            Err(Error::GroupNotFound(_))
        ));
        manager.registry().stop_all().await;
    }

    #[tokio::test]
    async fn test_start_unknown_camera() {
        let dir = tempfile::tempdir().unwrap();
        let (_directory, manager) = manager(&fake_ffmpeg(dir.path()));
        assert!(matches!(
            manager.start_camera("99").await,
            Err(Error::CameraNotFound(_))
        ));
        assert!(matches!(
            manager.cameras_for_stream("nope").await,
            Err(Error::StreamNotFound(_))
        ));
    }
}
