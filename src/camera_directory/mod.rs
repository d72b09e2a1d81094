//! CameraDirectory - camera and group lookup
//!
//! ## Responsibilities
//!
//! - Current list of camera descriptors (`CameraDirectory`)
//! - Group and streaming membership (`GroupCatalog`)
//! - In-memory implementation seeded from a JSON file
//!
//! The pipeline core only ever reads through the two traits; writes go
//! through `MemoryDirectory` from the HTTP glue.

mod types;

pub use types::*;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Source of the current camera set
#[async_trait]
pub trait CameraDirectory: Send + Sync {
    /// All active cameras
    async fn list_cameras(&self) -> Result<Vec<CameraDescriptor>>;

    /// Single camera by id
    async fn get_camera(&self, id: &str) -> Result<Option<CameraDescriptor>>;
}

/// Group/stream membership lookup
#[async_trait]
pub trait GroupCatalog: Send + Sync {
    /// Camera ids of a group, `None` if the group does not exist
    async fn group_members(&self, group_id: &str) -> Result<Option<Vec<String>>>;

    /// Camera ids shown by a streaming (union of its groups), `None` if unknown
    async fn stream_members(&self, stream_id: &str) -> Result<Option<Vec<String>>>;
}

#[derive(Default)]
struct DirectoryCache {
    cameras: BTreeMap<String, CameraDescriptor>,
    groups: BTreeMap<String, CameraGroup>,
    streams: BTreeMap<String, Streaming>,
}

/// In-memory camera directory and group catalog
#[derive(Default)]
pub struct MemoryDirectory {
    cache: RwLock<DirectoryCache>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory from seed data
    pub fn from_seed(seed: DirectorySeed) -> Result<Self> {
        let mut cache = DirectoryCache::default();

        for camera in seed.cameras {
            validate_camera(&camera)?;
            if cache.cameras.insert(camera.id.clone(), camera).is_some() {
                return Err(Error::Validation("duplicate camera id in seed".to_string()));
            }
        }
        for group in seed.groups {
            cache.groups.insert(group.id.clone(), group);
        }
        for stream in seed.streams {
            cache.streams.insert(stream.id.clone(), stream);
        }

        tracing::info!(
            cameras = cache.cameras.len(),
            groups = cache.groups.len(),
            streams = cache.streams.len(),
            "Camera directory loaded"
        );

        Ok(Self {
            cache: RwLock::new(cache),
        })
    }

    /// Load seed data from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let seed: DirectorySeed = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid camera file {}: {}", path.display(), e)))?;
        Self::from_seed(seed)
    }

    /// Insert or replace a camera. Returns true if the id was new.
    pub async fn upsert_camera(&self, camera: CameraDescriptor) -> Result<bool> {
        validate_camera(&camera)?;
        let mut cache = self.cache.write().await;
        let created = cache.cameras.insert(camera.id.clone(), camera).is_none();
        Ok(created)
    }

    /// Remove a camera and drop it from every group
    pub async fn remove_camera(&self, id: &str) -> Result<CameraDescriptor> {
        let mut cache = self.cache.write().await;
        let removed = cache
            .cameras
            .remove(id)
            .ok_or_else(|| Error::CameraNotFound(id.to_string()))?;

        for group in cache.groups.values_mut() {
            group.cameras.retain(|member| member != id);
        }

        Ok(removed)
    }

    /// Insert or replace a group
    pub async fn upsert_group(&self, group: CameraGroup) {
        self.cache.write().await.groups.insert(group.id.clone(), group);
    }

    /// Insert or replace a streaming
    pub async fn upsert_stream(&self, stream: Streaming) {
        self.cache.write().await.streams.insert(stream.id.clone(), stream);
    }
}

fn validate_camera(camera: &CameraDescriptor) -> Result<()> {
    if camera.id.is_empty() || camera.id.len() > 64 {
        return Err(Error::Validation("camera id must be 1-64 characters".to_string()));
    }
    if camera.id.contains('/') {
        return Err(Error::Validation("camera id must not contain '/'".to_string()));
    }
    if camera.preview_url.is_empty() || camera.record_url.is_empty() {
        return Err(Error::Validation(format!(
            "camera {} needs both preview and record locators",
            camera.id
        )));
    }
    Ok(())
}

#[async_trait]
impl CameraDirectory for MemoryDirectory {
    async fn list_cameras(&self) -> Result<Vec<CameraDescriptor>> {
        Ok(self.cache.read().await.cameras.values().cloned().collect())
    }

    async fn get_camera(&self, id: &str) -> Result<Option<CameraDescriptor>> {
        Ok(self.cache.read().await.cameras.get(id).cloned())
    }
}

#[async_trait]
impl GroupCatalog for MemoryDirectory {
    async fn group_members(&self, group_id: &str) -> Result<Option<Vec<String>>> {
        Ok(self
            .cache
            .read()
            .await
            .groups
            .get(group_id)
            .map(|group| group.cameras.clone()))
    }

    async fn stream_members(&self, stream_id: &str) -> Result<Option<Vec<String>>> {
        let cache = self.cache.read().await;
        let Some(stream) = cache.streams.get(stream_id) else {
            return Ok(None);
        };

        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for group_id in &stream.groups {
            match cache.groups.get(group_id) {
                Some(group) => {
                    for camera_id in &group.cameras {
                        if seen.insert(camera_id.clone()) {
                            members.push(camera_id.clone());
                        }
                    }
                }
                None => {
                    tracing::warn!(stream_id = %stream_id, group_id = %group_id, "Stream references unknown group");
                }
            }
        }

        Ok(Some(members))
    }
}
