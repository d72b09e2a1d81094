//! CameraLocks - per-camera operation serialization
//!
//! Start, stop and exit handling for one camera id run one at a time, so a
//! stop has fully released the decoder and closed its viewers before the
//! next start for that id begins. Different cameras never wait on each
//! other.
//!
//! Locks are never removed: the map keeps one entry per camera id seen
//! since startup.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Default)]
pub struct CameraLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl CameraLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a camera id
    pub async fn acquire(&self, camera_id: &str) -> CameraLease {
        let lock = self.get_or_create_lock(camera_id).await;
        let guard = lock.lock_owned().await;
        tracing::trace!(camera_id = %camera_id, "Camera lock acquired");

        CameraLease {
            camera_id: camera_id.to_string(),
            _guard: guard,
        }
    }

    async fn get_or_create_lock(&self, camera_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(camera_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(camera_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn lock_count(&self) -> usize {
        self.locks.read().await.len()
    }
}

/// Exclusive access to one camera id, released on drop
pub struct CameraLease {
    camera_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl CameraLease {
    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }
}
