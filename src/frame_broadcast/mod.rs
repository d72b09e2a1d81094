//! FrameBroadcaster - per-camera fan-out of encoded frames
//!
//! ## Responsibilities
//!
//! - Viewer registration and RAII unregistration
//! - Non-blocking publish: a full viewer queue drops the frame for that
//!   viewer only
//! - `close_all` disconnects every viewer when the pipeline goes away
//!
//! Frames are `Bytes`, so every viewer shares the same buffer.

mod mjpeg;

pub use mjpeg::MjpegSplitter;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{Error, Result};

pub type ViewerId = u64;

struct ViewerSlot {
    tx: mpsc::Sender<Bytes>,
    dropped: u64,
}

#[derive(Default)]
struct Viewers {
    closed: bool,
    next_id: ViewerId,
    slots: HashMap<ViewerId, ViewerSlot>,
}

/// Result of one publish call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct FrameBroadcaster {
    camera_id: String,
    queue_depth: usize,
    viewers: Mutex<Viewers>,
    frames_published: AtomicU64,
}

impl FrameBroadcaster {
    pub fn new(camera_id: impl Into<String>, queue_depth: usize) -> Arc<Self> {
        Arc::new(Self {
            camera_id: camera_id.into(),
            queue_depth: queue_depth.max(1),
            viewers: Mutex::new(Viewers::default()),
            frames_published: AtomicU64::new(0),
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Attach a viewer. Fails once the channel is closed.
    pub fn register(self: &Arc<Self>) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(self.queue_depth);

        let id = {
            let mut viewers = self.viewers.lock();
            if viewers.closed {
                return Err(Error::RouteNotFound(self.camera_id.clone()));
            }
            viewers.next_id += 1;
            let id = viewers.next_id;
            viewers.slots.insert(id, ViewerSlot { tx, dropped: 0 });
            id
        };

        tracing::info!(camera_id = %self.camera_id, viewer_id = id, "Viewer attached");

        Ok(Subscription {
            id,
            rx,
            channel: Arc::downgrade(self),
        })
    }

    /// Detach a viewer. Unknown ids are ignored.
    pub fn unregister(&self, id: ViewerId) -> bool {
        let removed = self.viewers.lock().slots.remove(&id);
        match removed {
            Some(slot) => {
                tracing::info!(
                    camera_id = %self.camera_id,
                    viewer_id = id,
                    dropped_frames = slot.dropped,
                    "Viewer detached"
                );
                true
            }
            None => false,
        }
    }

    /// Offer a frame to every viewer without waiting on any of them
    pub fn publish(&self, frame: Bytes) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        let mut gone = Vec::new();

        {
            let mut viewers = self.viewers.lock();
            for (id, slot) in viewers.slots.iter_mut() {
                match slot.tx.try_send(frame.clone()) {
                    Ok(()) => outcome.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        slot.dropped += 1;
                        outcome.dropped += 1;
                    }
                    Err(TrySendError::Closed(_)) => gone.push(*id),
                }
            }
            for id in &gone {
                viewers.slots.remove(id);
            }
        }

        if !gone.is_empty() {
            tracing::debug!(camera_id = %self.camera_id, count = gone.len(), "Pruned closed viewers");
        }

        self.frames_published.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Disconnect every viewer and refuse new ones. Returns how many were
    /// attached; later calls return 0.
    pub fn close_all(&self) -> usize {
        let mut viewers = self.viewers.lock();
        if viewers.closed {
            return 0;
        }
        viewers.closed = true;
        let count = viewers.slots.len();
        // Dropping the senders ends each viewer's receive loop
        viewers.slots.clear();
        drop(viewers);

        tracing::info!(camera_id = %self.camera_id, viewers = count, "Viewer channel closed");
        count
    }

    pub fn is_closed(&self) -> bool {
        self.viewers.lock().closed
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().slots.len()
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Relaxed)
    }
}

/// One viewer's frame queue. Dropping it unregisters the viewer.
pub struct Subscription {
    id: ViewerId,
    rx: mpsc::Receiver<Bytes>,
    channel: Weak<FrameBroadcaster>,
}

impl Subscription {
    pub fn id(&self) -> ViewerId {
        self.id
    }

    /// Next frame, or `None` once the channel was closed
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.unregister(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_viewers() {
        let channel = FrameBroadcaster::new("1", 4);
        let mut a = channel.register().unwrap();
        let mut b = channel.register().unwrap();

        let outcome = channel.publish(Bytes::from_static(b"jpeg"));
        assert_eq!(outcome.delivered, 2);

        assert_eq!(a.recv().await.unwrap(), Bytes::from_static(b"jpeg"));
        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"jpeg"));
    }

    #[tokio::test]
    async fn test_publish_without_viewers_is_noop() {
        let channel = FrameBroadcaster::new("1", 4);
        let outcome = channel.publish(Bytes::from_static(b"jpeg"));
        assert_eq!(outcome, PublishOutcome::default());
        assert_eq!(channel.frames_published(), 1);
    }

    #[tokio::test]
    async fn test_slow_viewer_drops_frames() {
        let channel = FrameBroadcaster::new("1", 2);
        let mut slow = channel.register().unwrap();
        let mut fast = channel.register().unwrap();

        for i in 0..5u8 {
            channel.publish(Bytes::from(vec![i]));
            // fast viewer keeps up
            assert_eq!(fast.recv().await.unwrap()[0], i);
        }

        // slow viewer only holds the first two frames
        assert_eq!(slow.recv().await.unwrap()[0], 0);
        assert_eq!(slow.recv().await.unwrap()[0], 1);
        assert!(slow.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let channel = FrameBroadcaster::new("1", 4);
        let sub = channel.register().unwrap();
        assert_eq!(channel.viewer_count(), 1);

        drop(sub);
        assert_eq!(channel.viewer_count(), 0);
        assert!(!channel.unregister(1));
    }

    #[tokio::test]
    async fn test_close_all_ends_viewers() {
        let channel = FrameBroadcaster::new("1", 4);
        let mut a = channel.register().unwrap();
        let mut b = channel.register().unwrap();

        assert_eq!(channel.close_all(), 2);
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());

        assert_eq!(channel.close_all(), 0);
        assert!(matches!(channel.register(), Err(Error::RouteNotFound(_))));
    }
}
