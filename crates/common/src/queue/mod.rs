//! Local durable queue for pending uploads.
//!
//! Pending uploads survive restarts by persisting the whole queue as one
//! serialized JSON snapshot after every mutation. Each mutation is a
//! whole-snapshot read-modify-write cycle serialized by an internal lock;
//! there is no finer-grained locking, and all mutations from one device go
//! through one [`UploadQueue`].

mod store;

pub use store::{FsQueueStore, MemoryQueueStore, QueueStore};

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::photo::PendingUpload;

/// Errors from queue mutations.
///
/// A failed mutation never silently drops the item: the caller always learns
/// whether the snapshot was persisted.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The durable store could not be written (or read during a mutation).
    #[error("queue storage unavailable: {0}")]
    Storage(#[from] std::io::Error),

    /// The queue snapshot could not be encoded.
    #[error("failed to encode queue snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Ordered, durable queue of [`PendingUpload`]s.
#[derive(Debug)]
pub struct UploadQueue {
    store: Arc<dyn QueueStore>,
    // Serializes read-modify-write cycles so a drain's removal cannot
    // clobber a concurrent enqueue.
    lock: Mutex<()>,
}

impl UploadQueue {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Append an item, persisting the new snapshot before returning.
    pub async fn enqueue(&self, item: PendingUpload) -> Result<(), QueueError> {
        let _guard = self.lock.lock().await;
        let mut items = self.load_or_empty().await;
        items.push(item);
        self.persist(&items).await
    }

    /// Ordered snapshot of the queued items, oldest first.
    pub async fn list(&self) -> Vec<PendingUpload> {
        let _guard = self.lock.lock().await;
        self.load_or_empty().await
    }

    /// Remove an item by id. Removing an absent id is a no-op, not an error.
    pub async fn remove(&self, id: Uuid) -> Result<(), QueueError> {
        let _guard = self.lock.lock().await;
        let mut items = self.load_or_empty().await;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(());
        }
        self.persist(&items).await
    }

    pub async fn is_empty(&self) -> bool {
        self.list().await.is_empty()
    }

    /// Read the persisted snapshot. A corrupted or unreadable snapshot
    /// degrades to an empty queue rather than wedging every later send.
    async fn load_or_empty(&self) -> Vec<PendingUpload> {
        match self.store.load().await {
            Ok(Some(blob)) => match serde_json::from_slice(&blob) {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = %e, "corrupted queue snapshot, starting from an empty queue");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "unreadable queue snapshot, starting from an empty queue");
                Vec::new()
            }
        }
    }

    async fn persist(&self, items: &[PendingUpload]) -> Result<(), QueueError> {
        let blob = serde_json::to_vec(items)?;
        self.store.save(&blob).await?;
        Ok(())
    }
}
