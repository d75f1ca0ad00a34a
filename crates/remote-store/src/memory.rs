//! In-memory record store.
//!
//! Reference implementation of the record-collection semantics: newest-first
//! ordering, store-assigned ids, add-only `downloaded_by` union, and full
//! snapshot delivery to live subscribers after every change. Used by tests
//! and local development; a hosted backend implements the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::records::{NewPhotoRecord, PhotoRecord, RecordStore, Snapshot};

#[derive(Debug, Default)]
struct CoupleFeed {
    records: Vec<PhotoRecord>,
    subscribers: Vec<flume::Sender<Snapshot>>,
}

impl CoupleFeed {
    /// Current records, newest first. Stable sort keeps insertion order
    /// among records created in the same millisecond.
    fn snapshot(&self) -> Snapshot {
        let mut records = self.records.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Deliver the current snapshot to every live subscriber, pruning
    /// subscribers whose receiver has been dropped.
    fn broadcast(&mut self) {
        let snapshot = self.snapshot();
        self.subscribers
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

/// In-memory [`RecordStore`] keyed by couple id.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    couples: Arc<Mutex<HashMap<String, CoupleFeed>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, couple_id: &str, record: NewPhotoRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let mut couples = self.couples.lock();
        let feed = couples.entry(couple_id.to_string()).or_default();
        feed.records.push(PhotoRecord {
            id: id.clone(),
            image_path: record.image_path,
            caption: record.caption,
            sender_id: record.sender_id,
            created_at: record.created_at,
            expires_at: record.expires_at,
            downloaded_by: Default::default(),
        });
        feed.broadcast();
        debug!(couple_id = %couple_id, record_id = %id, "record inserted");
        Ok(id)
    }

    async fn set_expiry_if_absent(
        &self,
        couple_id: &str,
        record_id: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        let mut couples = self.couples.lock();
        let feed = couples.entry(couple_id.to_string()).or_default();
        let record = feed
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| StoreError::NotFound {
                path: record_id.to_string(),
            })?;
        if record.expires_at.is_some() {
            return Ok(());
        }
        record.expires_at = Some(expires_at);
        feed.broadcast();
        Ok(())
    }

    async fn mark_downloaded(
        &self,
        couple_id: &str,
        record_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let mut couples = self.couples.lock();
        let feed = couples.entry(couple_id.to_string()).or_default();
        let record = feed
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| StoreError::NotFound {
                path: record_id.to_string(),
            })?;
        if record.downloaded_by.insert(user_id.to_string()) {
            feed.broadcast();
        }
        Ok(())
    }

    async fn delete(&self, couple_id: &str, record_id: &str) -> Result<(), StoreError> {
        let mut couples = self.couples.lock();
        let feed = couples.entry(couple_id.to_string()).or_default();
        let before = feed.records.len();
        feed.records.retain(|r| r.id != record_id);
        if feed.records.len() != before {
            feed.broadcast();
            debug!(couple_id = %couple_id, record_id = %record_id, "record deleted");
        }
        Ok(())
    }

    async fn list(&self, couple_id: &str) -> Result<Snapshot, StoreError> {
        let couples = self.couples.lock();
        Ok(couples
            .get(couple_id)
            .map(CoupleFeed::snapshot)
            .unwrap_or_default())
    }

    async fn subscribe(&self, couple_id: &str) -> Result<flume::Receiver<Snapshot>, StoreError> {
        let (tx, rx) = flume::unbounded();
        let mut couples = self.couples.lock();
        let feed = couples.entry(couple_id.to_string()).or_default();
        // The receiver is still alive here, so this send cannot fail.
        let _ = tx.send(feed.snapshot());
        feed.subscribers.push(tx);
        Ok(rx)
    }
}
