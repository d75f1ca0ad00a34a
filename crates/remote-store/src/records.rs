//! The per-couple metadata record collection.
//!
//! A couple shares one ordered collection of [`PhotoRecord`]s. The
//! [`RecordStore`] trait is the seam the synchronization engine talks to;
//! implementations own ordering, id assignment, and snapshot delivery.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A photo metadata record as stored in the couple's remote collection.
///
/// Field names serialize in camelCase to match the remote wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    /// Store-assigned identifier, stable for the record's lifetime.
    pub id: String,
    /// Object path of the binary payload this record references.
    pub image_path: String,
    pub caption: String,
    pub sender_id: String,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
    /// Expiry in epoch milliseconds. `None` on legacy records written
    /// before expiry stamping; readers derive the value and backfill it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Identities that have downloaded this photo. Grows by union only;
    /// entries are never removed.
    #[serde(default)]
    pub downloaded_by: BTreeSet<String>,
}

/// Fields for a record about to be inserted; the store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPhotoRecord {
    pub image_path: String,
    pub caption: String,
    pub sender_id: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

/// One full view of a couple's records, newest first.
pub type Snapshot = Vec<PhotoRecord>;

/// Storage seam for the couple's shared record collection.
///
/// There is no multi-device locking behind this trait: concurrent writers
/// are reconciled only by last-write semantics on scalar fields and by the
/// add-only union on `downloaded_by`.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a record and return the assigned id.
    async fn insert(&self, couple_id: &str, record: NewPhotoRecord) -> Result<String, StoreError>;

    /// Stamp `expires_at` on a record that does not carry one yet.
    ///
    /// A record that already has an expiry is left untouched, so repeated
    /// backfills from concurrent readers cannot produce duplicate writes.
    /// Fails with [`StoreError::NotFound`] if the record is gone.
    async fn set_expiry_if_absent(
        &self,
        couple_id: &str,
        record_id: &str,
        expires_at: i64,
    ) -> Result<(), StoreError>;

    /// Union `user_id` into the record's `downloaded_by` set.
    ///
    /// Acknowledging the same download twice is a no-op. Fails with
    /// [`StoreError::NotFound`] if the record was reaped first; that race
    /// is accepted, whichever side lands first wins.
    async fn mark_downloaded(
        &self,
        couple_id: &str,
        record_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError>;

    /// Delete a record. Deleting an absent id is a no-op, not an error.
    async fn delete(&self, couple_id: &str, record_id: &str) -> Result<(), StoreError>;

    /// Current records for a couple, newest first.
    async fn list(&self, couple_id: &str) -> Result<Snapshot, StoreError>;

    /// Subscribe to live snapshots of the couple's records.
    ///
    /// The current snapshot is delivered immediately, then a fresh full
    /// snapshot after every change (add, update, or remove from either
    /// participant). The subscription ends when the receiver is dropped.
    async fn subscribe(&self, couple_id: &str) -> Result<flume::Receiver<Snapshot>, StoreError>;
}
