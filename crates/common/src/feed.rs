//! Live feed synchronization.
//!
//! Consumes full snapshots of the couple's record collection, resolves each
//! record against payload storage, derives and backfills missing expiries,
//! hands expired undownloaded records to the reaper, and emits the filtered
//! newest-first list as one atomic update per snapshot.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use remote_store::{PayloadStore, PhotoRecord, RecordStore, StoreError};

use crate::context::CoupleContext;
use crate::photo::{now_ms, SharedPhoto};
use crate::reaper::{ReapDispatcher, ReapJob};

/// Live synchronizer for the couple's shared feed.
#[derive(Debug, Clone)]
pub struct FeedSynchronizer {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    ctx: CoupleContext,
    records: Arc<dyn RecordStore>,
    payloads: PayloadStore,
    ttl_ms: i64,
    reaper: ReapDispatcher,
}

/// A live feed subscription.
///
/// Dropping it tears the consuming task down (view disposed or context
/// change); in-flight uploads and reaps are unaffected.
#[derive(Debug)]
pub struct FeedSubscription {
    photos: flume::Receiver<Vec<SharedPhoto>>,
    task: JoinHandle<()>,
}

impl FeedSubscription {
    /// Wait for the next full feed update. `None` once the subscription has
    /// ended.
    pub async fn recv(&self) -> Option<Vec<SharedPhoto>> {
        self.photos.recv_async().await.ok()
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FeedSynchronizer {
    pub fn new(
        ctx: CoupleContext,
        records: Arc<dyn RecordStore>,
        payloads: PayloadStore,
        ttl_ms: i64,
        reaper: ReapDispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                records,
                payloads,
                ttl_ms,
                reaper,
            }),
        }
    }

    /// Attach to the couple's live record stream.
    ///
    /// Every remote snapshot (any add, update, or remove from either
    /// participant) is processed into one atomic feed update; subscribers
    /// never observe a partially filtered list.
    pub async fn subscribe(&self) -> Result<FeedSubscription, StoreError> {
        let snapshots = self
            .inner
            .records
            .subscribe(self.inner.ctx.couple_id())
            .await?;
        let (tx, rx) = flume::unbounded();
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let mut stream = snapshots.into_stream();
            while let Some(records) = stream.next().await {
                let photos = process_snapshot(&inner, records, now_ms()).await;
                if tx.send(photos).is_err() {
                    break;
                }
            }
            debug!("feed snapshot stream ended");
        });
        Ok(FeedSubscription { photos: rx, task })
    }

    /// Fetch a shared photo's payload and acknowledge the download.
    ///
    /// The ack appends the local user to the record's `downloaded_by` set,
    /// permanently exempting the photo from reaping. Failures surface
    /// distinctly; the whole operation is independently retryable.
    pub async fn download(&self, photo: &SharedPhoto) -> Result<Bytes, StoreError> {
        let bytes = self.inner.payloads.get(&photo.image_path).await?;
        self.inner
            .records
            .mark_downloaded(
                self.inner.ctx.couple_id(),
                &photo.id,
                self.inner.ctx.local_user_id(),
            )
            .await?;
        info!(id = %photo.id, "photo downloaded and acknowledged");
        Ok(bytes)
    }
}

/// Per-record outcome within one snapshot.
enum Outcome {
    Live(SharedPhoto),
    Reap(ReapJob),
    Skip,
}

/// Where a record stands relative to its time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpiryState {
    /// Still within its window, or downloaded at least once.
    Live {
        expires_at: i64,
        needs_backfill: bool,
    },
    /// Past its window with no download acknowledged.
    ReapEligible,
}

/// Classify a record against the TTL window at `now`.
///
/// A record with any download acknowledged is exempt no matter how old it
/// is. A record with no stored expiry gets one derived from its creation
/// time, flagged for backfill.
fn classify(record: &PhotoRecord, now: i64, ttl_ms: i64) -> ExpiryState {
    let needs_backfill = record.expires_at.is_none();
    let expires_at = record.expires_at.unwrap_or(record.created_at + ttl_ms);
    if now >= expires_at && record.downloaded_by.is_empty() {
        ExpiryState::ReapEligible
    } else {
        ExpiryState::Live {
            expires_at,
            needs_backfill,
        }
    }
}

/// Process one remote snapshot into the list handed to subscribers.
///
/// Per-record resolution and backfill run concurrently; emission waits for
/// every per-record outcome. Reap jobs are dispatched, never awaited, so
/// cleanup cannot delay the update.
async fn process_snapshot(inner: &Inner, records: Vec<PhotoRecord>, now: i64) -> Vec<SharedPhoto> {
    let outcomes = join_all(
        records
            .into_iter()
            .map(|record| resolve_record(inner, record, now)),
    )
    .await;

    let mut photos = Vec::new();
    let mut reap_scheduled = 0usize;
    for outcome in outcomes {
        match outcome {
            Outcome::Live(photo) => photos.push(photo),
            Outcome::Reap(job) => {
                reap_scheduled += 1;
                if let Err(e) = inner.reaper.dispatch(job) {
                    warn!(error = %e, "failed to dispatch reap job");
                }
            }
            Outcome::Skip => {}
        }
    }

    photos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    debug!(
        emitted = photos.len(),
        reap_scheduled = reap_scheduled,
        "snapshot processed"
    );
    photos
}

/// Resolve one record: validate, classify against the TTL, backfill a
/// missing expiry, and check the payload is fetchable. Failures affect only
/// this record, never the batch.
async fn resolve_record(inner: &Inner, record: PhotoRecord, now: i64) -> Outcome {
    if record.image_path.is_empty() || record.created_at <= 0 {
        warn!(id = %record.id, "skipping malformed record");
        return Outcome::Skip;
    }

    let (expires_at, needs_backfill) = match classify(&record, now, inner.ttl_ms) {
        ExpiryState::ReapEligible => {
            return Outcome::Reap(ReapJob {
                couple_id: inner.ctx.couple_id().to_string(),
                record_id: record.id,
                image_path: record.image_path,
            });
        }
        ExpiryState::Live {
            expires_at,
            needs_backfill,
        } => (expires_at, needs_backfill),
    };

    if needs_backfill {
        // Self-heals legacy records written before expiry stamping. The
        // write is conditional on the field still being absent, so
        // concurrent readers cannot duplicate it.
        if let Err(e) = inner
            .records
            .set_expiry_if_absent(inner.ctx.couple_id(), &record.id, expires_at)
            .await
        {
            warn!(id = %record.id, error = %e, "expiry backfill failed");
        }
    }

    match inner.payloads.exists(&record.image_path).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(id = %record.id, path = %record.image_path, "payload missing, excluding record");
            return Outcome::Skip;
        }
        Err(e) => {
            warn!(id = %record.id, error = %e, "payload resolution failed, excluding record");
            return Outcome::Skip;
        }
    }

    Outcome::Live(SharedPhoto {
        id: record.id,
        image_path: record.image_path,
        caption: record.caption,
        sender_id: record.sender_id,
        created_at: record.created_at,
        expires_at,
        downloaded_by: record.downloaded_by,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: i64 = 86_400_000;

    fn record(created_at: i64, expires_at: Option<i64>, downloaded: &[&str]) -> PhotoRecord {
        PhotoRecord {
            id: "r1".to_string(),
            image_path: "couples/c1/r1.jpg".to_string(),
            caption: String::new(),
            sender_id: "u1".to_string(),
            created_at,
            expires_at,
            downloaded_by: downloaded.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn eligible_exactly_at_the_ttl_boundary() {
        let t0 = 1_700_000_000_000;
        let rec = record(t0, Some(t0 + TTL), &[]);

        assert!(matches!(
            classify(&rec, t0 + TTL - 1, TTL),
            ExpiryState::Live { .. }
        ));
        assert_eq!(classify(&rec, t0 + TTL, TTL), ExpiryState::ReapEligible);
        assert_eq!(classify(&rec, t0 + TTL + 1, TTL), ExpiryState::ReapEligible);
    }

    #[test]
    fn any_download_ack_exempts_permanently() {
        let t0 = 1_700_000_000_000;
        let rec = record(t0, Some(t0 + TTL), &["u2"]);

        // Arbitrarily far past expiry, still live.
        assert!(matches!(
            classify(&rec, t0 + 100 * TTL, TTL),
            ExpiryState::Live { .. }
        ));
    }

    #[test]
    fn legacy_record_derives_expiry_and_flags_backfill() {
        let t0 = 1_700_000_000_000;
        let rec = record(t0, None, &[]);

        assert_eq!(
            classify(&rec, t0 + 1, TTL),
            ExpiryState::Live {
                expires_at: t0 + TTL,
                needs_backfill: true,
            }
        );
        // The derived window expires like a stored one.
        assert_eq!(classify(&rec, t0 + TTL, TTL), ExpiryState::ReapEligible);
    }

    #[test]
    fn stored_expiry_wins_over_derivation() {
        let t0 = 1_700_000_000_000;
        let rec = record(t0, Some(t0 + 5_000), &[]);

        assert_eq!(
            classify(&rec, t0, TTL),
            ExpiryState::Live {
                expires_at: t0 + 5_000,
                needs_backfill: false,
            }
        );
        assert_eq!(classify(&rec, t0 + 5_000, TTL), ExpiryState::ReapEligible);
    }
}
