//! Upload coordination: immediate sends, offline fallback, ordered drains.
//!
//! Remote writes are not transactional, so the queue drains strictly in
//! insertion order, one item at a time, on a single worker task. Each item
//! lands in two phases: the binary payload first, then the metadata record
//! that references it — a record never points at an object that has not
//! landed.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use remote_store::{NewPhotoRecord, PayloadStore, RecordStore, StoreError};

use crate::connectivity::ConnectivityMonitor;
use crate::context::CoupleContext;
use crate::photo::{photo_object_path, PendingUpload, CAPTION_MAX_CHARS};
use crate::queue::{QueueError, UploadQueue};

/// How a send resolved: always exactly one of these, never a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The two-phase remote write completed; the photo is visible in the
    /// partner's feed.
    Delivered { id: Uuid },
    /// The photo is durably queued and will go out on a later drain.
    Queued { id: Uuid },
}

impl SendOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            SendOutcome::Delivered { id } | SendOutcome::Queued { id } => *id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("caption is {len} characters, over the {CAPTION_MAX_CHARS} limit")]
    CaptionTooLong { len: usize },

    /// The item could not be delivered *or* durably queued; it was not sent
    /// and will not be retried.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Handle for requesting queue drains.
///
/// Cheap to clone. A request is dropped silently when one is already
/// pending, which coalesces bursts of triggers into a single drain.
#[derive(Debug, Clone)]
pub struct DrainHandle {
    tx: flume::Sender<()>,
}

impl DrainHandle {
    /// Create a handle and the receiving end for the drain worker.
    pub fn new() -> (Self, DrainTriggers) {
        let (tx, rx) = flume::bounded(1);
        (Self { tx }, DrainTriggers { rx })
    }

    /// Request a drain. Non-blocking.
    ///
    /// A full channel means a drain is already pending; a disconnected one
    /// means the worker has shut down. Neither needs handling here.
    pub fn request(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Receiving end of the drain trigger channel, owned by the worker.
#[derive(Debug)]
pub struct DrainTriggers {
    rx: flume::Receiver<()>,
}

impl DrainTriggers {
    /// Number of buffered triggers. Test hook for coalescing behavior.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Coordinates immediate sends and queue drains for one couple context.
#[derive(Debug, Clone)]
pub struct UploadCoordinator {
    inner: Arc<Inner>,
    drains: DrainHandle,
}

#[derive(Debug)]
struct Inner {
    ctx: CoupleContext,
    queue: Arc<UploadQueue>,
    records: Arc<dyn RecordStore>,
    payloads: PayloadStore,
    ttl_ms: i64,
    connectivity: ConnectivityMonitor,
}

impl UploadCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: CoupleContext,
        queue: Arc<UploadQueue>,
        records: Arc<dyn RecordStore>,
        payloads: PayloadStore,
        ttl_ms: i64,
        connectivity: ConnectivityMonitor,
        drains: DrainHandle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                queue,
                records,
                payloads,
                ttl_ms,
                connectivity,
            }),
            drains,
        }
    }

    /// Send a finished photo to the partner.
    ///
    /// Offline, the item goes straight to the durable queue. Online, the
    /// two-phase write is attempted synchronously; a failure falls back to
    /// the queue so the photo is delayed, never lost.
    pub async fn send(&self, image: &[u8], caption: &str) -> Result<SendOutcome, SendError> {
        let len = caption.chars().count();
        if len > CAPTION_MAX_CHARS {
            return Err(SendError::CaptionTooLong { len });
        }

        let item = PendingUpload::new(image, caption);
        let id = item.id;

        if !self.inner.connectivity.is_online() {
            debug!(id = %id, "offline, queueing photo");
            self.inner.queue.enqueue(item).await?;
            return Ok(SendOutcome::Queued { id });
        }

        match upload_item(&self.inner, &item).await {
            Ok(()) => {
                info!(id = %id, "photo delivered");
                // Pick up any backlog now that a write just went through.
                self.drains.request();
                Ok(SendOutcome::Delivered { id })
            }
            Err(e) => {
                warn!(id = %id, error = %e, "send failed, falling back to queue");
                self.inner.queue.enqueue(item).await?;
                Ok(SendOutcome::Queued { id })
            }
        }
    }
}

/// Two-phase write for one item: payload object, then the metadata record
/// referencing it. On a metadata failure the orphaned object is deleted so
/// a retry starts clean.
async fn upload_item(inner: &Inner, item: &PendingUpload) -> Result<(), StoreError> {
    let path = photo_object_path(inner.ctx.couple_id(), item.id);
    let bytes = item.image_bytes().map_err(|e| StoreError::Malformed {
        id: item.id.to_string(),
        reason: format!("undecodable payload: {e}"),
    })?;

    inner.payloads.put(&path, bytes.into()).await?;

    let record = NewPhotoRecord {
        image_path: path.clone(),
        caption: item.caption.clone(),
        sender_id: inner.ctx.local_user_id().to_string(),
        created_at: item.created_at,
        expires_at: Some(item.created_at + inner.ttl_ms),
    };
    if let Err(e) = inner.records.insert(inner.ctx.couple_id(), record).await {
        // Compensate so no object is left that nothing references.
        if let Err(del) = inner.payloads.delete(&path).await {
            warn!(path = %path, error = %del, "failed to delete orphaned payload");
        }
        return Err(e);
    }
    Ok(())
}

/// Drain the queue strictly in insertion order, one item at a time.
///
/// The first failure halts the drain: the failed item and everything behind
/// it stay queued for the next trigger, preserving order. A crash between a
/// successful upload and the queue removal re-uploads that item on the next
/// drain (at-least-once, not exactly-once).
async fn drain(inner: &Inner) {
    let items = inner.queue.list().await;
    if items.is_empty() {
        return;
    }
    info!(pending = items.len(), "draining upload queue");

    for item in items {
        match upload_item(inner, &item).await {
            Ok(()) => {
                if let Err(e) = inner.queue.remove(item.id).await {
                    warn!(id = %item.id, error = %e, "delivered item still queued, halting drain");
                    return;
                }
                info!(id = %item.id, "queued photo delivered");
            }
            Err(e) => {
                warn!(id = %item.id, error = %e, "drain halted, item stays queued");
                return;
            }
        }
    }
}

/// Single-consumer drain worker.
///
/// Being the only caller of [`drain`] makes drains single-flight. A trigger
/// arriving mid-drain is held (at most one) by the bounded channel and runs
/// as a follow-up drain, so sends that enqueue mid-drain are picked up
/// without two drains ever overlapping.
pub async fn run_drain_worker(
    coordinator: UploadCoordinator,
    triggers: DrainTriggers,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let mut stream = triggers.rx.into_stream();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("drain worker shutting down");
                break;
            }
            trigger = stream.next() => match trigger {
                Some(()) => drain(&coordinator.inner).await,
                None => break,
            }
        }
    }
}
