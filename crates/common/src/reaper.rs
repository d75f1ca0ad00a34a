//! Asynchronous deletion of expired, never-downloaded photos.
//!
//! The feed synchronizer classifies reap-eligible records and hands them
//! over a channel to a dedicated worker; cleanup is fully decoupled from
//! feed emission, so a reaping failure never delays a snapshot reaching
//! subscribers.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use remote_store::{PayloadStore, RecordStore};

/// A photo past its time-to-live with no download acknowledged.
#[derive(Debug, Clone)]
pub struct ReapJob {
    pub couple_id: String,
    pub record_id: String,
    pub image_path: String,
}

/// Dispatcher handle for reap jobs.
///
/// Cheap to clone and share; the synchronizer holds one per subscription.
#[derive(Debug, Clone)]
pub struct ReapDispatcher {
    tx: flume::Sender<ReapJob>,
}

impl ReapDispatcher {
    /// Create a dispatcher and receiver pair. The receiver goes to the
    /// worker task.
    pub fn new() -> (Self, ReapReceiver) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, ReapReceiver { rx })
    }

    /// Hand a job to the reap worker.
    ///
    /// Non-blocking; fails only when the worker has shut down.
    pub fn dispatch(&self, job: ReapJob) -> Result<()> {
        self.tx
            .send(job)
            .map_err(|_| anyhow::anyhow!("reap worker has shut down"))
    }
}

/// Receiving end for the reap worker.
#[derive(Debug)]
pub struct ReapReceiver {
    rx: flume::Receiver<ReapJob>,
}

/// Reap worker loop.
///
/// Failures are logged and never propagate; a record that survives a failed
/// reap is rescheduled by whichever snapshot observes it next.
pub async fn run_worker(
    records: Arc<dyn RecordStore>,
    payloads: PayloadStore,
    receiver: ReapReceiver,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let mut jobs = receiver.rx.into_stream();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("reap worker shutting down");
                break;
            }
            job = jobs.next() => match job {
                Some(job) => {
                    if let Err(e) = execute(records.as_ref(), &payloads, &job).await {
                        warn!(record_id = %job.record_id, error = %e, "reap failed");
                    }
                }
                None => break,
            }
        }
    }
}

/// Delete one expired photo: payload object first, then the record.
///
/// An already-absent object counts as deleted, so partial or repeated reaps
/// converge. The record delete is unconditional; a download acknowledgment
/// racing it is resolved by whichever write lands first. A conditional
/// delete that refuses while `downloaded_by` is non-empty would close that
/// window and is the intended hardening.
pub async fn execute(
    records: &dyn RecordStore,
    payloads: &PayloadStore,
    job: &ReapJob,
) -> Result<()> {
    match payloads.delete(&job.image_path).await {
        Ok(true) => debug!(path = %job.image_path, "expired payload deleted"),
        Ok(false) => debug!(path = %job.image_path, "expired payload already gone"),
        // Keep going: the record is still expired, and a later snapshot
        // retries the orphaned object.
        Err(e) => warn!(path = %job.image_path, error = %e, "failed to delete expired payload"),
    }

    records.delete(&job.couple_id, &job.record_id).await?;
    info!(record_id = %job.record_id, "expired photo reaped");
    Ok(())
}
