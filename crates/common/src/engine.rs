//! Engine state — wires the queue, coordinator, synchronizer, and their
//! background workers together for one pairing.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use remote_store::{PayloadStore, RecordStore, StoreError};

use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::context::CoupleContext;
use crate::coordinator::{run_drain_worker, DrainHandle, UploadCoordinator};
use crate::feed::FeedSynchronizer;
use crate::queue::{FsQueueStore, UploadQueue};
use crate::reaper::{self, ReapDispatcher};

#[derive(Debug, thiserror::Error)]
pub enum EngineSetupError {
    #[error("failed to set up payload storage: {0}")]
    Storage(#[from] StoreError),
}

/// One device's synchronization engine for one pairing.
///
/// Owns the drain and reap workers. Dropping the engine (after
/// [`Engine::shutdown`], or outright at unpairing) tears the couple context
/// down; in-flight two-phase writes still run to completion on the worker
/// before it observes the shutdown signal.
pub struct Engine {
    ctx: CoupleContext,
    queue: Arc<UploadQueue>,
    coordinator: UploadCoordinator,
    connectivity: ConnectivityMonitor,
    feed: FeedSynchronizer,
    shutdown_tx: watch::Sender<()>,
    workers: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Wire up an engine from configuration and a record store backend.
    pub fn new(
        ctx: CoupleContext,
        config: &Config,
        records: Arc<dyn RecordStore>,
    ) -> Result<Self, EngineSetupError> {
        let payloads = PayloadStore::new(&config.storage)?;
        let queue = Arc::new(UploadQueue::new(Arc::new(FsQueueStore::new(
            config.queue_file(),
        ))));
        Ok(Self::with_parts(ctx, config, records, payloads, queue))
    }

    /// Wire up an engine from already-built parts.
    ///
    /// Lets embedders and tests swap the queue store or payload backend.
    pub fn with_parts(
        ctx: CoupleContext,
        config: &Config,
        records: Arc<dyn RecordStore>,
        payloads: PayloadStore,
        queue: Arc<UploadQueue>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let (reaper, reap_receiver) = ReapDispatcher::new();
        let (drains, triggers) = DrainHandle::new();
        let connectivity = ConnectivityMonitor::new(drains.clone());

        let coordinator = UploadCoordinator::new(
            ctx.clone(),
            queue.clone(),
            records.clone(),
            payloads.clone(),
            config.ttl_ms,
            connectivity.clone(),
            drains,
        );
        let feed = FeedSynchronizer::new(
            ctx.clone(),
            records.clone(),
            payloads.clone(),
            config.ttl_ms,
            reaper,
        );

        let workers = vec![
            tokio::spawn(run_drain_worker(
                coordinator.clone(),
                triggers,
                shutdown_rx.clone(),
            )),
            tokio::spawn(reaper::run_worker(
                records,
                payloads,
                reap_receiver,
                shutdown_rx,
            )),
        ];

        info!(couple_id = %ctx.couple_id(), "engine started");
        Self {
            ctx,
            queue,
            coordinator,
            connectivity,
            feed,
            shutdown_tx,
            workers,
        }
    }

    pub fn context(&self) -> &CoupleContext {
        &self.ctx
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    pub fn coordinator(&self) -> &UploadCoordinator {
        &self.coordinator
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn feed(&self) -> &FeedSynchronizer {
        &self.feed
    }

    /// Stop the background workers and tear the pairing context down.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for worker in self.workers {
            let _ = worker.await;
        }
        info!(couple_id = %self.ctx.couple_id(), "engine stopped");
    }
}
