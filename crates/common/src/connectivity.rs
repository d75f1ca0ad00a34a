//! Offline/online transition tracking.
//!
//! The UI owns connectivity detection and reports transitions here. An
//! offline→online edge requests one queue drain; rapid repeated transitions
//! coalesce into a single trigger. The monitor never retries failed drains
//! and never polls — the next transition or a new successful send are the
//! only other drain triggers.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::coordinator::DrainHandle;

/// Shared connectivity state for one engine.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    online: Mutex<bool>,
    drains: DrainHandle,
}

impl ConnectivityMonitor {
    /// New monitor. Starts offline until the first report says otherwise.
    pub fn new(drains: DrainHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                online: Mutex::new(false),
                drains,
            }),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.inner.online.lock()
    }

    /// Record a connectivity transition, requesting a drain on the
    /// offline→online edge.
    pub fn report(&self, online: bool) {
        let mut state = self.inner.online.lock();
        let was_online = *state;
        *state = online;
        drop(state);

        if online && !was_online {
            debug!("connectivity restored, requesting drain");
            self.inner.drains.request();
        }
    }
}
