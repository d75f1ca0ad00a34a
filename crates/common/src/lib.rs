//! duet-common — offline-tolerant photo synchronization core for a paired
//! couple of devices.
//!
//! The engine reconciles locally durable state with an eventually-consistent
//! remote store across unreliable connectivity:
//!
//! - [`queue`]: the local durable queue holding pending uploads across
//!   restarts.
//! - [`coordinator`]: immediate sends with queued fallback, and the strictly
//!   ordered single-flight queue drain.
//! - [`connectivity`]: offline→online edge detection feeding coalesced drain
//!   triggers.
//! - [`feed`]: the live feed synchronizer — resolves records, derives and
//!   backfills expiries, filters expired content, schedules reaping.
//! - [`reaper`]: asynchronous deletion of expired, never-downloaded photos.
//! - [`engine`]: wires the components together for one [`CoupleContext`].
//!
//! Camera capture, overlay rendering, pairing UI, and push notifications are
//! external collaborators; this crate only sees finished `(image, caption)`
//! pairs, connectivity transition reports, and feed subscribers.

pub mod config;
pub mod connectivity;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod feed;
pub mod photo;
pub mod queue;
pub mod reaper;

pub use config::{Config, DEFAULT_TTL_MS};
pub use context::CoupleContext;
pub use coordinator::{SendError, SendOutcome, UploadCoordinator};
pub use engine::Engine;
pub use feed::{FeedSubscription, FeedSynchronizer};
pub use photo::{PendingUpload, SharedPhoto};
pub use queue::UploadQueue;
