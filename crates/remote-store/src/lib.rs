//! Remote storage backends for the duet photo feed.
//!
//! Two halves, mirroring the remote collaborator split:
//!
//! - [`PayloadStore`]: binary photo payloads behind pluggable object
//!   storage (in-memory, local filesystem, or S3-compatible).
//! - [`RecordStore`]: the per-couple ordered metadata record collection
//!   with live snapshot subscriptions, plus [`MemoryRecordStore`], the
//!   reference implementation used by tests and local development.

mod error;
mod memory;
mod objects;
mod records;

pub use error::StoreError;
pub use memory::MemoryRecordStore;
pub use objects::{PayloadStore, StorageConfig};
pub use records::{NewPhotoRecord, PhotoRecord, RecordStore, Snapshot};
