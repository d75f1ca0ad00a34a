use object_store::Error as ObjectStoreError;

/// Errors surfaced by the remote record and payload stores.
///
/// Variants classify failures by how callers should react: `Transient`
/// failures are retried on a later connectivity trigger, `PermissionDenied`
/// is surfaced without automatic retry, `NotFound` is absorbed by idempotent
/// cleanup paths, and `Malformed` isolates a single bad record from its
/// batch.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed object or record does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The remote rejected the caller's credentials or access.
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    /// Connectivity-class failure; safe to retry on a later trigger.
    #[error("transient store failure: {reason}")]
    Transient { reason: String },

    /// The record exists but could not be interpreted.
    #[error("malformed record {id}: {reason}")]
    Malformed { id: String, reason: String },
}

impl StoreError {
    /// Whether this failure class is expected to clear on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}

impl From<ObjectStoreError> for StoreError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound { path, .. } => StoreError::NotFound { path },
            ObjectStoreError::PermissionDenied { path, source } => StoreError::PermissionDenied {
                reason: format!("{path}: {source}"),
            },
            ObjectStoreError::Unauthenticated { path, source } => StoreError::PermissionDenied {
                reason: format!("{path}: {source}"),
            },
            other => StoreError::Transient {
                reason: other.to_string(),
            },
        }
    }
}
