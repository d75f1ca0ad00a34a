//! Binary payload storage behind pluggable object storage backends.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;

/// Object storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Ephemeral in-memory storage. Contents are lost on drop.
    Memory,
    /// Local filesystem storage rooted at `path`.
    Local { path: PathBuf },
    /// S3-compatible storage (AWS, MinIO, ...).
    S3 {
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        region: Option<String>,
    },
}

/// Photo payload storage.
///
/// A thin, path-addressed wrapper over [`object_store`] so the engine can
/// run against memory, a local directory, or an S3 bucket without caring
/// which. Payload paths follow `couples/{couple_id}/{photo_id}.jpg`.
#[derive(Debug, Clone)]
pub struct PayloadStore {
    inner: Arc<dyn ObjectStore>,
}

impl PayloadStore {
    /// Build a payload store from configuration.
    pub fn new(config: &StorageConfig) -> Result<Self, StoreError> {
        let inner: Arc<dyn ObjectStore> = match config {
            StorageConfig::Memory => Arc::new(InMemory::new()),
            StorageConfig::Local { path } => {
                std::fs::create_dir_all(path).map_err(|e| StoreError::Transient {
                    reason: format!("failed to create object directory {}: {e}", path.display()),
                })?;
                Arc::new(LocalFileSystem::new_with_prefix(path)?)
            }
            StorageConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(true);
                Arc::new(builder.build()?)
            }
        };
        Ok(Self { inner })
    }

    /// Ephemeral in-memory payload store.
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
        }
    }

    /// Store a payload at `path`, replacing any previous contents.
    pub async fn put(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        debug!(path = %path, size = data.len(), "storing payload");
        self.inner
            .put(&ObjectPath::from(path), data.into())
            .await?;
        Ok(())
    }

    /// Fetch the payload at `path`.
    pub async fn get(&self, path: &str) -> Result<Bytes, StoreError> {
        let result = self.inner.get(&ObjectPath::from(path)).await?;
        Ok(result.bytes().await?)
    }

    /// Delete the payload at `path`.
    ///
    /// Returns `Ok(false)` if there was nothing to delete, so repeated and
    /// partially-retried cleanups succeed.
    pub async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        match self.inner.delete(&ObjectPath::from(path)).await {
            Ok(()) => {
                debug!(path = %path, "payload deleted");
                Ok(true)
            }
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a payload exists at `path`.
    pub async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        match self.inner.head(&ObjectPath::from(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
