//! Persistence seam for the upload queue snapshot.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

/// Durable storage for the queue's single serialized snapshot.
///
/// The queue persists its whole contents as one blob under a fixed key, so
/// implementations only need whole-blob load and atomic replace.
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug + 'static {
    /// Read the persisted snapshot, or `None` if nothing was ever saved.
    async fn load(&self) -> io::Result<Option<Vec<u8>>>;

    /// Atomically replace the persisted snapshot.
    async fn save(&self, blob: &[u8]) -> io::Result<()>;
}

/// File-backed store: the snapshot lives at one fixed path and is replaced
/// by writing a sibling temp file and renaming it into place, so a crash
/// mid-save never leaves a half-written snapshot.
#[derive(Debug)]
pub struct FsQueueStore {
    path: PathBuf,
}

impl FsQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QueueStore for FsQueueStore {
    async fn load(&self) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn save(&self, blob: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    blob: parking_lot::Mutex<Option<Vec<u8>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.blob.lock().clone())
    }

    async fn save(&self, blob: &[u8]) -> io::Result<()> {
        *self.blob.lock() = Some(blob.to_vec());
        Ok(())
    }
}
