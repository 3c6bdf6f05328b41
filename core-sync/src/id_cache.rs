//! # Remote Identifier Cache
//!
//! Maps content hashes to the identifiers the server uses in download and
//! delete URLs.
//!
//! ## Overview
//!
//! The listing used for diffing carries hashes only, while downloads are
//! addressed by server identifier. Identifiers are learned from upload
//! receipts and from the track listing, and kept here so later runs can skip
//! the extra lookup. The file-backed variant is the only state that outlives
//! a run besides the transferred files.

use crate::hasher::ContentHash;
use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use core_runtime::logging::strip_path;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait RemoteIdCache: Send + Sync {
    async fn get(&self, hash: &ContentHash) -> Option<String>;

    async fn put(&self, hash: &ContentHash, identifier: String);

    async fn remove(&self, hash: &ContentHash);

    /// Write the cache to durable storage, if it has any.
    async fn persist(&self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryRemoteIdCache {
    entries: RwLock<HashMap<ContentHash, String>>,
}

impl InMemoryRemoteIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries(entries: HashMap<ContentHash, String>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl RemoteIdCache for InMemoryRemoteIdCache {
    async fn get(&self, hash: &ContentHash) -> Option<String> {
        self.entries.read().await.get(hash).cloned()
    }

    async fn put(&self, hash: &ContentHash, identifier: String) {
        self.entries.write().await.insert(hash.clone(), identifier);
    }

    async fn remove(&self, hash: &ContentHash) {
        self.entries.write().await.remove(hash);
    }

    async fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// Cache persisted as a JSON object `{hash: identifier}`.
pub struct JsonFileIdCache {
    file_system: Arc<dyn FileSystemAccess>,
    path: PathBuf,
    inner: InMemoryRemoteIdCache,
}

impl JsonFileIdCache {
    /// Load the cache from `path`.
    ///
    /// A missing file yields an empty cache. An unreadable or corrupt file
    /// is logged and replaced on the next persist.
    pub async fn load(file_system: Arc<dyn FileSystemAccess>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read_entries(file_system.as_ref(), &path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %strip_path(&path.to_string_lossy()), error = %e, "Ignoring unreadable identifier cache");
                HashMap::new()
            }
        };
        debug!(path = %strip_path(&path.to_string_lossy()), entries = entries.len(), "Loaded identifier cache");

        Self {
            file_system,
            path,
            inner: InMemoryRemoteIdCache::with_entries(entries),
        }
    }

    async fn read_entries(
        fs: &dyn FileSystemAccess,
        path: &Path,
    ) -> Result<HashMap<ContentHash, String>> {
        if !fs.exists(path).await? {
            return Ok(HashMap::new());
        }
        let raw = fs
            .read_file(path)
            .await
            .map_err(|e| SyncError::local_io(path.display(), e))?;
        serde_json::from_slice(&raw).map_err(|e| SyncError::local_io(path.display(), e))
    }
}

#[async_trait]
impl RemoteIdCache for JsonFileIdCache {
    async fn get(&self, hash: &ContentHash) -> Option<String> {
        self.inner.get(hash).await
    }

    async fn put(&self, hash: &ContentHash, identifier: String) {
        self.inner.put(hash, identifier).await;
    }

    async fn remove(&self, hash: &ContentHash) {
        self.inner.remove(hash).await;
    }

    async fn persist(&self) -> Result<()> {
        let json = {
            let entries = self.inner.entries.read().await;
            serde_json::to_vec_pretty(&*entries)
                .map_err(|e| SyncError::local_io(self.path.display(), e))?
        };
        self.file_system
            .write_file(&self.path, Bytes::from(json))
            .await
            .map_err(|e| SyncError::local_io(self.path.display(), e))
    }
}
