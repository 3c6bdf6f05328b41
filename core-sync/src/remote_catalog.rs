//! # Remote File Catalog
//!
//! Authoritative `(hash, filename)` listing held by the file server.
//!
//! ## Overview
//!
//! Every call issues a fresh `ListStatus` request. Nothing is cached here:
//! other clients can change the server between two calls, and upload
//! verification depends on seeing the current state. Failures are mapped to
//! [`SyncError`] through the bridge classification, so an expired token
//! surfaces as [`SyncError::Auth`] and an unreachable server as
//! [`SyncError::Network`].

use crate::hasher::ContentHash;
use crate::{Result, SyncError};
use bridge_traits::FileServer;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// A file the server reports as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content_hash: ContentHash,
    pub filename: String,
    pub uploaded_at: Option<String>,
}

/// Server listing keyed by content hash, in listing order.
#[derive(Debug, Clone, Default)]
pub struct RemoteInventory {
    files: Vec<RemoteFile>,
    index: HashMap<ContentHash, usize>,
}

impl RemoteInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later entries with an already-seen hash are ignored.
    pub fn insert(&mut self, file: RemoteFile) -> bool {
        if self.index.contains_key(&file.content_hash) {
            return false;
        }
        self.index.insert(file.content_hash.clone(), self.files.len());
        self.files.push(file);
        true
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.index.contains_key(hash)
    }

    pub fn filename(&self, hash: &ContentHash) -> Option<&str> {
        self.index
            .get(hash)
            .map(|&i| self.files[i].filename.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteFile> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<RemoteFile> for RemoteInventory {
    fn from_iter<I: IntoIterator<Item = RemoteFile>>(iter: I) -> Self {
        let mut inventory = RemoteInventory::new();
        for file in iter {
            inventory.insert(file);
        }
        inventory
    }
}

#[derive(Clone)]
pub struct RemoteFileCatalog {
    server: Arc<dyn FileServer>,
}

impl RemoteFileCatalog {
    pub fn new(server: Arc<dyn FileServer>) -> Self {
        Self { server }
    }

    /// Fetch the current server listing.
    #[instrument(skip(self, cancel))]
    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<RemoteInventory> {
        let entries = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            result = self.server.list_status() => result?,
        };

        let mut inventory = RemoteInventory::new();
        for entry in entries {
            match ContentHash::parse(&entry.content_hash) {
                Ok(content_hash) => {
                    inventory.insert(RemoteFile {
                        content_hash,
                        filename: entry.filename,
                        uploaded_at: entry.uploaded_at,
                    });
                }
                Err(_) => {
                    warn!(
                        file = %entry.filename,
                        content_hash = %entry.content_hash,
                        "Ignoring listing entry with malformed hash"
                    );
                }
            }
        }

        debug!(files = inventory.len(), "Remote catalog fetched");
        Ok(inventory)
    }

    /// Whether the server currently lists `hash`. Always re-queries.
    pub async fn contains(&self, hash: &ContentHash, cancel: &CancellationToken) -> Result<bool> {
        Ok(self.fetch(cancel).await?.contains(hash))
    }
}
