//! Content-Addressable File Server Abstraction
//!
//! The remote side of a sync: a server that identifies every stored file by
//! the hash of its bytes and exposes list/upload/download/delete operations.
//!
//! Implementations must map failures onto [`BridgeError`](crate::error::BridgeError)
//! consistently, since the sync engine decides run-aborting versus per-file
//! failures from the variant alone:
//!
//! | Condition | Variant |
//! |-----------|---------|
//! | Rejected or expired credential | `Unauthorized` |
//! | Deadline expired | `Timeout` |
//! | Refused/reset connection, unresolved host | `ConnectionFailed` |
//! | Unknown identifier | `NotFound` |
//! | Content already stored | `Conflict` |
//! | Any other non-success status | `HttpStatus` |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::ByteStream;

/// One row of the server's authoritative listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileEntry {
    /// Lowercase hex digest of the stored bytes
    pub content_hash: String,
    pub filename: String,
    /// Server-side upload time, as reported
    pub uploaded_at: Option<String>,
}

/// Descriptive data sent alongside an upload body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMetadata {
    pub filename: String,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_secs: Option<u32>,
}

impl UploadMetadata {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// What the server reports after storing an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Hash the server computed on receipt
    pub content_hash: String,
    pub filename: String,
    pub file_size_bytes: Option<u64>,
    /// Server identifier for later download/delete, when the protocol has one
    pub identifier: Option<String>,
}

/// Identifier binding for a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub identifier: String,
    pub content_hash: String,
    pub filename: String,
}

/// Remote content-addressable file server.
///
/// All calls are authenticated with the credential the implementation was
/// constructed with; the engine never refreshes credentials.
#[async_trait]
pub trait FileServer: Send + Sync {
    /// Full current listing. Side-effect free and idempotent.
    async fn list_status(&self) -> Result<Vec<RemoteFileEntry>>;

    /// Stream `body` to the server as one logical upload.
    async fn upload(
        &self,
        metadata: UploadMetadata,
        body: ByteStream,
        size_hint: Option<u64>,
    ) -> Result<UploadReceipt>;

    /// Identifier bindings for every stored file.
    async fn list_tracks(&self) -> Result<Vec<RemoteTrack>>;

    /// Stream the stored bytes behind `identifier`.
    async fn download(&self, identifier: &str) -> Result<ByteStream>;

    /// Remove a stored file. `Ok(false)` when nothing was deleted.
    async fn delete(&self, identifier: &str) -> Result<bool>;
}
