//! # Content Hashing
//!
//! Stable, rename-proof identity for audio files.
//!
//! ## Overview
//!
//! A [`ContentHash`] is the SHA-256 digest of a file's complete byte content,
//! rendered as 64 lowercase hex characters. This is the same representation
//! the file server reports in its listing, so local and remote hashes can be
//! compared directly.
//!
//! [`ContentHasher`] consumes an async byte stream in fixed-size chunks. It
//! takes ownership of the stream so the handle is released on every exit
//! path, including read failures and cancellation.

use crate::{Result, SyncError};
use bridge_traits::ByteStream;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// Length of a hex-encoded SHA-256 digest.
pub const CONTENT_HASH_LEN: usize = 64;

const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Hex-encoded SHA-256 digest of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Parse a hash reported by a store.
    ///
    /// Accepts upper- or lowercase hex and normalizes to lowercase.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.len() != CONTENT_HASH_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SyncError::Remote {
                status: 0,
                message: format!("malformed content hash '{}'", trimmed),
            });
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut hex = String::with_capacity(CONTENT_HASH_LEN);
        for byte in digest {
            hex.push_str(&format!("{:02x}", byte));
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Streaming SHA-256 hasher.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    buffer_size: usize,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_READ_BUFFER,
        }
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Hash an entire stream.
    ///
    /// Returns the digest and the number of bytes consumed. Read failures
    /// are returned as [`SyncError::LocalIo`] tagged with `label`.
    pub async fn hash_stream(
        &self,
        stream: ByteStream,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<(ContentHash, u64)> {
        let mut stream = stream;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.buffer_size];
        let mut total = 0u64;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                read = stream.read(&mut buf) => read.map_err(|e| SyncError::local_io(label, e))?,
            };
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
            total += read as u64;
        }

        Ok((ContentHash::from_digest(&hasher.finalize()), total))
    }

    /// Hash an in-memory buffer.
    pub fn hash_bytes(data: &[u8]) -> ContentHash {
        ContentHash::from_digest(&Sha256::digest(data))
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}
