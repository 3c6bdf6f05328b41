//! # Transfer Channel
//!
//! Verified uploads and downloads of single files.
//!
//! ## Overview
//!
//! **Upload** streams the local file to the server as one multipart request
//! and then polls the server listing until the hash shows up. A duplicate
//! content conflict is accepted once the listing confirms the hash is
//! present.
//!
//! **Download** resolves the server identifier for a hash, replaces any
//! same-named local file, streams the body to disk chunk by chunk, waits for
//! the on-disk size to settle and re-hashes the result. A file whose digest
//! does not match is deleted; so is a file left behind by any other failure
//! or by a download that is dropped halfway. When the mismatching body came
//! from a cached identifier the cache entry is dropped and the download is
//! tried once more against a fresh track listing.
//!
//! Downloads are limited to names with a supported audio extension, the same
//! filter the local scan applies, so every written file is found again on
//! the next run.
//!
//! Both directions race every network call and chunk against the run's
//! cancellation token.

use crate::hasher::{ContentHash, ContentHasher};
use crate::id_cache::RemoteIdCache;
use crate::local_catalog::{default_audio_extensions, has_audio_extension, LocalFile};
use crate::remote_catalog::RemoteFileCatalog;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::{Result, SyncError};
use bridge_traits::{BridgeError, ByteStream, FileServer, FileSystemAccess, UploadMetadata};
use core_runtime::logging::strip_path;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Result of a verified upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub content_hash: ContentHash,
    pub filename: String,
    pub size_bytes: Option<u64>,
    /// The server already held this content.
    pub duplicate: bool,
    /// Verification attempts used before the hash was listed.
    pub attempts: u32,
}

/// Result of a verified download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub content_hash: ContentHash,
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub chunk_size: usize,
    pub verification: RetryPolicy,
    pub stabilization: RetryPolicy,
    /// Extensions a downloaded file name must carry
    pub audio_extensions: Vec<String>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            verification: RetryPolicy::upload_verification(),
            stabilization: RetryPolicy::download_stabilization(),
            audio_extensions: default_audio_extensions(),
        }
    }
}

/// Transfer channel for one sync run.
///
/// The track listing used to resolve download identifiers is fetched at
/// most once per channel unless a cached identifier turns out stale, so a
/// channel is created per run.
pub struct TransferChannel {
    server: Arc<dyn FileServer>,
    file_system: Arc<dyn FileSystemAccess>,
    catalog: RemoteFileCatalog,
    id_cache: Arc<dyn RemoteIdCache>,
    hasher: ContentHasher,
    destination: PathBuf,
    settings: TransferSettings,
    tracks_listed: AtomicBool,
}

impl TransferChannel {
    pub fn new(
        server: Arc<dyn FileServer>,
        file_system: Arc<dyn FileSystemAccess>,
        id_cache: Arc<dyn RemoteIdCache>,
        destination: impl Into<PathBuf>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            catalog: RemoteFileCatalog::new(server.clone()),
            server,
            file_system,
            id_cache,
            hasher: ContentHasher::with_buffer_size(settings.chunk_size),
            destination: destination.into(),
            settings,
            tracks_listed: AtomicBool::new(false),
        }
    }

    /// Upload one local file and wait until the server lists its hash.
    #[instrument(skip(self, file, cancel), fields(file = %file.filename, content_hash = %file.content_hash.short()))]
    pub async fn upload(&self, file: &LocalFile, cancel: &CancellationToken) -> Result<UploadOutcome> {
        let label = file.path.display().to_string();
        let body = self
            .file_system
            .open_read_stream(&file.path)
            .await
            .map_err(|e| SyncError::local_io(&label, e))?;

        let metadata = UploadMetadata::new(file.filename.clone())
            .with_content_type(content_type_for(&file.filename));

        debug!(size = file.size_bytes, "Uploading");
        let (size_bytes, duplicate) = match cancellable(
            cancel,
            self.server.upload(metadata, body, Some(file.size_bytes)),
        )
        .await
        .map_err(|e| e.with_content_hash(&file.content_hash))
        {
            Ok(receipt) => {
                let received = ContentHash::parse(&receipt.content_hash)?;
                if received != file.content_hash {
                    return Err(SyncError::Integrity {
                        filename: file.filename.clone(),
                        expected: file.content_hash.to_string(),
                        actual: received.to_string(),
                    });
                }
                if let Some(identifier) = receipt.identifier {
                    self.id_cache.put(&file.content_hash, identifier).await;
                }
                (receipt.file_size_bytes.or(Some(file.size_bytes)), false)
            }
            Err(SyncError::ServerConflict { message, .. }) => {
                info!(reason = %message, "Server reports duplicate content, verifying presence");
                (Some(file.size_bytes), true)
            }
            Err(e) => return Err(e),
        };

        let outcome = self
            .settings
            .verification
            .run_until(
                cancel,
                move |attempt| {
                    debug!(attempt, "Verifying upload");
                    self.catalog.contains(&file.content_hash, cancel)
                },
                |present| *present,
            )
            .await?;

        match outcome {
            RetryOutcome::Accepted { attempt, .. } => {
                info!(attempts = attempt, duplicate, "Upload verified");
                Ok(UploadOutcome {
                    content_hash: file.content_hash.clone(),
                    filename: file.filename.clone(),
                    size_bytes,
                    duplicate,
                    attempts: attempt,
                })
            }
            RetryOutcome::Exhausted { attempts, .. } if duplicate => {
                Err(SyncError::ServerConflict {
                    content_hash: file.content_hash.to_string(),
                    message: format!("still not listed after {} checks", attempts),
                })
            }
            RetryOutcome::Exhausted { attempts, .. } => Err(SyncError::VerificationFailed {
                content_hash: file.content_hash.to_string(),
                attempts,
            }),
        }
    }

    /// Download one remote file into the destination folder and verify it.
    #[instrument(skip(self, content_hash, cancel), fields(content_hash = %content_hash.short()))]
    pub async fn download(
        &self,
        content_hash: &ContentHash,
        filename: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        let filename = safe_filename(filename, content_hash);
        if !has_audio_extension(&filename, &self.settings.audio_extensions) {
            return Err(SyncError::UnsupportedFile { filename });
        }
        let target = self.destination.join(&filename);

        let cached = self.id_cache.get(content_hash).await.is_some();
        let size_bytes = match self.fetch_into(content_hash, &target, cancel).await {
            Err(SyncError::Integrity { .. }) if cached => {
                warn!(file = %filename, "Cached identifier served other content, resolving again");
                self.forget_identifier(content_hash).await;
                self.fetch_into(content_hash, &target, cancel).await
            }
            other => other,
        }?;

        info!(file = %filename, size = size_bytes, "Download verified");
        Ok(DownloadOutcome {
            content_hash: content_hash.clone(),
            path: target,
            filename,
            size_bytes,
        })
    }

    /// Delete a stored file by content hash.
    ///
    /// Returns `false` when the server no longer has it.
    #[instrument(skip(self, content_hash, cancel), fields(content_hash = %content_hash.short()))]
    pub async fn delete_remote(
        &self,
        content_hash: &ContentHash,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let identifier = match self.resolve_identifier(content_hash, cancel).await {
            Ok(identifier) => identifier,
            Err(SyncError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let deleted = cancellable(cancel, self.server.delete(&identifier)).await?;
        self.id_cache.remove(content_hash).await;
        info!(deleted, "Remote delete finished");
        Ok(deleted)
    }

    /// One download attempt into `target`. Nothing is left on disk unless it
    /// verified.
    async fn fetch_into(
        &self,
        content_hash: &ContentHash,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let label = target.display().to_string();
        let body = self.open_download(content_hash, cancel).await?;

        if self
            .file_system
            .exists(target)
            .await
            .map_err(|e| SyncError::local_io(&label, e))?
        {
            debug!(file = %strip_path(&label), "Replacing existing local file");
            self.file_system
                .delete_file(target)
                .await
                .map_err(|e| SyncError::local_io(&label, e))?;
        }

        let mut partial = PartialDownload::new(Arc::clone(&self.file_system), target);
        let result = self.write_verified(body, target, content_hash, cancel).await;
        partial.disarm();
        if result.is_err() {
            self.discard(target).await;
        }
        result
    }

    async fn forget_identifier(&self, content_hash: &ContentHash) {
        self.id_cache.remove(content_hash).await;
        self.tracks_listed.store(false, Ordering::SeqCst);
    }

    /// Resolve the identifier and open the body, re-resolving once if the
    /// cached identifier no longer exists on the server.
    async fn open_download(
        &self,
        content_hash: &ContentHash,
        cancel: &CancellationToken,
    ) -> Result<ByteStream> {
        let identifier = self.resolve_identifier(content_hash, cancel).await?;
        match cancellable(cancel, self.server.download(&identifier)).await {
            Err(SyncError::NotFound(_)) => {
                warn!(identifier = %identifier, "Stale identifier, resolving again");
                self.forget_identifier(content_hash).await;
                let identifier = self.resolve_identifier(content_hash, cancel).await?;
                cancellable(cancel, self.server.download(&identifier)).await
            }
            other => other,
        }
    }

    async fn resolve_identifier(
        &self,
        content_hash: &ContentHash,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if let Some(identifier) = self.id_cache.get(content_hash).await {
            return Ok(identifier);
        }

        if !self.tracks_listed.swap(true, Ordering::SeqCst) {
            let tracks = cancellable(cancel, self.server.list_tracks()).await?;
            debug!(tracks = tracks.len(), "Fetched track listing for identifier lookup");
            for track in tracks {
                if let Ok(hash) = ContentHash::parse(&track.content_hash) {
                    self.id_cache.put(&hash, track.identifier).await;
                }
            }
        }

        self.id_cache.get(content_hash).await.ok_or_else(|| {
            SyncError::NotFound(format!("no server identifier for {}", content_hash))
        })
    }

    /// Stream `body` into `target`, wait for the size to settle, re-hash.
    ///
    /// Returns the verified size. The caller removes the file on error.
    async fn write_verified(
        &self,
        body: ByteStream,
        target: &Path,
        expected: &ContentHash,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let label = target.display().to_string();
        let written = self.stream_to_file(body, target, cancel).await?;

        if written == 0 && *expected != ContentHasher::hash_bytes(&[]) {
            return Err(SyncError::Remote {
                status: 0,
                message: format!("server returned an empty body for {}", expected),
            });
        }

        self.wait_for_stable_size(target, written, cancel).await?;

        let reader = self
            .file_system
            .open_read_stream(target)
            .await
            .map_err(|e| SyncError::local_io(&label, e))?;
        let (actual, _) = self.hasher.hash_stream(reader, &label, cancel).await?;

        if actual != *expected {
            warn!(expected = %expected, actual = %actual, size = written, "Hash mismatch, deleting download");
            return Err(SyncError::Integrity {
                filename: target
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(written)
    }

    async fn stream_to_file(
        &self,
        body: ByteStream,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let label = target.display().to_string();
        let mut body = body;
        let mut sink = self
            .file_system
            .open_write_stream(target)
            .await
            .map_err(|e| SyncError::local_io(&label, e))?;

        let mut buf = vec![0u8; self.settings.chunk_size.max(1)];
        let mut written = 0u64;
        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                read = body.read(&mut buf) => read.map_err(SyncError::from_remote_stream)?,
            };
            if read == 0 {
                break;
            }
            sink.write_all(&buf[..read])
                .await
                .map_err(|e| SyncError::local_io(&label, e))?;
            written += read as u64;
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
        }

        sink.flush()
            .await
            .map_err(|e| SyncError::local_io(&label, e))?;
        sink.shutdown()
            .await
            .map_err(|e| SyncError::local_io(&label, e))?;
        debug!(bytes = written, "Body written");
        Ok(written)
    }

    /// Poll the file size until two consecutive reads agree with the number
    /// of bytes written.
    async fn wait_for_stable_size(
        &self,
        target: &Path,
        expected_size: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let label = target.display().to_string();
        let label_ref = label.as_str();
        let file_system = self.file_system.as_ref();
        let mut previous: Option<u64> = None;

        let outcome = self
            .settings
            .stabilization
            .run_until(
                cancel,
                move |_| async move {
                    file_system
                        .metadata(target)
                        .await
                        .map(|m| m.size)
                        .map_err(|e| SyncError::local_io(label_ref, e))
                },
                |size| {
                    let stable = previous == Some(*size) && *size == expected_size;
                    previous = Some(*size);
                    stable
                },
            )
            .await?;

        match outcome {
            RetryOutcome::Accepted { .. } => Ok(()),
            RetryOutcome::Exhausted { attempts, last } => Err(SyncError::LocalIo {
                path: label,
                message: format!(
                    "size did not settle after {} checks (last {:?}, expected {})",
                    attempts, last, expected_size
                ),
            }),
        }
    }

    async fn discard(&self, target: &Path) {
        match self.file_system.exists(target).await {
            Ok(true) => {
                if let Err(e) = self.file_system.delete_file(target).await {
                    warn!(file = %strip_path(&target.to_string_lossy()), error = %e, "Failed to remove partial download");
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(file = %strip_path(&target.to_string_lossy()), error = %e, "Could not check partial download");
            }
        }
    }
}

/// Removes a download target whose write was abandoned mid-way, e.g. because
/// the run future was dropped. Disarmed once the write has finished either way.
struct PartialDownload {
    file_system: Arc<dyn FileSystemAccess>,
    target: PathBuf,
    armed: bool,
}

impl PartialDownload {
    fn new(file_system: Arc<dyn FileSystemAccess>, target: &Path) -> Self {
        Self {
            file_system,
            target: target.to_path_buf(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let file_system = Arc::clone(&self.file_system);
        let target = std::mem::take(&mut self.target);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = file_system.delete_file(&target).await {
                        warn!(file = %strip_path(&target.to_string_lossy()), error = %e, "Failed to remove abandoned download");
                    }
                });
            }
            Err(_) => {
                warn!(file = %strip_path(&target.to_string_lossy()), "No runtime to remove abandoned download");
            }
        }
    }
}

async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, BridgeError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = call => result.map_err(SyncError::from),
    }
}

/// Final path component of a server-provided name.
///
/// Names that would escape the destination folder or are empty fall back
/// to `<hash>.bin`.
pub fn safe_filename(name: &str, content_hash: &ContentHash) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('\0');
    if base.is_empty() || base == "." || base == ".." {
        format!("{}.bin", content_hash)
    } else {
        base.to_string()
    }
}

/// MIME type sent with an upload, chosen by extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("aac") => "audio/aac",
        _ => "application/octet-stream",
    }
}
