//! # Sync Coordinator
//!
//! Orchestrates two-way synchronization between the music folder and the
//! file server.
//!
//! ## Overview
//!
//! The `SyncCoordinator` owns the single-flight permit and drives each run
//! through its phases:
//!
//! 1. **Analyzing**: fetch the server listing, then walk and hash the music
//!    folder. Any failure here aborts the run before a transfer starts.
//! 2. **Diffing**: compute the upload and download queue from the two hash
//!    sets.
//! 3. **Transferring**: drain the queue one item at a time. A failed item is
//!    counted and reported; a run-fatal error (authentication, transport,
//!    cancellation) aborts immediately.
//! 4. **Finalizing**: ask the library refresher to re-index the folder.
//!
//! Progress, per-item failures and the terminal outcome are published on the
//! [`EventBus`]. Aborted runs skip Finalizing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncCoordinator};
//! use std::sync::Arc;
//!
//! let coordinator = Arc::new(SyncCoordinator::new(
//!     SyncConfig::default(),
//!     file_server,
//!     file_system,
//!     "/storage/Music",
//!     event_bus,
//! ));
//!
//! let handle = coordinator.start_sync()?;
//! println!("Started run {}", handle.run_id);
//! let report = handle.wait().await?;
//! println!("{}", report.message);
//! ```

use crate::diff::{SyncPlan, WorkItem};
use crate::hasher::{ContentHash, ContentHasher};
use crate::id_cache::{InMemoryRemoteIdCache, RemoteIdCache};
use crate::job::{ItemFailure, SyncPhase, SyncReport, SyncRun, SyncRunId};
use crate::local_catalog::{default_audio_extensions, LocalFileCatalog};
use crate::remote_catalog::RemoteFileCatalog;
use crate::retry::RetryPolicy;
use crate::transfer::{TransferChannel, TransferSettings};
use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::{FileServer, FileSystemAccess};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent, TransferEvent};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Audio file extensions to include, without the dot
    pub audio_extensions: Vec<String>,

    /// Upload and download chunk size (bytes)
    pub chunk_size: usize,

    /// Polling used to confirm an upload is listed by the server
    pub verification: RetryPolicy,

    /// Polling used to wait for a downloaded file's size to settle
    pub stabilization: RetryPolicy,

    /// Timeout for an entire run
    pub sync_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            audio_extensions: default_audio_extensions(),
            chunk_size: 64 * 1024,
            verification: RetryPolicy::upload_verification(),
            stabilization: RetryPolicy::download_stabilization(),
            sync_timeout: Duration::from_secs(3600),
        }
    }
}

impl SyncConfig {
    fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            chunk_size: self.chunk_size,
            verification: self.verification,
            stabilization: self.stabilization,
            audio_extensions: self.audio_extensions.clone(),
        }
    }
}

/// Re-indexes the music folder once a run has finished transferring.
#[async_trait]
pub trait LibraryRefresher: Send + Sync {
    async fn refresh_library(&self) -> Result<()>;
}

/// A run started in the background.
#[derive(Debug)]
pub struct SyncHandle {
    pub run_id: SyncRunId,
    pub join: JoinHandle<Result<SyncReport>>,
}

impl SyncHandle {
    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<SyncReport> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(SyncError::Cancelled),
        }
    }
}

/// Active sync run tracking
#[derive(Clone)]
struct ActiveSync {
    run_id: SyncRunId,
    cancellation_token: CancellationToken,
}

/// Clears the active-run slot when a run ends, including when its future is
/// dropped before finishing.
struct ActiveRunGuard<'a> {
    active: &'a Mutex<Option<ActiveSync>>,
    run_id: SyncRunId,
}

impl Drop for ActiveRunGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().map(|a| a.run_id) == Some(self.run_id) {
            *active = None;
        }
    }
}

pub struct SyncCoordinator {
    config: SyncConfig,
    server: Arc<dyn FileServer>,
    file_system: Arc<dyn FileSystemAccess>,
    music_dir: PathBuf,
    event_bus: EventBus,
    id_cache: Arc<dyn RemoteIdCache>,
    library_refresher: Option<Arc<dyn LibraryRefresher>>,

    /// Single-flight permit; a run holds it for its whole duration.
    permit: Arc<Semaphore>,
    active: Mutex<Option<ActiveSync>>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        server: Arc<dyn FileServer>,
        file_system: Arc<dyn FileSystemAccess>,
        music_dir: impl Into<PathBuf>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            server,
            file_system,
            music_dir: music_dir.into(),
            event_bus,
            id_cache: Arc::new(InMemoryRemoteIdCache::new()),
            library_refresher: None,
            permit: Arc::new(Semaphore::new(1)),
            active: Mutex::new(None),
        }
    }

    pub fn with_id_cache(mut self, id_cache: Arc<dyn RemoteIdCache>) -> Self {
        self.id_cache = id_cache;
        self
    }

    pub fn with_library_refresher(mut self, refresher: Arc<dyn LibraryRefresher>) -> Self {
        self.library_refresher = Some(refresher);
        self
    }

    pub fn music_dir(&self) -> &Path {
        &self.music_dir
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Run a sync to completion on the current task.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SyncInProgress`] without waiting when another run
    /// holds the permit. Every other failure is reported through the
    /// returned [`SyncReport`].
    pub async fn run_sync(&self) -> Result<SyncReport> {
        self.run_sync_with_token(CancellationToken::new()).await
    }

    /// Like [`run_sync`](Self::run_sync), cancelled through `token`.
    pub async fn run_sync_with_token(&self, token: CancellationToken) -> Result<SyncReport> {
        let permit = self.try_acquire()?;
        let run = self.register(SyncRun::new(), token.clone());
        self.execute(permit, run, token).await
    }

    /// Start a sync on a background task.
    ///
    /// The permit is taken before this returns, so a second call made right
    /// after fails with [`SyncError::SyncInProgress`].
    pub fn start_sync(self: &Arc<Self>) -> Result<SyncHandle> {
        let permit = self.try_acquire()?;
        let token = CancellationToken::new();
        let run = self.register(SyncRun::new(), token.clone());
        let run_id = run.id;

        let coordinator = Arc::clone(self);
        let join = tokio::spawn(async move { coordinator.execute(permit, run, token).await });

        info!(run_id = %run_id, "Started background sync");
        Ok(SyncHandle { run_id, join })
    }

    /// Cancel the active run, if any.
    pub fn cancel_active(&self) -> bool {
        match self.active().as_ref() {
            Some(active) => {
                info!(run_id = %active.run_id, "Cancelling sync run");
                active.cancellation_token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_sync_active(&self) -> bool {
        self.permit.available_permits() == 0
    }

    pub fn active_run_id(&self) -> Option<SyncRunId> {
        self.active().as_ref().map(|active| active.run_id)
    }

    /// Delete a stored file from the server by content hash.
    ///
    /// Not allowed while a run is active.
    #[instrument(skip(self, content_hash), fields(content_hash = %content_hash.short()))]
    pub async fn delete_remote(&self, content_hash: &ContentHash) -> Result<bool> {
        let _permit = self.try_acquire()?;
        let channel = self.transfer_channel();
        let deleted = channel
            .delete_remote(content_hash, &CancellationToken::new())
            .await?;
        self.persist_id_cache().await;
        Ok(deleted)
    }

    fn try_acquire(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permit)
            .try_acquire_owned()
            .map_err(|_| SyncError::SyncInProgress)
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveSync>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, run: SyncRun, token: CancellationToken) -> SyncRun {
        *self.active() = Some(ActiveSync {
            run_id: run.id,
            cancellation_token: token,
        });
        run
    }

    fn transfer_channel(&self) -> TransferChannel {
        TransferChannel::new(
            Arc::clone(&self.server),
            Arc::clone(&self.file_system),
            Arc::clone(&self.id_cache),
            self.music_dir.clone(),
            self.config.transfer_settings(),
        )
    }

    /// Run the phases under the whole-run timeout and publish the outcome.
    #[instrument(skip_all, fields(run_id = %run.id))]
    async fn execute(
        &self,
        permit: OwnedSemaphorePermit,
        mut run: SyncRun,
        cancel: CancellationToken,
    ) -> Result<SyncReport> {
        let active_guard = ActiveRunGuard {
            active: &self.active,
            run_id: run.id,
        };
        let run_id = run.id.to_string();
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                run_id: run_id.clone(),
            }))
            .ok();

        let result = match tokio::time::timeout(
            self.config.sync_timeout,
            self.drive(&mut run, &cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(SyncError::Timeout(self.config.sync_timeout.as_secs()))
            }
        };

        let terminal = match result {
            Ok(()) => {
                info!(
                    completed = run.progress.completed,
                    errors = run.progress.errors,
                    "{}",
                    run.progress.message
                );
                SyncEvent::Completed {
                    run_id,
                    outcome: run
                        .outcome()
                        .map(|o| o.as_str().to_string())
                        .unwrap_or_default(),
                    completed: run.progress.completed,
                    total: run.progress.total,
                    errors: run.progress.errors,
                    duration_ms: run.elapsed().as_millis() as u64,
                    message: run.progress.message.clone(),
                }
            }
            Err(e) => {
                if let Err(transition) = run.abort(&e) {
                    warn!(error = %transition, "Run already finished when the error arrived");
                }
                if matches!(e, SyncError::Cancelled) {
                    warn!("Sync run cancelled");
                    SyncEvent::Cancelled {
                        run_id,
                        completed: run.progress.completed,
                    }
                } else {
                    error!(error = %e, "Sync run failed");
                    SyncEvent::Failed {
                        run_id,
                        message: run.progress.message.clone(),
                        completed: run.progress.completed,
                        total: run.progress.total,
                    }
                }
            }
        };

        drop(active_guard);
        self.persist_id_cache().await;

        // The permit is free by the time subscribers see the terminal event.
        drop(permit);
        self.event_bus.emit(CoreEvent::Sync(terminal)).ok();
        run.report()
    }

    async fn drive(&self, run: &mut SyncRun, cancel: &CancellationToken) -> Result<()> {
        run.advance(SyncPhase::Analyzing, "Analyzing local and remote files")?;
        self.emit_progress(run);

        info!("Phase 1: Fetching remote catalog");
        let remote = RemoteFileCatalog::new(Arc::clone(&self.server))
            .fetch(cancel)
            .await?;
        info!(files = remote.len(), "Remote catalog ready");

        info!("Phase 2: Scanning local folder");
        let local = LocalFileCatalog::new(
            Arc::clone(&self.file_system),
            self.music_dir.clone(),
            &self.config.audio_extensions,
            ContentHasher::with_buffer_size(self.config.chunk_size),
        )
        .scan(cancel)
        .await?;

        run.advance(SyncPhase::Diffing, "Comparing catalogs")?;
        let plan = SyncPlan::compute(&local, &remote);
        run.set_total(plan.len() as u64);
        info!(
            uploads = plan.upload_count(),
            downloads = plan.download_count(),
            "Phase 3: Work queue computed"
        );
        self.emit_progress(run);

        if plan.is_empty() {
            run.advance(SyncPhase::Finalizing, "Nothing to synchronize")?;
        } else {
            run.advance(
                SyncPhase::Transferring,
                format!("Transferring {} files", plan.len()),
            )?;
            self.emit_progress(run);
            info!("Phase 4: Transferring");
            self.transfer_all(run, plan, cancel).await?;
            run.advance(SyncPhase::Finalizing, "Refreshing library")?;
        }
        self.emit_progress(run);

        info!("Phase 5: Finalizing");
        if let Some(refresher) = &self.library_refresher {
            if let Err(e) = refresher.refresh_library().await {
                warn!(error = %e, "Library refresh failed");
            }
        }

        run.complete()
    }

    async fn transfer_all(
        &self,
        run: &mut SyncRun,
        plan: SyncPlan,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let channel = self.transfer_channel();

        for item in plan.into_items() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            run.progress.message = match &item {
                WorkItem::Upload(file) => format!("Uploading {}", file.filename),
                WorkItem::Download { filename, .. } => format!("Downloading {}", filename),
            };
            self.emit_progress(run);

            let result = match &item {
                WorkItem::Upload(file) => {
                    channel
                        .upload(file, cancel)
                        .await
                        .map(|outcome| TransferEvent::Uploaded {
                            content_hash: outcome.content_hash.to_string(),
                            filename: outcome.filename,
                            size_bytes: outcome.size_bytes,
                        })
                }
                WorkItem::Download {
                    content_hash,
                    filename,
                } => channel
                    .download(content_hash, filename, cancel)
                    .await
                    .map(|outcome| TransferEvent::Downloaded {
                        content_hash: outcome.content_hash.to_string(),
                        filename: outcome.filename,
                        size_bytes: outcome.size_bytes,
                    }),
            };

            match result {
                Ok(event) => {
                    let verb = if matches!(item, WorkItem::Upload(_)) {
                        "Uploaded"
                    } else {
                        "Downloaded"
                    };
                    run.record_success(format!("{} {}", verb, item.filename()));
                    self.event_bus.emit(CoreEvent::Transfer(event)).ok();
                }
                Err(e) if e.aborts_run() => return Err(e),
                Err(e) => {
                    warn!(
                        file = %item.filename(),
                        content_hash = %item.content_hash().short(),
                        direction = item.direction(),
                        error = %e,
                        "Work item failed"
                    );
                    let failure = ItemFailure {
                        content_hash: item.content_hash().to_string(),
                        filename: item.filename().to_string(),
                        direction: item.direction().to_string(),
                        message: e.to_string(),
                    };
                    self.event_bus
                        .emit(CoreEvent::Sync(SyncEvent::ItemFailed {
                            run_id: run.id.to_string(),
                            content_hash: failure.content_hash.clone(),
                            filename: failure.filename.clone(),
                            direction: failure.direction.clone(),
                            message: failure.message.clone(),
                        }))
                        .ok();
                    run.record_failure(failure);
                }
            }
            self.emit_progress(run);
        }

        Ok(())
    }

    fn emit_progress(&self, run: &SyncRun) {
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Progress {
                run_id: run.id.to_string(),
                phase: run.phase.to_string(),
                current: run.progress.completed,
                total: run.progress.total,
                message: run.progress.message.clone(),
            }))
            .ok();
    }

    async fn persist_id_cache(&self) {
        if let Err(e) = self.id_cache.persist().await {
            warn!(error = %e, "Failed to persist identifier cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::{
        BridgeError, ByteStream, RemoteFileEntry, RemoteTrack, UploadMetadata, UploadReceipt,
    };
    use tempfile::TempDir;

    struct UnreachableServer;

    #[async_trait]
    impl FileServer for UnreachableServer {
        async fn list_status(&self) -> bridge_traits::Result<Vec<RemoteFileEntry>> {
            Err(BridgeError::ConnectionFailed("connection refused".into()))
        }

        async fn upload(
            &self,
            _metadata: UploadMetadata,
            _body: ByteStream,
            _size_hint: Option<u64>,
        ) -> bridge_traits::Result<UploadReceipt> {
            Err(BridgeError::ConnectionFailed("connection refused".into()))
        }

        async fn list_tracks(&self) -> bridge_traits::Result<Vec<RemoteTrack>> {
            Err(BridgeError::ConnectionFailed("connection refused".into()))
        }

        async fn download(&self, _identifier: &str) -> bridge_traits::Result<ByteStream> {
            Err(BridgeError::ConnectionFailed("connection refused".into()))
        }

        async fn delete(&self, _identifier: &str) -> bridge_traits::Result<bool> {
            Err(BridgeError::ConnectionFailed("connection refused".into()))
        }
    }

    fn coordinator(dir: &Path) -> SyncCoordinator {
        SyncCoordinator::new(
            SyncConfig::default(),
            Arc::new(UnreachableServer),
            Arc::new(TokioFileSystem::new()),
            dir,
            EventBus::new(64),
        )
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.chunk_size, 64 * 1024);
        assert_eq!(config.verification.max_attempts, 10);
        assert_eq!(config.stabilization.max_attempts, 20);
        assert_eq!(config.sync_timeout, Duration::from_secs(3600));
        assert!(config.audio_extensions.contains(&"flac".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_server_aborts_run() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path());
        let mut events = coordinator.event_bus().subscribe();

        let report = coordinator.run_sync().await.unwrap();

        assert_eq!(report.outcome, crate::SyncOutcome::Aborted);
        assert!(report.message.starts_with("Synchronization failed:"));
        assert!(!coordinator.is_sync_active());
        assert!(coordinator.active_run_id().is_none());

        let mut terminal = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CoreEvent::Sync(sync) = event {
                if sync.is_terminal() {
                    terminal.push(sync);
                }
            }
        }
        assert_eq!(terminal.len(), 1);
        assert!(matches!(terminal[0], SyncEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn test_delete_remote_rejected_while_running() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(dir.path());
        let _held = coordinator.try_acquire().unwrap();

        let err = coordinator
            .delete_remote(&ContentHasher::hash_bytes(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SyncInProgress));
        assert!(!coordinator.cancel_active());
    }
}
