//! Integration tests for the two-way sync run
//!
//! These tests drive `SyncCoordinator` against an in-memory file server and a
//! real temporary music folder:
//! - Upload/download queue from a mixed local and remote state
//! - Nothing to synchronize, with a single library refresh
//! - Catalog failures that abort before any transfer
//! - Corrupt downloads removed from disk
//! - Round trip between two devices
//! - Single-flight rejection and cancellation, including a dropped run
//! - Remote names outside the audio filter

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::{
    BridgeError, ByteStream, FileServer, FileSystemAccess, RemoteFileEntry, RemoteTrack,
    UploadMetadata, UploadReceipt,
};
use core_runtime::events::{CoreEvent, EventBus, Receiver, SyncEvent, TransferEvent};
use core_sync::{
    ContentHasher, LibraryRefresher, LocalFileCatalog, RetryPolicy, SyncConfig, SyncCoordinator,
    SyncError, SyncOutcome,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Clone)]
struct StoredFile {
    identifier: String,
    hash: String,
    filename: String,
    data: Vec<u8>,
}

/// In-memory content-addressed file server
struct FakeFileServer {
    files: Mutex<Vec<StoredFile>>,
    uploads: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
    next_id: AtomicU32,
    fail_listing: AtomicBool,
    corrupt_downloads: AtomicBool,
    reject_uploads_unauthorized: AtomicBool,
    upload_status_error: AtomicBool,
    gate_uploads: AtomicBool,
    upload_gate: Semaphore,
    upload_started: Notify,
}

impl Default for FakeFileServer {
    fn default() -> Self {
        Self {
            files: Mutex::default(),
            uploads: Mutex::default(),
            downloads: Mutex::default(),
            next_id: AtomicU32::new(0),
            fail_listing: AtomicBool::new(false),
            corrupt_downloads: AtomicBool::new(false),
            reject_uploads_unauthorized: AtomicBool::new(false),
            upload_status_error: AtomicBool::new(false),
            gate_uploads: AtomicBool::new(false),
            upload_gate: Semaphore::new(0),
            upload_started: Notify::new(),
        }
    }
}

impl FakeFileServer {
    async fn store(&self, filename: &str, data: &[u8]) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.files.lock().await.push(StoredFile {
            identifier: format!("track-{}", id),
            hash: hash(data),
            filename: filename.to_string(),
            data: data.to_vec(),
        });
    }

    async fn hashes(&self) -> Vec<String> {
        let mut hashes: Vec<_> = self.files.lock().await.iter().map(|f| f.hash.clone()).collect();
        hashes.sort();
        hashes
    }
}

#[async_trait]
impl FileServer for FakeFileServer {
    async fn list_status(&self) -> bridge_traits::Result<Vec<RemoteFileEntry>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(BridgeError::ConnectionFailed("connection refused".into()));
        }
        Ok(self
            .files
            .lock()
            .await
            .iter()
            .map(|f| RemoteFileEntry {
                content_hash: f.hash.clone(),
                filename: f.filename.clone(),
                uploaded_at: Some("2024-01-01T00:00:00Z".to_string()),
            })
            .collect())
    }

    async fn upload(
        &self,
        metadata: UploadMetadata,
        mut body: ByteStream,
        _size_hint: Option<u64>,
    ) -> bridge_traits::Result<UploadReceipt> {
        self.uploads.lock().await.push(metadata.filename.clone());

        if self.gate_uploads.load(Ordering::SeqCst) {
            self.upload_started.notify_one();
            let _permit = self
                .upload_gate
                .acquire()
                .await
                .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
        }
        if self.reject_uploads_unauthorized.load(Ordering::SeqCst) {
            return Err(BridgeError::Unauthorized("token expired".into()));
        }
        if self.upload_status_error.load(Ordering::SeqCst) {
            return Err(BridgeError::HttpStatus {
                status: 500,
                message: "disk full".into(),
            });
        }

        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        let size = data.len() as u64;
        self.store(&metadata.filename, &data).await;
        let stored = self.files.lock().await.last().cloned();
        let stored = stored.ok_or_else(|| BridgeError::OperationFailed("store failed".into()))?;

        Ok(UploadReceipt {
            content_hash: stored.hash,
            filename: stored.filename,
            file_size_bytes: Some(size),
            identifier: Some(stored.identifier),
        })
    }

    async fn list_tracks(&self) -> bridge_traits::Result<Vec<RemoteTrack>> {
        Ok(self
            .files
            .lock()
            .await
            .iter()
            .map(|f| RemoteTrack {
                identifier: f.identifier.clone(),
                content_hash: f.hash.clone(),
                filename: f.filename.clone(),
            })
            .collect())
    }

    async fn download(&self, identifier: &str) -> bridge_traits::Result<ByteStream> {
        let files = self.files.lock().await;
        let file = files
            .iter()
            .find(|f| f.identifier == identifier)
            .ok_or_else(|| BridgeError::NotFound(identifier.to_string()))?;
        self.downloads.lock().await.push(file.filename.clone());

        let mut data = file.data.clone();
        if self.corrupt_downloads.load(Ordering::SeqCst) {
            for byte in data.iter_mut() {
                *byte ^= 0x5a;
            }
        }
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn delete(&self, identifier: &str) -> bridge_traits::Result<bool> {
        let mut files = self.files.lock().await;
        let before = files.len();
        files.retain(|f| f.identifier != identifier);
        Ok(files.len() != before)
    }
}

#[derive(Default)]
struct CountingRefresher {
    calls: AtomicU32,
}

#[async_trait]
impl LibraryRefresher for CountingRefresher {
    async fn refresh_library(&self) -> core_sync::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn hash(data: &[u8]) -> String {
    ContentHasher::hash_bytes(data).to_string()
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        verification: RetryPolicy::fixed(3, Duration::from_millis(1)),
        stabilization: RetryPolicy::fixed(5, Duration::from_millis(1)),
        ..SyncConfig::default()
    }
}

fn coordinator(
    server: Arc<FakeFileServer>,
    dir: &Path,
    refresher: Arc<CountingRefresher>,
) -> SyncCoordinator {
    SyncCoordinator::new(
        fast_config(),
        server,
        Arc::new(TokioFileSystem::new()),
        dir,
        EventBus::new(256),
    )
    .with_library_refresher(refresher)
}

async fn local_hashes(dir: &Path) -> Vec<String> {
    let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
    let inventory = LocalFileCatalog::new(
        fs,
        dir,
        &SyncConfig::default().audio_extensions,
        ContentHasher::new(),
    )
    .scan(&CancellationToken::new())
    .await
    .unwrap();
    let mut hashes: Vec<_> = inventory.iter().map(|f| f.content_hash.to_string()).collect();
    hashes.sort();
    hashes
}

fn drain(events: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn terminal_events(events: &[CoreEvent]) -> Vec<SyncEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            CoreEvent::Sync(sync) if sync.is_terminal() => Some(sync.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_two_way_sync_converges() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("A.mp3"), b"h1 content").unwrap();
    std::fs::write(dir.path().join("B.mp3"), b"h2 content").unwrap();

    let server = Arc::new(FakeFileServer::default());
    server.store("B.mp3", b"h2 content").await;
    server.store("C.mp3", b"h3 content").await;

    let refresher = Arc::new(CountingRefresher::default());
    let coordinator = coordinator(server.clone(), dir.path(), refresher.clone());
    let mut events = coordinator.event_bus().subscribe();

    let report = coordinator.run_sync().await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(report.total, 2);
    assert_eq!(report.completed, 2);
    assert_eq!(report.errors, 0);
    assert_eq!(report.message, "Synchronization completed");
    assert_eq!(*server.uploads.lock().await, vec!["A.mp3".to_string()]);
    assert_eq!(*server.downloads.lock().await, vec!["C.mp3".to_string()]);
    assert_eq!(
        std::fs::read(dir.path().join("C.mp3")).unwrap(),
        b"h3 content"
    );

    let mut expected = vec![hash(b"h1 content"), hash(b"h2 content"), hash(b"h3 content")];
    expected.sort();
    assert_eq!(local_hashes(dir.path()).await, expected);
    assert_eq!(server.hashes().await, expected);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

    let events = drain(&mut events);
    let transfers: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            CoreEvent::Transfer(transfer) => Some(transfer.clone()),
            _ => None,
        })
        .collect();
    assert!(matches!(
        &transfers[..],
        [TransferEvent::Uploaded { .. }, TransferEvent::Downloaded { .. }]
    ));

    let progress = events
        .iter()
        .filter(|event| matches!(event, CoreEvent::Sync(SyncEvent::Progress { .. })))
        .count();
    assert!(progress >= 2 * 2, "expected progress per item, got {}", progress);
    assert!(matches!(
        &terminal_events(&events)[..],
        [SyncEvent::Completed { errors: 0, .. }]
    ));
}

#[tokio::test]
async fn test_identical_stores_have_nothing_to_sync() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("renamed.flac"), b"same bytes").unwrap();

    let server = Arc::new(FakeFileServer::default());
    server.store("original.flac", b"same bytes").await;

    let refresher = Arc::new(CountingRefresher::default());
    let coordinator = coordinator(server.clone(), dir.path(), refresher.clone());
    let report = coordinator.run_sync().await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::NothingToSync);
    assert_eq!(report.message, "Nothing to synchronize");
    assert_eq!(report.total, 0);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    assert!(server.uploads.lock().await.is_empty());
    assert!(server.downloads.lock().await.is_empty());
}

#[tokio::test]
async fn test_listing_failure_aborts_without_transfers() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("A.mp3"), b"local only").unwrap();

    let server = Arc::new(FakeFileServer::default());
    server.fail_listing.store(true, Ordering::SeqCst);

    let refresher = Arc::new(CountingRefresher::default());
    let coordinator = coordinator(server.clone(), dir.path(), refresher.clone());
    let mut events = coordinator.event_bus().subscribe();

    let report = coordinator.run_sync().await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Aborted);
    assert!(report.message.starts_with("Synchronization failed: Network error"));
    assert!(server.uploads.lock().await.is_empty());
    assert!(server.downloads.lock().await.is_empty());
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);

    let terminal = terminal_events(&drain(&mut events));
    assert_eq!(terminal.len(), 1);
    assert!(matches!(terminal[0], SyncEvent::Failed { .. }));
}

#[tokio::test]
async fn test_corrupt_download_is_removed_and_run_continues() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("A.mp3"), b"h1 content").unwrap();

    let server = Arc::new(FakeFileServer::default());
    server.store("C.mp3", b"h3 content").await;
    server.corrupt_downloads.store(true, Ordering::SeqCst);

    let refresher = Arc::new(CountingRefresher::default());
    let coordinator = coordinator(server.clone(), dir.path(), refresher.clone());
    let report = coordinator.run_sync().await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::CompletedWithErrors);
    assert_eq!(report.completed, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.failures[0].direction, "download");
    assert_eq!(report.failures[0].filename, "C.mp3");
    assert_eq!(report.message, "Synchronization completed with 1 errors");
    assert!(!dir.path().join("C.mp3").exists());
    assert!(!local_hashes(dir.path()).await.contains(&hash(b"h3 content")));
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_server_error_on_upload_fails_only_that_item() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("A.mp3"), b"h1 content").unwrap();

    let server = Arc::new(FakeFileServer::default());
    server.store("C.mp3", b"h3 content").await;
    server.upload_status_error.store(true, Ordering::SeqCst);

    let coordinator = coordinator(
        server.clone(),
        dir.path(),
        Arc::new(CountingRefresher::default()),
    );
    let report = coordinator.run_sync().await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::CompletedWithErrors);
    assert_eq!(report.errors, 1);
    assert_eq!(report.failures[0].direction, "upload");
    assert!(dir.path().join("C.mp3").exists());
}

#[tokio::test]
async fn test_rejected_credential_aborts_mid_queue() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("A.mp3"), b"h1 content").unwrap();
    std::fs::write(dir.path().join("B.mp3"), b"h2 content").unwrap();

    let server = Arc::new(FakeFileServer::default());
    server.reject_uploads_unauthorized.store(true, Ordering::SeqCst);

    let refresher = Arc::new(CountingRefresher::default());
    let coordinator = coordinator(server.clone(), dir.path(), refresher.clone());
    let report = coordinator.run_sync().await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Aborted);
    assert_eq!(server.uploads.lock().await.len(), 1);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_round_trip_between_devices() {
    let phone = TempDir::new().unwrap();
    let tablet = TempDir::new().unwrap();
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(phone.path().join("song.flac"), &content).unwrap();

    let server = Arc::new(FakeFileServer::default());
    let refresher = Arc::new(CountingRefresher::default());

    let report = coordinator(server.clone(), phone.path(), refresher.clone())
        .run_sync()
        .await
        .unwrap();
    assert_eq!(report.outcome, SyncOutcome::Completed);

    let report = coordinator(server.clone(), tablet.path(), refresher.clone())
        .run_sync()
        .await
        .unwrap();
    assert_eq!(report.outcome, SyncOutcome::Completed);

    let downloaded = std::fs::read(tablet.path().join("song.flac")).unwrap();
    assert_eq!(downloaded, content);
    assert_eq!(
        ContentHasher::hash_bytes(&downloaded),
        ContentHasher::hash_bytes(&content)
    );
}

#[tokio::test]
async fn test_second_run_is_rejected_while_active() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("A.mp3"), b"h1 content").unwrap();

    let server = Arc::new(FakeFileServer::default());
    server.gate_uploads.store(true, Ordering::SeqCst);

    let coordinator = Arc::new(coordinator(
        server.clone(),
        dir.path(),
        Arc::new(CountingRefresher::default()),
    ));

    let handle = coordinator.start_sync().unwrap();
    server.upload_started.notified().await;

    assert!(coordinator.is_sync_active());
    assert_eq!(coordinator.active_run_id(), Some(handle.run_id));
    assert!(matches!(
        coordinator.run_sync().await,
        Err(SyncError::SyncInProgress)
    ));
    assert!(matches!(
        coordinator.start_sync(),
        Err(SyncError::SyncInProgress)
    ));

    server.upload_gate.add_permits(1);
    let report = handle.wait().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert!(!coordinator.is_sync_active());
}

#[tokio::test]
async fn test_cancel_active_run() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("A.mp3"), b"h1 content").unwrap();

    let server = Arc::new(FakeFileServer::default());
    server.gate_uploads.store(true, Ordering::SeqCst);

    let refresher = Arc::new(CountingRefresher::default());
    let coordinator = Arc::new(coordinator(server.clone(), dir.path(), refresher.clone()));
    let mut events = coordinator.event_bus().subscribe();

    let handle = coordinator.start_sync().unwrap();
    server.upload_started.notified().await;
    assert!(coordinator.cancel_active());

    let report = handle.wait().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Aborted);
    assert_eq!(report.message, "Synchronization failed: Sync cancelled");
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    assert!(!coordinator.cancel_active());

    let terminal = terminal_events(&drain(&mut events));
    assert!(matches!(&terminal[..], [SyncEvent::Cancelled { .. }]));
}

#[tokio::test]
async fn test_delete_remote_by_hash() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(FakeFileServer::default());
    server.store("C.mp3", b"h3 content").await;

    let coordinator = coordinator(
        server.clone(),
        dir.path(),
        Arc::new(CountingRefresher::default()),
    );
    let target = ContentHasher::hash_bytes(b"h3 content");

    assert!(coordinator.delete_remote(&target).await.unwrap());
    assert!(server.hashes().await.is_empty());
}

#[tokio::test]
async fn test_dropped_run_releases_active_slot() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("A.mp3"), b"h1 content").unwrap();

    let server = Arc::new(FakeFileServer::default());
    server.gate_uploads.store(true, Ordering::SeqCst);

    let coordinator = coordinator(
        server.clone(),
        dir.path(),
        Arc::new(CountingRefresher::default()),
    );

    tokio::select! {
        _ = coordinator.run_sync() => panic!("run finished while its upload was gated"),
        _ = server.upload_started.notified() => {}
    }

    assert!(!coordinator.is_sync_active());
    assert_eq!(coordinator.active_run_id(), None);
    assert!(!coordinator.cancel_active());

    server.gate_uploads.store(false, Ordering::SeqCst);
    let report = coordinator.run_sync().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(server.hashes().await, vec![hash(b"h1 content")]);
}

#[tokio::test]
async fn test_unsupported_remote_name_is_not_downloaded_again() {
    let dir = TempDir::new().unwrap();

    let server = Arc::new(FakeFileServer::default());
    server.store("cover.opus", b"opus artwork").await;
    server.store("C.mp3", b"h3 content").await;

    let coordinator = coordinator(
        server.clone(),
        dir.path(),
        Arc::new(CountingRefresher::default()),
    );

    let first = coordinator.run_sync().await.unwrap();
    assert_eq!(first.outcome, SyncOutcome::CompletedWithErrors);
    assert_eq!(first.errors, 1);
    assert_eq!(first.failures[0].filename, "cover.opus");
    assert!(first.failures[0].message.contains("Not a supported audio file name"));
    assert!(!dir.path().join("cover.opus").exists());
    assert!(dir.path().join("C.mp3").exists());
    assert_eq!(*server.downloads.lock().await, vec!["C.mp3".to_string()]);

    let second = coordinator.run_sync().await.unwrap();
    assert_eq!(second.errors, 1);
    assert_eq!(second.completed, 1);
    assert_eq!(*server.downloads.lock().await, vec!["C.mp3".to_string()]);
    assert_eq!(local_hashes(dir.path()).await, vec![hash(b"h3 content")]);
}
