//! Core service façade and bootstrap helpers.
//!
//! This crate wires a validated [`CoreConfig`] into a ready-to-run sync
//! engine: the REST file server connector, the identifier cache and the
//! [`SyncCoordinator`]. Desktop hosts enable the `desktop-shims` feature so the
//! config builder can fall back to the `bridge-desktop` HTTP client and file
//! system; other hosts inject their own bridges.

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::config::{CoreConfig, CoreConfigBuilder, NetworkTimeouts};
pub use core_runtime::events::{CoreEvent, EventStream, SyncEvent, TransferEvent};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
pub use core_sync::{
    ContentHash, LibraryRefresher, SyncConfig, SyncHandle, SyncOutcome, SyncReport, SyncRunId,
};

use std::path::Path;
use std::sync::Arc;

use bridge_traits::FileServer;
use core_runtime::events::EventBus;
use core_runtime::logging::strip_path;
use core_sync::{InMemoryRemoteIdCache, JsonFileIdCache, RemoteIdCache, SyncCoordinator};
use provider_file_server::FileServerConnector;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct SyncService {
    coordinator: Arc<SyncCoordinator>,
    event_bus: EventBus,
}

impl SyncService {
    /// Build a service talking to the configured server over HTTP.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        let connector = FileServerConnector::new(
            config.http_client.clone(),
            config.server_address.clone(),
            config.access_token.clone(),
        )
        .with_request_timeout(config.timeouts.request)
        .with_transfer_timeout(config.timeouts.transfer)
        .with_chunk_size(config.upload_chunk_size);

        Self::with_components(config, Arc::new(connector), None).await
    }

    /// Build a service around an explicit server and optional library hook.
    pub async fn with_components(
        config: CoreConfig,
        server: Arc<dyn FileServer>,
        library_refresher: Option<Arc<dyn LibraryRefresher>>,
    ) -> Result<Self> {
        config.validate()?;

        let id_cache: Arc<dyn RemoteIdCache> = match &config.id_cache_path {
            Some(path) => {
                Arc::new(JsonFileIdCache::load(config.file_system.clone(), path.clone()).await)
            }
            None => Arc::new(InMemoryRemoteIdCache::new()),
        };

        let sync_config = SyncConfig {
            chunk_size: config.upload_chunk_size,
            ..SyncConfig::default()
        };

        let event_bus = EventBus::new(config.event_buffer_size);
        let mut coordinator = SyncCoordinator::new(
            sync_config,
            server,
            config.file_system.clone(),
            config.music_dir.clone(),
            event_bus.clone(),
        )
        .with_id_cache(id_cache);
        if let Some(refresher) = library_refresher {
            coordinator = coordinator.with_library_refresher(refresher);
        }

        info!(
            server = %config.server_address,
            music_dir = %strip_path(&config.music_dir.to_string_lossy()),
            "Sync service ready"
        );

        Ok(Self {
            coordinator: Arc::new(coordinator),
            event_bus,
        })
    }

    pub fn music_dir(&self) -> &Path {
        self.coordinator.music_dir()
    }

    /// Subscribe to progress, transfer and completion events.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Start a run in the background.
    ///
    /// Fails immediately with a sync-in-progress error while another run is
    /// active.
    pub fn start_sync(&self) -> Result<SyncHandle> {
        Ok(self.coordinator.start_sync()?)
    }

    /// Run to completion on the calling task.
    pub async fn run_sync(&self) -> Result<SyncReport> {
        Ok(self.coordinator.run_sync().await?)
    }

    /// Request cancellation of the active run. Returns `false` when idle.
    pub fn cancel(&self) -> bool {
        self.coordinator.cancel_active()
    }

    pub fn is_sync_active(&self) -> bool {
        self.coordinator.is_sync_active()
    }

    pub fn active_run_id(&self) -> Option<SyncRunId> {
        self.coordinator.active_run_id()
    }

    /// Delete a stored file by its hex content hash.
    pub async fn delete_remote(&self, content_hash: &str) -> Result<bool> {
        let content_hash = ContentHash::parse(content_hash)?;
        Ok(self.coordinator.delete_remote(&content_hash).await?)
    }
}

/// Validate `config` and build a [`SyncService`] over HTTP.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_service::{bootstrap, CoreConfig};
///
/// let config = CoreConfig::builder()
///     .server_address("https://music.example.net")
///     .access_token("secret")
///     .music_dir("/home/me/Music")
///     .build()?;
/// let service = bootstrap(config).await?;
/// let report = service.run_sync().await?;
/// println!("{}", report.message);
/// # Ok(())
/// # }
/// ```
pub async fn bootstrap(config: CoreConfig) -> Result<SyncService> {
    SyncService::new(config).await
}
