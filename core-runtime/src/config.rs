//! # Core Configuration Module
//!
//! Connection settings and injected capabilities for the sync engine.
//!
//! ## Overview
//!
//! [`CoreConfig`] is assembled with a builder and validated eagerly, so a
//! missing server address, credential or music folder surfaces as
//! [`Error::Config`] before any network call is made.
//!
//! ## Required Settings
//!
//! - Server address (`http://` or `https://`)
//! - Bearer credential from the host's login step
//! - Music folder to synchronize
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - HTTP operations (desktop default: reqwest)
//! - `FileSystemAccess` - File I/O (desktop default: tokio fs)
//!
//! When the `desktop-shims` feature is enabled the desktop adapters are
//! injected automatically if not provided; otherwise a missing bridge is
//! reported as [`Error::CapabilityMissing`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .server_address("https://music.example.net/")
//!     .access_token(token)
//!     .music_dir("/storage/emulated/0/Music/Synced")
//!     .build()?;
//! assert_eq!(config.server_address, "https://music.example.net");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{FileSystemAccess, HttpClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default upload chunk size (64 KiB).
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Network deadlines. Expiry of any of them is reported as a network error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTimeouts {
    /// TCP/TLS establishment
    pub connect: Duration,
    /// Maximum idle time between two reads of a response
    pub read: Duration,
    /// Whole-request deadline for catalog listings and other small calls
    pub request: Duration,
    /// Whole-request deadline for uploads and downloads
    pub transfer: Duration,
}

impl Default for NetworkTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            read: Duration::from_secs(60),
            request: Duration::from_secs(30),
            transfer: Duration::from_secs(600),
        }
    }
}

/// Validated engine configuration. Build with [`CoreConfig::builder`].
#[derive(Clone)]
pub struct CoreConfig {
    /// Base server address without a trailing slash
    pub server_address: String,

    /// Bearer credential; never logged
    pub access_token: String,

    /// Folder whose audio files are synchronized
    pub music_dir: PathBuf,

    pub http_client: Arc<dyn HttpClient>,

    pub file_system: Arc<dyn FileSystemAccess>,

    pub timeouts: NetworkTimeouts,

    /// Bytes per chunk when streaming upload bodies
    pub upload_chunk_size: usize,

    /// JSON file persisting the hash → server identifier cache
    pub id_cache_path: Option<PathBuf>,

    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("server_address", &self.server_address)
            .field(
                "access_token",
                &crate::logging::redact_if_sensitive("access_token", &self.access_token),
            )
            .field("music_dir", &self.music_dir)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("timeouts", &self.timeouts)
            .field("upload_chunk_size", &self.upload_chunk_size)
            .field("id_cache_path", &self.id_cache_path)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Server address is an absolute http(s) URL with a host
    /// - Credential is not blank
    /// - Music folder path is not empty
    /// - Chunk size and timeouts are non-zero
    pub fn validate(&self) -> Result<()> {
        validate_server_address(&self.server_address)?;

        if self.access_token.trim().is_empty() {
            return Err(Error::Config("Access token cannot be empty".to_string()));
        }

        if self.music_dir.as_os_str().is_empty() {
            return Err(Error::Config("Music directory cannot be empty".to_string()));
        }

        if self.upload_chunk_size == 0 {
            return Err(Error::Config(
                "Upload chunk size must be greater than 0 bytes".to_string(),
            ));
        }

        let t = &self.timeouts;
        if [t.connect, t.read, t.request, t.transfer]
            .iter()
            .any(Duration::is_zero)
        {
            return Err(Error::Config(
                "Network timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_server_address(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(Error::Config("Server address cannot be empty".to_string()));
    }

    let rest = address
        .strip_prefix("https://")
        .or_else(|| address.strip_prefix("http://"))
        .ok_or_else(|| {
            Error::Config(format!(
                "Server address must start with http:// or https://, got '{}'",
                address
            ))
        })?;

    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(Error::Config(format!(
            "Server address has no valid host: '{}'",
            address
        )));
    }

    Ok(())
}

fn normalize_server_address(address: String) -> String {
    address.trim().trim_end_matches('/').to_string()
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeouts: &NetworkTimeouts) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::{HttpTimeouts, ReqwestHttpClient};

    let client = ReqwestHttpClient::with_timeouts(HttpTimeouts {
        connect: timeouts.connect,
        read: timeouts.read,
        overall: timeouts.transfer,
    })
    .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;

    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeouts: &NetworkTimeouts) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Mobile: inject the platform HTTP adapter."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "No file system implementation provided. \
                 Desktop: enable the 'desktop-shims' feature to use TokioFileSystem. \
                 Mobile: inject the platform storage adapter."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    server_address: Option<String>,
    access_token: Option<String>,
    music_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    timeouts: Option<NetworkTimeouts>,
    upload_chunk_size: Option<usize>,
    id_cache_path: Option<PathBuf>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the server base address. A trailing slash is ignored.
    pub fn server_address(mut self, address: impl Into<String>) -> Self {
        self.server_address = Some(address.into());
        self
    }

    /// Sets the bearer credential supplied by the host's login step.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Sets the folder to synchronize.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().music_dir("/home/me/Music");
    /// ```
    pub fn music_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.music_dir = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based desktop client is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system access implementation.
    ///
    /// If not provided, the tokio-based desktop implementation is used when
    /// the `desktop-shims` feature is enabled.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn timeouts(mut self, timeouts: NetworkTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Default: 64 KiB
    pub fn upload_chunk_size(mut self, bytes: usize) -> Self {
        self.upload_chunk_size = Some(bytes);
        self
    }

    /// Persist the identifier cache to this JSON file instead of memory only.
    pub fn id_cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.id_cache_path = Some(path.into());
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when address, credential or folder is missing or invalid
    /// - [`Error::CapabilityMissing`] when a bridge is absent and no default exists
    pub fn build(self) -> Result<CoreConfig> {
        let server_address = self
            .server_address
            .map(normalize_server_address)
            .ok_or_else(|| {
                Error::Config(
                    "Server address is required. Use .server_address() to set it.".to_string(),
                )
            })?;

        let access_token = self.access_token.ok_or_else(|| {
            Error::Config("Access token is required. Use .access_token() to set it.".to_string())
        })?;

        let music_dir = self.music_dir.ok_or_else(|| {
            Error::Config("Music directory is required. Use .music_dir() to set it.".to_string())
        })?;

        let timeouts = self.timeouts.unwrap_or_default();

        // Reject bad values before any default bridge is constructed.
        validate_server_address(&server_address)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&timeouts)?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let config = CoreConfig {
            server_address,
            access_token,
            music_dir,
            http_client,
            file_system,
            timeouts,
            upload_chunk_size: self.upload_chunk_size.unwrap_or(DEFAULT_UPLOAD_CHUNK_SIZE),
            id_cache_path: self.id_cache_path,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
