//! # Host Bridge Traits
//!
//! Capability traits the sync engine requires from its host.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync core and platform-specific
//! implementations. Each trait represents a capability that the core requires but
//! that is implemented differently per host (desktop, Android).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP with timeouts, streamed download and multipart upload
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Music folder enumeration and streaming file I/O
//! - [`FileServer`](file_server::FileServer) - The content-addressable remote store
//!
//! ### Utilities
//! - [`LoggerSink`](log_sink::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//! | Server protocol (REST) | `provider-file-server` |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Transport
//! failures (`Timeout`, `ConnectionFailed`) must be kept distinct from HTTP
//! status failures: the sync engine aborts a run on the former and records a
//! per-file error for most of the latter.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so one implementation can be
//! shared across the sync task and the caller.

pub mod error;
pub mod file_server;
pub mod http;
pub mod log_sink;
pub mod storage;

pub use error::{BridgeError, Result};

// Re-export commonly used types
pub use file_server::{FileServer, RemoteFileEntry, RemoteTrack, UploadMetadata, UploadReceipt};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartUpload};
pub use storage::{ByteSink, ByteStream, FileMetadata, FileSystemAccess};
pub use log_sink::{LogEntry, LogLevel, LoggerSink};
