//! # Two-Way Sync Engine
//!
//! Keeps a local music folder and a content-addressed file server in step.
//!
//! ## Overview
//!
//! Files are matched purely by the SHA-256 of their content, so renamed or
//! moved files are neither duplicated nor transferred again. Each run
//! compares the two hash sets, uploads what only exists locally, downloads
//! what only exists remotely and verifies every transfer.
//!
//! ## Components
//!
//! - **Content Hasher** (`hasher`): Streaming SHA-256 digests
//! - **Local Catalog** (`local_catalog`): Recursive walk and hash of the music folder
//! - **Remote Catalog** (`remote_catalog`): Fresh server listing on every query
//! - **Work Queue Diff** (`diff`): Upload and download queue from two inventories
//! - **Transfer Channel** (`transfer`): Verified chunked upload and streamed download
//! - **Retry Policy** (`retry`): Bounded polling for verification and stabilization
//! - **Identifier Cache** (`id_cache`): Hash to server identifier lookup
//! - **Sync Run State Machine** (`job`): Run lifecycle with validated transitions
//! - **Sync Coordinator** (`coordinator`): Single-flight orchestration of a run

pub mod coordinator;
pub mod diff;
pub mod error;
pub mod hasher;
pub mod id_cache;
pub mod job;
pub mod local_catalog;
pub mod remote_catalog;
pub mod retry;
pub mod transfer;

pub use coordinator::{LibraryRefresher, SyncConfig, SyncCoordinator, SyncHandle};
pub use diff::{SyncPlan, WorkItem};
pub use error::{Result, SyncError};
pub use hasher::{ContentHash, ContentHasher};
pub use id_cache::{InMemoryRemoteIdCache, JsonFileIdCache, RemoteIdCache};
pub use job::{
    ItemFailure, SyncOutcome, SyncPhase, SyncProgress, SyncReport, SyncRun, SyncRunId,
};
pub use local_catalog::{LocalFile, LocalFileCatalog, LocalInventory};
pub use remote_catalog::{RemoteFile, RemoteFileCatalog, RemoteInventory};
pub use retry::{Backoff, RetryOutcome, RetryPolicy};
pub use transfer::{DownloadOutcome, TransferChannel, TransferSettings, UploadOutcome};
