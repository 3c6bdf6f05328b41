use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Sync already in progress")]
    SyncInProgress,

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Integrity check failed for {filename}: expected {expected}, got {actual}")]
    Integrity {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("Server reported duplicate content for {content_hash}: {message}")]
    ServerConflict {
        content_hash: String,
        message: String,
    },

    #[error("Not a supported audio file name: {filename}")]
    UnsupportedFile { filename: String },

    #[error("Local I/O error on {path}: {message}")]
    LocalIo { path: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upload of {content_hash} not visible after {attempts} verification attempts")]
    VerificationFailed { content_hash: String, attempts: u32 },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync timeout after {0} seconds")]
    Timeout(u64),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },
}

impl SyncError {
    /// Whether this error ends the whole run instead of a single work item.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration(_)
                | SyncError::Auth(_)
                | SyncError::Network(_)
                | SyncError::Cancelled
                | SyncError::Timeout(_)
        )
    }

    /// Wraps a local filesystem failure with the path it happened on.
    pub fn local_io(path: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        SyncError::LocalIo {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    /// Fills in the content hash of a server conflict; other errors pass through.
    pub fn with_content_hash(self, content_hash: impl std::fmt::Display) -> Self {
        match self {
            SyncError::ServerConflict { message, .. } => SyncError::ServerConflict {
                content_hash: content_hash.to_string(),
                message,
            },
            other => other,
        }
    }

    /// Classifies an I/O error raised while reading a remote byte stream.
    ///
    /// Transport failures surface through the stream as I/O errors; the
    /// kinds below are the ones the HTTP bridge uses for them.
    pub fn from_remote_stream(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => SyncError::Network(err.to_string()),
            _ => SyncError::Remote {
                status: 0,
                message: err.to_string(),
            },
        }
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Unauthorized(msg) => SyncError::Auth(msg),
            BridgeError::Timeout(msg) | BridgeError::ConnectionFailed(msg) => {
                SyncError::Network(msg)
            }
            BridgeError::NotFound(msg) => SyncError::NotFound(msg),
            BridgeError::Conflict(message) => SyncError::ServerConflict {
                content_hash: String::from("<unknown>"),
                message,
            },
            BridgeError::HttpStatus { status, message } => SyncError::Remote { status, message },
            BridgeError::Io(e) => SyncError::LocalIo {
                path: String::from("<unknown>"),
                message: e.to_string(),
            },
            BridgeError::NotAvailable(msg) => SyncError::Configuration(msg),
            BridgeError::OperationFailed(msg) => SyncError::Remote {
                status: 0,
                message: msg,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
