use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),
}

impl CoreError {
    /// Whether the request was refused because a run is already active.
    pub fn is_sync_in_progress(&self) -> bool {
        matches!(self, CoreError::Sync(core_sync::SyncError::SyncInProgress))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
