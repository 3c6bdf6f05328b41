//! Error types for the file server provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// File server provider errors
#[derive(Error, Debug)]
pub enum FileServerError {
    /// Credential rejected (401/403)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Unexpected non-success status
    #[error("File server API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The server already stores this content
    #[error("Duplicate content: {0}")]
    DuplicateContent(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for file server operations
pub type Result<T> = std::result::Result<T, FileServerError>;

impl From<FileServerError> for BridgeError {
    fn from(error: FileServerError) -> Self {
        match error {
            FileServerError::AuthenticationFailed(msg) => BridgeError::Unauthorized(msg),
            FileServerError::ApiError {
                status_code,
                message,
            } => BridgeError::HttpStatus {
                status: status_code,
                message,
            },
            FileServerError::NotFound { resource } => BridgeError::NotFound(resource),
            FileServerError::DuplicateContent(msg) => BridgeError::Conflict(msg),
            FileServerError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            FileServerError::BridgeError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = FileServerError::ApiError {
            status_code: 500,
            message: "database locked".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "File server API error (status 500): database locked"
        );
    }

    #[test]
    fn test_error_conversion() {
        let auth: BridgeError = FileServerError::AuthenticationFailed("expired".into()).into();
        assert!(matches!(auth, BridgeError::Unauthorized(_)));

        let dup: BridgeError = FileServerError::DuplicateContent("same hash".into()).into();
        assert!(matches!(dup, BridgeError::Conflict(_)));

        let transport: BridgeError =
            FileServerError::from(BridgeError::Timeout("read".into())).into();
        assert!(transport.is_transport());
    }
}
