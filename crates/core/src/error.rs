//! Error types for s3tk
//!
//! Only fatal conditions travel as [`Error`]. Per-item transfer failures are
//! recorded as values in the operation reports instead.

use thiserror::Error;

/// Result type alias for s3tk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for s3tk
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or conflicting configuration, raised before any network call
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed S3 URI or key
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Bucket or object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials rejected or access denied
    #[error("Access denied: {0}")]
    Auth(String),

    /// Transport-level failure (dispatch, timeout, connection reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Error reported by the storage service with its own error code
    #[error("Service error ({code}): {message}")]
    Service { code: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// Error code as reported by the store, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Service { code, .. } => Some(code),
            Error::NotFound(_) => Some("NoSuchKey"),
            Error::Auth(_) => Some("AccessDenied"),
            _ => None,
        }
    }
}
