//! Error types for audiod-vc
//!
//! Defines service-specific error types using thiserror for clear error
//! propagation.

use thiserror::Error;

/// Main error type for the volume coordination service
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid request argument, rejected at the boundary
    #[error("Bad request: {0}")]
    InvalidInput(String),

    /// Caller lacks the required permission
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Native engine apply/init failure (recoverable, retried)
    #[error("Native engine error: {0}")]
    Native(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<audiod_common::Error> for Error {
    fn from(err: audiod_common::Error) -> Self {
        match err {
            audiod_common::Error::Config(msg) => Error::Config(msg),
            audiod_common::Error::Io(e) => Error::Io(e),
            audiod_common::Error::InvalidInput(msg) => Error::InvalidInput(msg),
            audiod_common::Error::PermissionDenied(msg) => Error::PermissionDenied(msg),
            audiod_common::Error::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Convenience Result type using the service Error
pub type Result<T> = std::result::Result<T, Error>;
