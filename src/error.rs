//! Error types for the trading agent

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trading agent
#[derive(Error, Debug)]
pub enum Error {
    // Event ingestion errors
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    // Persistence errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Duplicate order idempotency key in snapshot: {0}")]
    DuplicateOrder(String),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error means a write was not durably saved
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Error::Store(_) | Error::Io(_) | Error::Serialization(_) | Error::DuplicateOrder(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
