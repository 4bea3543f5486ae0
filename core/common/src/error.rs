//! Common error types for driveconnect.

use thiserror::Error;

/// Top-level error type for Drive client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Client configuration could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The HTTP transport failed before a status was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with an unexpected status.
    #[error("{step} failed with status {status}: {body}")]
    Protocol {
        /// Which exchange of the flow failed.
        step: &'static str,
        /// HTTP status code returned.
        status: i32,
        /// Raw response body, kept for diagnosis.
        body: String,
    },

    /// No access credential is held.
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Status code carried by a protocol error, if any.
    pub fn status(&self) -> Option<i32> {
        match self {
            Error::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
