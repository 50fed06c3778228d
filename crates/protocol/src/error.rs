//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Serialization error from serde_json
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Request line could not be parsed
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Method name not part of the host API
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Host passed arguments of the wrong count or type
    #[error("{0}")]
    InvalidArguments(String),

    /// Line length exceeds maximum allowed size
    #[error("Line too large: {size} bytes (max: {max})")]
    LineTooLarge { size: usize, max: usize },

    /// Line bytes are not valid UTF-8
    #[error("Line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// I/O error during line operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
