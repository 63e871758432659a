//! Error types for groupchat.

use thiserror::Error;

/// Common error type for groupchat.
#[derive(Error, Debug)]
pub enum ChatError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for configuration values or user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Completion provider error.
    ///
    /// Raised when the assistant's upstream API fails, times out, or
    /// returns a response that cannot be used as a reply.
    #[error("provider error: {0}")]
    Provider(String),

    /// Wire protocol violation by a peer (over-long line, invalid UTF-8).
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for groupchat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
