//! Error types for agent-deck.

use thiserror::Error;

/// Main error type for agent-deck operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Argument contains shell metacharacters and must not reach a remote shell
    #[error("Unsafe argument for remote execution: {0:?}")]
    UnsafeArgument(String),

    /// The multiplexer binary cannot be located or its server is unreachable
    #[error("Multiplexer unavailable: {0}")]
    MultiplexerUnavailable(String),

    /// Referenced session is not present in the live listing
    #[error("Session not found: {0}")]
    SessionAbsent(String),

    /// Pane capture failed; retriable, counts toward the remote error budget
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// PTY spawn/resize/read failure
    #[error("PTY error: {0}")]
    PtyFailure(String),

    /// I/O failure against on-disk state
    #[error("Store I/O error: {0}")]
    StoreIo(String),

    /// Malformed persisted JSON
    #[error("Store parse error: {0}")]
    StoreParse(String),

    /// Advisory-lock acquisition failed
    #[error("Lock acquisition failed: {0}")]
    LockFailure(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or parameters (generic)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error is a transient capture failure that should be
    /// counted against the remote error budget rather than surfaced.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::CaptureFailed(_))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
