//! Error types for the transfer engine

use thiserror::Error;

/// Errors that can occur in transfer operations
#[derive(Debug, Error)]
pub enum TransferError {
    /// File or socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Control frame could not be encoded or decoded
    #[error("Protocol frame error: {0}")]
    Frame(#[from] serde_json::Error),

    /// Peer violated the batch protocol
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Received file content did not match the offered BLAKE3 hash
    #[error("Hash mismatch for '{0}'")]
    HashMismatch(String),

    /// Peer declined the batch offer
    #[error("Batch declined by peer: {0}")]
    Declined(String),

    /// Transfer was cancelled by the user
    #[error("Transfer cancelled")]
    Cancelled,

    /// No session is tracked under the given timestamp
    #[error("Session not found: {0}")]
    SessionNotFound(u64),

    /// Open requested on a multi-file session
    #[error("Only single file sessions can be opened")]
    MultiFileOpen,

    /// Session is still in flight and cannot be deleted or opened
    #[error("Session {0} is still active")]
    SessionActive(u64),
}

/// Result type for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;
