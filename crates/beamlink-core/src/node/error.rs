//! Error types for node operations

use thiserror::Error;

/// Errors that can occur in node operations
#[derive(Debug, Error)]
pub enum NodeError {
    /// Discovery layer failed
    #[error("Discovery error: {0}")]
    Discovery(#[from] beamlink_discovery::DiscoveryError),

    /// Transfer engine failed
    #[error("Transfer error: {0}")]
    Transfer(#[from] beamlink_files::TransferError),

    /// Clipboard/screen bridge refused an operation
    #[error("Sync error: {0}")]
    Sync(#[from] beamlink_sync::SyncError),

    /// Local I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation requires a running node
    #[error("Node is not running")]
    NotRunning,

    /// Invalid lifecycle or session state for the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No discovered candidate matches the given instance name
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    /// Destructive operation attempted without explicit confirmation
    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
