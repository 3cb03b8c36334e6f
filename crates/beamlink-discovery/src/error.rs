//! Error types for discovery operations

use thiserror::Error;

/// Errors that can occur during mDNS discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The mDNS daemon could not be created or driven
    #[error("mDNS daemon error: {0}")]
    Daemon(#[from] mdns_sd::Error),

    /// Service type was empty or malformed
    #[error("Invalid service type: {0}")]
    InvalidServiceType(String),
}

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;
