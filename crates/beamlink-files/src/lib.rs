//! # beamlink Files
//!
//! File transfer engine for beamlink.
//!
//! This crate provides:
//! - Drop-request admission with wire status codes (accepted / bad params /
//!   send busy / receive busy / not initialized)
//! - Single-flight batch streaming over TCP with per-chunk progress events
//! - BLAKE3 whole-file integrity verification on receive
//! - Best-effort cancellation surfaced as an error-coded progress event
//!
//! A batch of one or more files is tracked under a single millisecond
//! timestamp, which doubles as the session identifier.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod engine;
pub mod error;
pub mod session;
pub mod wire;

pub use engine::{DropTarget, EngineConfig, TransferEngine, TransferEvent};
pub use error::{Result, TransferError};
pub use session::{DropStatus, ERROR_CANCELLED, TransferProgress, TransferSession};

/// Default chunk size (256 KiB). Progress granularity and socket write size
/// for batch streaming.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// File metadata carried in a batch offer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileEntry {
    /// File name (no path components).
    pub name: String,
    /// File size in bytes.
    pub size: u64,
    /// Lowercase hex BLAKE3 hash of the whole file.
    pub hash: String,
}
