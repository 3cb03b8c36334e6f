//! # beamlink Sync
//!
//! Clipboard and screen-descriptor sync for beamlink.
//!
//! This crate provides:
//! - Clipboard payload modeling (text / image / html) with primary-kind
//!   selection for notifications
//! - A fixed-order text decoding fallback chain for peers with different
//!   default encodings
//! - The request-scoped screen-descriptor store used during authorization
//! - A status-gated relay bridge
//!
//! The bridge is transport-agnostic: outbound payloads surface on a channel
//! and inbound frames are handed in by whoever owns the link.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod encoding;
pub mod payload;
pub mod screen;

pub use bridge::{SyncBridge, SyncError};
pub use encoding::decode_text;
pub use payload::{ClipboardPayload, PayloadKind, RawClipboardFrame};
pub use screen::{ScreenDescriptor, ScreenStore};
