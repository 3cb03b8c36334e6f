//! Status-gated clipboard relay.
//!
//! The bridge relays clipboard payloads both ways, but only while the owning
//! session is in a connected state. The session owner flips the gate on
//! status changes; everything else refuses with [`SyncError::NotActive`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::payload::{ClipboardPayload, RawClipboardFrame};
use crate::screen::{ScreenDescriptor, ScreenStore};

/// Errors from bridge operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Session is not in a state that permits clipboard sync
    #[error("Clipboard sync not permitted in the current session state")]
    NotActive,

    /// Payload carried no content
    #[error("Empty clipboard payload")]
    EmptyPayload,
}

/// Bidirectional clipboard/screen bridge.
///
/// Outbound payloads (local clipboard changes) surface on the channel
/// returned by [`SyncBridge::new`]; the link owner drains it and ships the
/// payloads to the peer. Inbound frames are handed to
/// [`SyncBridge::accept_inbound`].
pub struct SyncBridge {
    active: AtomicBool,
    screen: Arc<ScreenStore>,
    outbound: mpsc::UnboundedSender<ClipboardPayload>,
}

impl SyncBridge {
    /// Create a bridge (initially gated off) and its outbound channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClipboardPayload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                active: AtomicBool::new(false),
                screen: Arc::new(ScreenStore::new()),
                outbound: tx,
            },
            rx,
        )
    }

    /// Open or close the gate. Driven by session status changes.
    pub fn set_active(&self, active: bool) {
        let was = self.active.swap(active, Ordering::SeqCst);
        if was != active {
            debug!("clipboard sync {}", if active { "enabled" } else { "disabled" });
        }
    }

    /// Whether relaying is currently permitted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Queue a local clipboard change for the peer.
    ///
    /// # Errors
    ///
    /// Returns an error when the gate is closed or the payload is empty.
    pub fn push_clipboard(&self, payload: ClipboardPayload) -> Result<(), SyncError> {
        if !self.is_active() {
            return Err(SyncError::NotActive);
        }
        if payload.is_empty() {
            return Err(SyncError::EmptyPayload);
        }
        // Receiver dropping just means nobody ships payloads anymore.
        let _ = self.outbound.send(payload);
        Ok(())
    }

    /// Decode an inbound frame from the peer.
    ///
    /// Returns `None` when the gate is closed or nothing in the frame
    /// decoded to content.
    #[must_use]
    pub fn accept_inbound(&self, frame: &RawClipboardFrame) -> Option<ClipboardPayload> {
        if !self.is_active() {
            debug!("dropping inbound clipboard frame: sync gated off");
            return None;
        }
        let payload = frame.decode();
        if payload.is_empty() { None } else { Some(payload) }
    }

    /// Shared screen-descriptor store.
    #[must_use]
    pub fn screen(&self) -> &Arc<ScreenStore> {
        &self.screen
    }

    /// Replace the local screen descriptor.
    pub fn set_screen_descriptor(&self, descriptor: ScreenDescriptor) {
        self.screen.replace(descriptor);
    }

    /// Answer a peer's auth-data request (see
    /// [`ScreenStore::descriptor_json`]). Not gated: the exchange happens
    /// while authorization is still in flight.
    #[must_use]
    pub fn screen_descriptor_json(&self, peer_index: u32) -> String {
        self.screen.descriptor_json(peer_index)
    }
}
