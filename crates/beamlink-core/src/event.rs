//! The tagged event union observers subscribe to.
//!
//! Every cross-component notification is one variant with a typed payload,
//! validated at the boundary once; there are no free-form dictionary
//! payloads anywhere in the core.

use beamlink_discovery::PeerCandidate;
use beamlink_files::{TransferProgress, TransferSession};
use beamlink_sync::ClipboardPayload;

use crate::peer::ClientInfo;
use crate::status::LinkStatus;

/// Events broadcast by the node to all subscribers.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Session status changed (already deduplicated).
    StatusChanged(LinkStatus),
    /// The client registry changed; the full ordered list is attached.
    ClientListChanged(Vec<ClientInfo>),
    /// Discovery resolved a peer candidate.
    PeerFound(PeerCandidate),
    /// A peer was confirmed (by the user or auto-reconnect); the link layer
    /// should now establish the session against this candidate.
    ConnectRequested(PeerCandidate),
    /// Progress observation for a transfer session.
    TransferProgress(TransferProgress),
    /// A transfer session completed (announced exactly once).
    TransferCompleted(TransferSession),
    /// A transfer session ended with an error code (5520 = user cancel).
    TransferFailed {
        /// Session id.
        timestamp: u64,
        /// Terminal error code.
        code: u32,
    },
    /// The peer pushed a clipboard payload (already decoded).
    ClipboardReceived(ClipboardPayload),
    /// The local clipboard changed; the link layer should ship this payload
    /// to the peer.
    ClipboardOutbound(ClipboardPayload),
    /// The peer asked for the local screen descriptor during authorization.
    AuthDataRequested {
        /// Peer index the request was keyed by.
        peer_index: u32,
    },
}
