//! Session/authorization status machine.
//!
//! Status values arrive from the link layer with their wire discriminants;
//! the machine here only deduplicates and re-broadcasts, it never computes
//! transitions on its own. File transfer and clipboard sync are gated on the
//! connected states.

use serde::{Deserialize, Serialize};

/// Session status, in wire order.
///
/// The progression is ordered but not strictly linear: authorization can
/// fail out of `CheckingAuthorization`, and a user-forced
/// `SearchingClients` (99) abandons the session back to discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinkStatus {
    /// Waiting for a link to come up.
    WaitConnecting = 1,
    /// Browsing for peers.
    SearchingService = 2,
    /// Authorization handshake in flight.
    CheckingAuthorization = 3,
    /// Authorized, waiting for casting to begin.
    WaitScreenCasting = 4,
    /// Peer rejected the authorization.
    FailedAuthorization = 5,
    /// Session up, no clients attached yet.
    ConnectedNoClients = 6,
    /// Session up with clients.
    Connected = 7,
    /// Session establishment failed after authorization.
    ConnectedFailed = 8,
    /// User-forced return to discovery, dropping the session.
    SearchingClients = 99,
}

impl LinkStatus {
    /// Numeric wire code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::WaitConnecting),
            2 => Some(Self::SearchingService),
            3 => Some(Self::CheckingAuthorization),
            4 => Some(Self::WaitScreenCasting),
            5 => Some(Self::FailedAuthorization),
            6 => Some(Self::ConnectedNoClients),
            7 => Some(Self::Connected),
            8 => Some(Self::ConnectedFailed),
            99 => Some(Self::SearchingClients),
            _ => None,
        }
    }

    /// Whether file transfer and clipboard sync are permitted.
    #[must_use]
    pub fn allows_sync(self) -> bool {
        matches!(self, Self::Connected | Self::ConnectedNoClients)
    }

    /// Whether this is a recoverable failure the user must act on.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::FailedAuthorization | Self::ConnectedFailed)
    }
}

/// Deduplicating status observer.
///
/// Identical consecutive states are swallowed; observers never hear the
/// same state twice in a row.
#[derive(Debug, Default)]
pub struct StatusTracker {
    current: Option<LinkStatus>,
}

impl StatusTracker {
    /// Tracker with no status observed yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in an observed status.
    ///
    /// Returns the status when it differs from the previous observation,
    /// `None` when it is a consecutive duplicate.
    pub fn observe(&mut self, status: LinkStatus) -> Option<LinkStatus> {
        if self.current == Some(status) {
            return None;
        }
        self.current = Some(status);
        Some(status)
    }

    /// Last observed status.
    #[must_use]
    pub fn current(&self) -> Option<LinkStatus> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn codes_roundtrip() {
        for status in [
            LinkStatus::WaitConnecting,
            LinkStatus::SearchingService,
            LinkStatus::CheckingAuthorization,
            LinkStatus::WaitScreenCasting,
            LinkStatus::FailedAuthorization,
            LinkStatus::ConnectedNoClients,
            LinkStatus::Connected,
            LinkStatus::ConnectedFailed,
            LinkStatus::SearchingClients,
        ] {
            assert_eq!(LinkStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(LinkStatus::from_code(0), None);
        assert_eq!(LinkStatus::from_code(9), None);
    }

    #[test]
    fn sync_gating_only_in_connected_states() {
        assert!(LinkStatus::Connected.allows_sync());
        assert!(LinkStatus::ConnectedNoClients.allows_sync());
        for status in [
            LinkStatus::WaitConnecting,
            LinkStatus::SearchingService,
            LinkStatus::CheckingAuthorization,
            LinkStatus::WaitScreenCasting,
            LinkStatus::FailedAuthorization,
            LinkStatus::ConnectedFailed,
            LinkStatus::SearchingClients,
        ] {
            assert!(!status.allows_sync());
        }
    }

    #[test]
    fn duplicate_observations_are_swallowed() {
        let mut tracker = StatusTracker::new();
        assert_eq!(
            tracker.observe(LinkStatus::SearchingService),
            Some(LinkStatus::SearchingService)
        );
        assert_eq!(tracker.observe(LinkStatus::SearchingService), None);
        assert_eq!(
            tracker.observe(LinkStatus::Connected),
            Some(LinkStatus::Connected)
        );
        // Returning to an earlier state is a change, not a duplicate.
        assert_eq!(
            tracker.observe(LinkStatus::SearchingService),
            Some(LinkStatus::SearchingService)
        );
    }

    fn arb_status() -> impl Strategy<Value = LinkStatus> {
        prop_oneof![
            Just(LinkStatus::WaitConnecting),
            Just(LinkStatus::SearchingService),
            Just(LinkStatus::CheckingAuthorization),
            Just(LinkStatus::WaitScreenCasting),
            Just(LinkStatus::FailedAuthorization),
            Just(LinkStatus::ConnectedNoClients),
            Just(LinkStatus::Connected),
            Just(LinkStatus::ConnectedFailed),
            Just(LinkStatus::SearchingClients),
        ]
    }

    proptest! {
        /// No sequence of observations ever emits the same state twice in
        /// a row.
        #[test]
        fn never_emits_consecutive_duplicates(updates in prop::collection::vec(arb_status(), 0..64)) {
            let mut tracker = StatusTracker::new();
            let emitted: Vec<_> = updates
                .into_iter()
                .filter_map(|s| tracker.observe(s))
                .collect();
            for pair in emitted.windows(2) {
                prop_assert_ne!(pair[0], pair[1]);
            }
        }
    }
}
