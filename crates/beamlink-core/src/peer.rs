//! Client descriptors and the persisted preferred peer.

use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use beamlink_discovery::PeerCandidate;

/// How a client reached this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourcePortKind {
    /// Native beamlink cast link.
    Cast,
    /// AirPlay-compatible link.
    AirPlay,
    /// Wired (USB) link.
    Usb,
    /// Unrecognized link kind.
    Unknown,
}

/// A peer attached to the active session.
///
/// Identity key is `(ip, id)`; the registry never holds two entries with
/// the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Peer id.
    pub id: String,
    /// Peer IPv4 address.
    pub ip: Ipv4Addr,
    /// Peer device name.
    pub name: String,
    /// Peer device type (free-form, e.g. "macbook", "phone").
    pub device_type: String,
    /// How the client is attached.
    pub source_kind: SourcePortKind,
    /// Port the client accepts batch transfers on.
    pub source_port: u16,
    /// Peer protocol version.
    pub version: String,
}

impl ClientInfo {
    /// Registry identity key.
    #[must_use]
    pub fn key(&self) -> (Ipv4Addr, &str) {
        (self.ip, &self.id)
    }
}

/// Persisted descriptor of the last confirmed peer, used for auto-reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredPeer {
    /// mDNS instance name the peer advertises.
    pub instance_name: String,
    /// Last known IPv4 address.
    pub ip: Ipv4Addr,
    /// Last known monitor name.
    pub monitor_name: String,
    /// Last known protocol version.
    pub version: String,
    /// When the peer was last confirmed (ms since epoch).
    pub timestamp_ms: u64,
}

impl PreferredPeer {
    /// Snapshot a discovered candidate as the preferred peer.
    #[must_use]
    pub fn from_candidate(candidate: &PeerCandidate) -> Self {
        Self {
            instance_name: candidate.instance_name.clone(),
            ip: candidate.ip,
            monitor_name: candidate.monitor_name.clone(),
            version: candidate.version.clone(),
            timestamp_ms: candidate.timestamp_ms,
        }
    }
}

/// JSON-file-backed store for the preferred peer.
///
/// Load failures degrade to "no preference" with a log line; a broken store
/// must never take the session down.
#[derive(Debug, Clone)]
pub struct PreferredPeerStore {
    path: PathBuf,
}

impl PreferredPeerStore {
    /// Store backed by the given file path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the persisted peer, if any.
    #[must_use]
    pub fn load(&self) -> Option<PreferredPeer> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("preferred peer store unreadable ({}): {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(peer) => Some(peer),
            Err(e) => {
                warn!("preferred peer store corrupt ({}): {e}", self.path.display());
                None
            }
        }
    }

    /// Persist a peer, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, peer: &PreferredPeer) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(peer)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, json)?;
        debug!("preferred peer '{}' persisted", peer.instance_name);
        Ok(())
    }

    /// Drop the persisted peer. Missing file is fine.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("preferred peer cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn candidate() -> PeerCandidate {
        PeerCandidate {
            instance_name: "den-pc".into(),
            ip: Ipv4Addr::new(10, 0, 0, 5),
            port: 40_123,
            monitor_name: "Den Display".into(),
            version: "1".into(),
            timestamp_ms: 1_000,
        }
    }

    #[test]
    fn store_roundtrip_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = PreferredPeerStore::new(dir.path().join("state/preferred.json"));

        assert_eq!(store.load(), None);

        let peer = PreferredPeer::from_candidate(&candidate());
        store.save(&peer).unwrap();
        assert_eq!(store.load(), Some(peer));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_store_degrades_to_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferred.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = PreferredPeerStore::new(path);
        assert_eq!(store.load(), None);
    }
}
