//! # beamlink Discovery
//!
//! mDNS/DNS-SD peer discovery for beamlink.
//!
//! This crate provides:
//! - Service advertisement with TXT metadata (monitor name, version, host)
//! - Filtered browsing with single-shot resolution semantics
//! - Candidate consistency checking against TXT metadata
//!
//! Discovery is IPv4-only: AAAA records on resolved services are skipped.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod advertiser;
pub mod browser;
pub mod error;

pub use advertiser::Advertiser;
pub use browser::{BrowseConfig, Browser};
pub use error::{DiscoveryError, Result};

use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default DNS-SD service type browsed and advertised by beamlink nodes.
pub const SERVICE_TYPE: &str = "_beamlink._tcp.local.";

/// TXT record key carrying the protocol version.
pub const TXT_VERSION: &str = "version";
/// TXT record key carrying the advertised monitor/display name.
pub const TXT_MONITOR: &str = "monitor";
/// TXT record key carrying the advertised IPv4 address.
pub const TXT_HOST: &str = "host";

/// A peer resolved from an mDNS browse.
///
/// Created on service resolution and replaced wholesale when the same
/// instance name resolves again. Candidates are discarded when browsing
/// stops or a fresh search begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCandidate {
    /// DNS-SD instance name (unique per peer on the subnet).
    pub instance_name: String,
    /// Resolved IPv4 address.
    pub ip: Ipv4Addr,
    /// Service port.
    pub port: u16,
    /// Human-readable monitor/display name from TXT metadata.
    pub monitor_name: String,
    /// Peer protocol version from TXT metadata.
    pub version: String,
    /// Resolution time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl PeerCandidate {
    /// `ip:port` endpoint string for this candidate.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_endpoint_formats_ip_and_port() {
        let candidate = PeerCandidate {
            instance_name: "office-mac".into(),
            ip: Ipv4Addr::new(10, 0, 0, 5),
            port: 40_123,
            monitor_name: "Office Display".into(),
            version: "1".into(),
            timestamp_ms: 0,
        };
        assert_eq!(candidate.endpoint(), "10.0.0.5:40123");
    }
}
