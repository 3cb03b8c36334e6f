//! Node configuration.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use beamlink_discovery::SERVICE_TYPE;
use beamlink_files::DEFAULT_CHUNK_SIZE;

/// How long one auto-reconnect attempt may stay in flight per discovery
/// cycle before it is abandoned.
pub const AUTO_RECONNECT_WINDOW: Duration = Duration::from_secs(5);

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Device name shown to peers.
    pub device_name: String,
    /// Stable peer id. Generated when left empty.
    pub device_id: String,
    /// Monitor/display name advertised over mDNS.
    pub monitor_name: String,
    /// DNS-SD service type to advertise and browse.
    pub service_type: String,
    /// IPv4 address to advertise. `None` autodetects.
    pub listen_ip: Option<Ipv4Addr>,
    /// Port the transfer listener binds. 0 picks an ephemeral port.
    pub listen_port: u16,
    /// Directory received files land in.
    pub download_dir: PathBuf,
    /// Path of the persisted preferred-peer descriptor.
    pub preferred_peer_path: PathBuf,
    /// Streaming chunk size.
    pub chunk_size: usize,
    /// Bound on one auto-reconnect attempt.
    pub auto_reconnect_window: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let state_dir = std::env::temp_dir().join("beamlink");
        Self {
            device_name: default_device_name(),
            device_id: generate_device_id(),
            monitor_name: "Main Display".to_owned(),
            service_type: SERVICE_TYPE.to_owned(),
            listen_ip: None,
            listen_port: 0,
            download_dir: state_dir.join("downloads"),
            preferred_peer_path: state_dir.join("preferred-peer.json"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            auto_reconnect_window: AUTO_RECONNECT_WINDOW,
        }
    }
}

/// Generate a random 16-byte hex peer id.
///
/// # Panics
///
/// Panics if the system CSPRNG fails (extremely unlikely).
#[must_use]
pub fn generate_device_id() -> String {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes).expect("system RNG unavailable");
    hex::encode(bytes)
}

fn default_device_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "beamlink-device".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_hex() {
        let a = generate_device_id();
        let b = generate_device_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn defaults_are_usable() {
        let config = NodeConfig::default();
        assert_eq!(config.service_type, SERVICE_TYPE);
        assert_eq!(config.listen_port, 0);
        assert_eq!(config.auto_reconnect_window, AUTO_RECONNECT_WINDOW);
    }
}
