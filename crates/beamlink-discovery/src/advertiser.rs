//! mDNS service advertisement.
//!
//! A beamlink node registers itself under [`crate::SERVICE_TYPE`] so peers on
//! the same subnet can find it without manual IP entry.
//!
//! # TXT record keys
//!
//! | Key       | Value                                |
//! |-----------|--------------------------------------|
//! | `version` | Protocol version                     |
//! | `monitor` | Advertised monitor/display name      |
//! | `host`    | Advertised LAN IPv4 address          |

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::{TXT_HOST, TXT_MONITOR, TXT_VERSION};

/// Active mDNS service advertisement. Call [`Advertiser::unregister`] or drop
/// to stop advertising.
pub struct Advertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Advertiser {
    /// Register this node on the local mDNS domain.
    ///
    /// Re-registering the same instance name replaces the previous
    /// advertisement, which is how a listen-address change is published
    /// without a full restart.
    ///
    /// # Arguments
    ///
    /// - `service_type` - DNS-SD service type, e.g. [`crate::SERVICE_TYPE`]
    /// - `instance_name` - instance name visible in peer discovery lists
    /// - `monitor_name` - human-readable monitor/display name
    /// - `host_ip` - local LAN IPv4 address to advertise
    /// - `port` - service listen port
    /// - `version` - protocol version string
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be created or registration fails.
    pub fn register(
        service_type: &str,
        instance_name: &str,
        monitor_name: &str,
        host_ip: Ipv4Addr,
        port: u16,
        version: &str,
    ) -> Result<Self> {
        let daemon = ServiceDaemon::new()?;

        let raw_host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "beamlink-node".to_owned());
        let host_name = format!("{raw_host}.local.");

        let mut properties = HashMap::new();
        properties.insert(TXT_VERSION.to_owned(), version.to_owned());
        properties.insert(TXT_MONITOR.to_owned(), monitor_name.to_owned());
        properties.insert(TXT_HOST.to_owned(), host_ip.to_string());

        let service = ServiceInfo::new(
            service_type,
            instance_name,
            &host_name,
            IpAddr::V4(host_ip),
            port,
            Some(properties),
        )?;

        let fullname = service.get_fullname().to_owned();
        daemon.register(service)?;

        info!(
            "advertising '{}' at {}:{} (monitor='{}')",
            instance_name, host_ip, port, monitor_name
        );

        Ok(Self { daemon, fullname })
    }

    /// Fully-qualified service name of this advertisement.
    #[must_use]
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Remove the advertisement.
    pub fn unregister(self) {
        match self.daemon.unregister(&self.fullname) {
            Ok(_) => debug!("advertisement '{}' removed", self.fullname),
            Err(e) => warn!("failed to unregister '{}': {}", self.fullname, e),
        }
    }
}

/// Detect the primary LAN IPv4 address by probing an external socket.
///
/// No packets are sent; this only queries the OS routing table.
#[must_use]
pub fn detect_local_ip() -> Ipv4Addr {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("8.8.8.8:80")?;
            s.local_addr()
        })
        .map(|a| match a.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => Ipv4Addr::LOCALHOST,
        })
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_local_ip_returns_something_routable_or_loopback() {
        // On machines with no default route this falls back to loopback.
        let ip = detect_local_ip();
        assert!(!ip.is_unspecified());
    }
}
