//! Filtered mDNS browsing with single-shot resolution.
//!
//! Resolved services surface as [`PeerCandidate`] values on an async channel.
//! When a non-empty instance-name filter is set, every non-matching result is
//! suppressed and browsing stops on the first exact match.
//!
//! A resolved candidate whose A-record address disagrees with the IPv4
//! address embedded in its TXT metadata is discarded: stale multicast caches
//! can answer with an address the peer no longer owns.

use std::net::{IpAddr, Ipv4Addr};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, Result};
use crate::{PeerCandidate, TXT_HOST, TXT_MONITOR, TXT_VERSION, now_ms};

/// Capacity of the candidate event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Parameters for one browse cycle.
#[derive(Debug, Clone)]
pub struct BrowseConfig {
    /// DNS-SD service type to browse.
    pub service_type: String,
    /// Exact instance name to match, or `None` to surface every peer.
    /// An empty string is treated as no filter.
    pub filter_instance: Option<String>,
}

impl BrowseConfig {
    /// Browse for every instance of the given service type.
    #[must_use]
    pub fn all(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            filter_instance: None,
        }
    }

    /// Browse for one specific instance (single-shot resolution).
    #[must_use]
    pub fn single(service_type: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            filter_instance: Some(instance.into()),
        }
    }

    fn normalized_filter(&self) -> Option<&str> {
        self.filter_instance.as_deref().filter(|f| !f.is_empty())
    }
}

struct ActiveBrowse {
    service_type: String,
    task: JoinHandle<()>,
}

/// mDNS browser.
///
/// Browsing is non-reentrant: starting a new search while one is active
/// stops the previous one first, so two overlapping searches with different
/// filters can never run at once.
pub struct Browser {
    daemon: ServiceDaemon,
    active: Option<ActiveBrowse>,
}

impl Browser {
    /// Create a browser backed by a fresh mDNS daemon.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            daemon: ServiceDaemon::new()?,
            active: None,
        })
    }

    /// Whether a browse cycle is currently active.
    #[must_use]
    pub fn is_browsing(&self) -> bool {
        self.active.is_some()
    }

    /// Start browsing.
    ///
    /// Any browse already in flight is stopped first. Candidates arrive on
    /// the returned channel; the channel closes when browsing stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the service type is empty or the daemon rejects
    /// the browse request.
    pub fn start(&mut self, config: BrowseConfig) -> Result<mpsc::Receiver<PeerCandidate>> {
        if config.service_type.is_empty() {
            return Err(DiscoveryError::InvalidServiceType(config.service_type));
        }
        if self.active.is_some() {
            self.stop();
        }

        let receiver = self.daemon.browse(&config.service_type)?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let daemon = self.daemon.clone();
        let service_type = config.service_type.clone();
        let filter = config.normalized_filter().map(str::to_owned);

        info!(
            "browsing '{}' (filter={:?})",
            service_type,
            filter.as_deref()
        );

        let task_type = service_type.clone();
        let task = tokio::spawn(async move {
            while let Ok(event) = receiver.recv_async().await {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let Some(candidate) = candidate_from_info(&info, &task_type) else {
                            continue;
                        };
                        if let Some(ref wanted) = filter {
                            if candidate.instance_name != *wanted {
                                debug!(
                                    "suppressing '{}' (filter '{}')",
                                    candidate.instance_name, wanted
                                );
                                continue;
                            }
                            // Single-shot: first exact match ends the search.
                            let _ = tx.send(candidate).await;
                            if let Err(e) = daemon.stop_browse(&task_type) {
                                warn!("stop_browse after match failed: {e}");
                            }
                            break;
                        }
                        if tx.send(candidate).await.is_err() {
                            break;
                        }
                    }
                    ServiceEvent::SearchStopped(ty) => {
                        debug!("search stopped for '{ty}'");
                        break;
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        debug!("service removed: {fullname}");
                    }
                    ServiceEvent::SearchStarted(_) | ServiceEvent::ServiceFound(_, _) => {}
                }
            }
        });

        self.active = Some(ActiveBrowse { service_type, task });
        Ok(rx)
    }

    /// Stop the active browse, if any, and clear discovered-service state.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = self.daemon.stop_browse(&active.service_type) {
                warn!("stop_browse('{}') failed: {e}", active.service_type);
            }
            active.task.abort();
            info!("browse for '{}' stopped", active.service_type);
        }
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build a candidate from a resolved service, or `None` when it must be
/// discarded (no IPv4 address, or TXT/A-record mismatch).
fn candidate_from_info(info: &ServiceInfo, service_type: &str) -> Option<PeerCandidate> {
    let instance_name = instance_from_fullname(info.get_fullname(), service_type);

    let resolved_v4 = first_ipv4(info.get_addresses().iter().copied());
    let Some(ip) = resolved_v4 else {
        debug!("skipping '{instance_name}': no IPv4 address record");
        return None;
    };

    let txt_host = info.get_property_val_str(TXT_HOST);
    if !host_metadata_consistent(txt_host, ip) {
        warn!(
            "discarding '{instance_name}': resolved {ip} but TXT host is {:?}",
            txt_host
        );
        return None;
    }

    Some(PeerCandidate {
        instance_name,
        ip,
        port: info.get_port(),
        monitor_name: info
            .get_property_val_str(TXT_MONITOR)
            .unwrap_or_default()
            .to_owned(),
        version: info
            .get_property_val_str(TXT_VERSION)
            .unwrap_or_default()
            .to_owned(),
        timestamp_ms: now_ms(),
    })
}

/// Strip the service-type suffix from a fullname, yielding the instance name.
fn instance_from_fullname(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_owned()
}

/// First IPv4 address in an address set; AAAA records are ignored.
fn first_ipv4(addresses: impl Iterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    let mut v4 = None;
    for addr in addresses {
        match addr {
            IpAddr::V4(a) if v4.is_none() => v4 = Some(a),
            IpAddr::V4(_) => {}
            IpAddr::V6(a) => debug!("ignoring IPv6 address record {a}"),
        }
    }
    v4
}

/// A candidate is consistent when its TXT `host` entry is absent, unparsable,
/// or equal to the resolved address.
fn host_metadata_consistent(txt_host: Option<&str>, resolved: Ipv4Addr) -> bool {
    match txt_host.and_then(|h| h.parse::<Ipv4Addr>().ok()) {
        Some(advertised) => advertised == resolved,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_strips_type_suffix() {
        assert_eq!(
            instance_from_fullname("den-pc._beamlink._tcp.local.", "_beamlink._tcp.local."),
            "den-pc"
        );
        // Unrecognized suffix is passed through untouched.
        assert_eq!(
            instance_from_fullname("odd-name", "_beamlink._tcp.local."),
            "odd-name"
        );
    }

    #[test]
    fn first_ipv4_skips_v6_records() {
        let addrs = vec![
            IpAddr::V6("fe80::1".parse().unwrap()),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)),
        ];
        assert_eq!(
            first_ipv4(addrs.into_iter()),
            Some(Ipv4Addr::new(192, 168, 1, 7))
        );
        assert_eq!(
            first_ipv4(vec![IpAddr::V6("::1".parse().unwrap())].into_iter()),
            None
        );
    }

    #[test]
    fn mismatched_txt_host_is_inconsistent() {
        let resolved = Ipv4Addr::new(10, 0, 0, 5);
        assert!(host_metadata_consistent(None, resolved));
        assert!(host_metadata_consistent(Some("10.0.0.5"), resolved));
        assert!(host_metadata_consistent(Some("not-an-ip"), resolved));
        assert!(!host_metadata_consistent(Some("10.0.0.99"), resolved));
    }

    #[test]
    fn empty_filter_is_treated_as_no_filter() {
        let config = BrowseConfig {
            service_type: "_beamlink._tcp.local.".into(),
            filter_instance: Some(String::new()),
        };
        assert_eq!(config.normalized_filter(), None);

        let config = BrowseConfig::single("_beamlink._tcp.local.", "den-pc");
        assert_eq!(config.normalized_filter(), Some("den-pc"));
    }
}
