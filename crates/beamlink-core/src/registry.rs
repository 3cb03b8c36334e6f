//! Connected-client registry.
//!
//! All mutation happens through one owner (the node); readers get cloned
//! snapshots. Identity is `(ip, id)` everywhere, including single-client
//! status updates.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::peer::ClientInfo;

/// Ordered registry of session clients, keyed by `(ip, id)`.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Vec<ClientInfo>,
}

impl ClientRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single-client status update.
    ///
    /// `active` upserts (update in place when `(ip, id)` is already known,
    /// append otherwise); inactive removes by `(ip, id)`. Returns whether
    /// the registry changed.
    pub fn apply_status_update(&mut self, info: ClientInfo, active: bool) -> bool {
        let position = self
            .clients
            .iter()
            .position(|c| c.ip == info.ip && c.id == info.id);

        match (active, position) {
            (true, Some(index)) => {
                if self.clients[index] == info {
                    false
                } else {
                    self.clients[index] = info;
                    true
                }
            }
            (true, None) => {
                debug!("client {}@{} attached", info.id, info.ip);
                self.clients.push(info);
                true
            }
            (false, Some(index)) => {
                let removed = self.clients.remove(index);
                debug!("client {}@{} detached", removed.id, removed.ip);
                true
            }
            (false, None) => false,
        }
    }

    /// Replace the registry with a full snapshot.
    ///
    /// Commits only when the ordered `(ip, id)` sequence differs from the
    /// current one, so repeated identical snapshots produce no change and
    /// no downstream churn. Duplicate keys inside the snapshot are dropped
    /// (first occurrence wins) to hold the no-duplicates invariant.
    pub fn apply_full_snapshot(&mut self, list: Vec<ClientInfo>) -> bool {
        let mut deduped: Vec<ClientInfo> = Vec::with_capacity(list.len());
        for info in list {
            if !deduped.iter().any(|c| c.ip == info.ip && c.id == info.id) {
                deduped.push(info);
            }
        }

        let same_keys = deduped.len() == self.clients.len()
            && deduped
                .iter()
                .zip(&self.clients)
                .all(|(a, b)| a.ip == b.ip && a.id == b.id);
        if same_keys {
            return false;
        }

        debug!("client list rebuilt: {} client(s)", deduped.len());
        self.clients = deduped;
        true
    }

    /// Look a client up by id alone.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ClientInfo> {
        self.clients.iter().find(|c| c.id == id).cloned()
    }

    /// Look a client up by the full `(ip, id)` key.
    #[must_use]
    pub fn get_by_key(&self, ip: Ipv4Addr, id: &str) -> Option<ClientInfo> {
        self.clients
            .iter()
            .find(|c| c.ip == ip && c.id == id)
            .cloned()
    }

    /// Snapshot of the current list, in order.
    #[must_use]
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.clients.clone()
    }

    /// Number of attached clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
