//! The node: one owned service instance per process.
//!
//! `LinkNode` wires discovery, the status machine, the client registry, the
//! transfer engine, and the sync bridge together, and fans every component
//! event into a single broadcast channel. It is injected into consumers;
//! nothing here is a process-global.
//!
//! The node is reactive about session status: the link layer calls
//! [`LinkNode::apply_status`] with the authoritative state, and the node
//! deduplicates, runs the per-state side effects, and re-broadcasts.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use beamlink_discovery::advertiser::detect_local_ip;
use beamlink_discovery::{Advertiser, BrowseConfig, Browser, PeerCandidate};
use beamlink_files::engine::EngineConfig;
use beamlink_files::{
    DropStatus, DropTarget, TransferEngine, TransferEvent, TransferSession,
};
use beamlink_sync::{ClipboardPayload, RawClipboardFrame, ScreenDescriptor, SyncBridge};

use crate::event::LinkEvent;
use crate::node::config::{NodeConfig, generate_device_id};
use crate::node::error::{NodeError, Result};
use crate::node::reconnect::ReconnectWindow;
use crate::peer::{ClientInfo, PreferredPeer, PreferredPeerStore};
use crate::registry::ClientRegistry;
use crate::status::{LinkStatus, StatusTracker};

/// Protocol version advertised in mDNS TXT metadata.
pub const PROTOCOL_VERSION: &str = "1";

/// Capacity of the observer broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 128;

struct NodeInner {
    config: NodeConfig,
    status: Mutex<StatusTracker>,
    registry: Mutex<ClientRegistry>,
    candidates: Mutex<Vec<PeerCandidate>>,
    pending_confirm: Mutex<Option<PeerCandidate>>,
    browser: Mutex<Option<Browser>>,
    advertiser: Mutex<Option<Advertiser>>,
    engine: Arc<TransferEngine>,
    engine_events: Mutex<Option<mpsc::UnboundedReceiver<TransferEvent>>>,
    bridge: SyncBridge,
    bridge_outbound: Mutex<Option<mpsc::UnboundedReceiver<ClipboardPayload>>>,
    preferred: PreferredPeerStore,
    reconnect: Mutex<ReconnectWindow>,
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<LinkEvent>,
    running: AtomicBool,
    advertised_port: AtomicU16,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// The beamlink node.
///
/// Cheap to clone; all clones share one service instance.
#[derive(Clone)]
pub struct LinkNode {
    inner: Arc<NodeInner>,
}

impl LinkNode {
    /// Create a node. No network activity happens until
    /// [`LinkNode::start`].
    #[must_use]
    pub fn new(mut config: NodeConfig) -> Self {
        if config.device_id.is_empty() {
            config.device_id = generate_device_id();
        }

        let local_ip = config.listen_ip.unwrap_or_else(detect_local_ip);
        let mut engine_config = EngineConfig::new(
            config.download_dir.clone(),
            config.device_id.clone(),
            config.device_name.clone(),
            local_ip,
        );
        engine_config.chunk_size = config.chunk_size;
        let (engine, engine_events) = TransferEngine::new(engine_config);

        let (bridge, bridge_outbound) = SyncBridge::new();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let preferred = PreferredPeerStore::new(config.preferred_peer_path.clone());
        let reconnect = ReconnectWindow::new(config.auto_reconnect_window);

        Self {
            inner: Arc::new(NodeInner {
                config,
                status: Mutex::new(StatusTracker::new()),
                registry: Mutex::new(ClientRegistry::new()),
                candidates: Mutex::new(Vec::new()),
                pending_confirm: Mutex::new(None),
                browser: Mutex::new(None),
                advertiser: Mutex::new(None),
                engine,
                engine_events: Mutex::new(Some(engine_events)),
                bridge,
                bridge_outbound: Mutex::new(Some(bridge_outbound)),
                preferred,
                reconnect: Mutex::new(reconnect),
                reconnect_timer: Mutex::new(None),
                events,
                running: AtomicBool::new(false),
                advertised_port: AtomicU16::new(0),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Node configuration.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Local peer id.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.inner.config.device_id
    }

    /// Subscribe to node events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.inner.events.subscribe()
    }

    /// Whether the node is started.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Port the transfer listener actually bound.
    #[must_use]
    pub fn advertised_port(&self) -> u16 {
        self.inner.advertised_port.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the node: storage, transfer listener, event pumps, mDNS
    /// advertisement.
    ///
    /// Idempotent: starting an already-running node refreshes the mDNS
    /// advertisement with the current address instead of restarting.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer listener cannot bind or the
    /// advertisement fails.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            debug!("start on a running node: refreshing advertisement");
            return self.refresh_advertisement();
        }

        self.inner.engine.initialize();

        let listener =
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.inner.config.listen_port)).await?;
        let port = listener.local_addr()?.port();
        self.inner.advertised_port.store(port, Ordering::SeqCst);

        let engine = Arc::clone(&self.inner.engine);
        let serve = tokio::spawn(async move {
            if let Err(e) = engine.serve(listener).await {
                warn!("transfer listener stopped: {e}");
            }
        });

        let mut tasks = vec![serve];
        if let Some(mut rx) = lock(&self.inner.engine_events).take() {
            let node = self.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    node.emit(match event {
                        TransferEvent::Progress(p) => LinkEvent::TransferProgress(p),
                        TransferEvent::Completed(s) => LinkEvent::TransferCompleted(s),
                        TransferEvent::Errored { timestamp, code } => {
                            LinkEvent::TransferFailed { timestamp, code }
                        }
                    });
                }
            }));
        }
        if let Some(mut rx) = lock(&self.inner.bridge_outbound).take() {
            let node = self.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    node.emit(LinkEvent::ClipboardOutbound(payload));
                }
            }));
        }
        lock(&self.inner.tasks).extend(tasks);

        self.refresh_advertisement()?;
        self.inner.running.store(true, Ordering::SeqCst);
        info!(
            "node '{}' started (id {}, port {port})",
            self.inner.config.device_name, self.inner.config.device_id
        );
        Ok(())
    }

    /// Stop the node: discovery, advertisement, listener, pumps.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stop_discovery();
        self.cancel_reconnect_timer();
        if let Some(advertiser) = lock(&self.inner.advertiser).take() {
            advertiser.unregister();
        }
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
        info!("node stopped");
    }

    fn refresh_advertisement(&self) -> Result<()> {
        let config = &self.inner.config;
        let ip = config.listen_ip.unwrap_or_else(detect_local_ip);
        let port = self.advertised_port();

        let advertiser = Advertiser::register(
            &config.service_type,
            &config.device_name,
            &config.monitor_name,
            ip,
            port,
            PROTOCOL_VERSION,
        )?;
        if let Some(previous) = lock(&self.inner.advertiser).replace(advertiser) {
            previous.unregister();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Session status
    // ------------------------------------------------------------------

    /// Last observed session status.
    #[must_use]
    pub fn status(&self) -> Option<LinkStatus> {
        lock(&self.inner.status).current()
    }

    /// Fold in an authoritative status update from the link layer.
    ///
    /// Consecutive duplicates are swallowed. A change runs the per-state
    /// side effects and is re-broadcast as
    /// [`LinkEvent::StatusChanged`].
    pub fn apply_status(&self, status: LinkStatus) {
        let Some(changed) = lock(&self.inner.status).observe(status) else {
            return;
        };

        self.inner.bridge.set_active(changed.allows_sync());

        match changed {
            LinkStatus::WaitConnecting => {}
            LinkStatus::SearchingService => {
                let filter = self.inner.preferred.load().map(|p| p.instance_name);
                if let Err(e) = self.start_discovery(filter) {
                    warn!("discovery failed to start: {e}");
                }
            }
            LinkStatus::CheckingAuthorization | LinkStatus::WaitScreenCasting => {
                debug!("authorization in flight ({changed:?})");
            }
            LinkStatus::FailedAuthorization | LinkStatus::ConnectedFailed => {
                // Recoverable; the user must re-initiate, nothing retries.
                warn!("session failed: {changed:?}");
                self.cancel_reconnect_timer();
            }
            LinkStatus::Connected | LinkStatus::ConnectedNoClients => {
                self.on_connected();
            }
            LinkStatus::SearchingClients => {
                // User-forced research: the preference is already gone when
                // this comes through force_research; clearing again is
                // harmless for link-layer-driven arrivals.
                if let Err(e) = self.inner.preferred.clear() {
                    warn!("could not clear preferred peer: {e}");
                }
                self.cancel_reconnect_timer();
                if let Err(e) = self.start_discovery(None) {
                    warn!("discovery failed to start: {e}");
                }
            }
        }

        self.emit(LinkEvent::StatusChanged(changed));
    }

    fn on_connected(&self) {
        if let Some(candidate) = lock(&self.inner.pending_confirm).take() {
            let peer = PreferredPeer::from_candidate(&candidate);
            if let Err(e) = self.inner.preferred.save(&peer) {
                warn!("could not persist preferred peer: {e}");
            }
        }
        lock(&self.inner.candidates).clear();
        self.stop_discovery();
        self.cancel_reconnect_timer();
        lock(&self.inner.reconnect).cancel();
    }

    /// User-forced return to discovery (wire status 99).
    ///
    /// Destructive: it disconnects any current session and drops the
    /// persisted auto-reconnect preference, so the caller must pass
    /// `confirmed = true` after prompting the user.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ConfirmationRequired`] when not confirmed.
    pub fn force_research(&self, confirmed: bool) -> Result<()> {
        if !confirmed {
            return Err(NodeError::ConfirmationRequired(
                "re-searching disconnects the current session".into(),
            ));
        }
        self.inner.preferred.clear()?;
        self.apply_status(LinkStatus::SearchingClients);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Begin browsing for peers, optionally filtered to one instance name.
    ///
    /// A browse already in flight is stopped first. Candidates surface as
    /// [`LinkEvent::PeerFound`]; when the persisted preferred peer shows up
    /// it is auto-confirmed once per cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the mDNS daemon cannot be driven.
    pub fn start_discovery(&self, filter: Option<String>) -> Result<()> {
        let mut browser_slot = lock(&self.inner.browser);
        if browser_slot.is_none() {
            *browser_slot = Some(Browser::new()?);
        }
        let browser = browser_slot
            .as_mut()
            .ok_or_else(|| NodeError::InvalidState("browser unavailable".into()))?;

        let config = BrowseConfig {
            service_type: self.inner.config.service_type.clone(),
            filter_instance: filter,
        };
        let mut rx = browser.start(config)?;
        drop(browser_slot);

        lock(&self.inner.candidates).clear();
        lock(&self.inner.reconnect).begin_cycle();

        let node = self.clone();
        tokio::spawn(async move {
            while let Some(candidate) = rx.recv().await {
                node.handle_candidate(candidate);
            }
        });
        Ok(())
    }

    /// Stop browsing and clear the candidate list.
    pub fn stop_discovery(&self) {
        if let Some(browser) = lock(&self.inner.browser).as_mut() {
            browser.stop();
        }
        lock(&self.inner.candidates).clear();
    }

    /// Snapshot of the discovered candidates.
    #[must_use]
    pub fn candidates(&self) -> Vec<PeerCandidate> {
        lock(&self.inner.candidates).clone()
    }

    /// The persisted preferred peer, if any.
    #[must_use]
    pub fn preferred_peer(&self) -> Option<PreferredPeer> {
        self.inner.preferred.load()
    }

    fn handle_candidate(&self, candidate: PeerCandidate) {
        {
            let mut candidates = lock(&self.inner.candidates);
            if let Some(existing) = candidates
                .iter_mut()
                .find(|c| c.instance_name == candidate.instance_name)
            {
                *existing = candidate.clone();
            } else {
                candidates.push(candidate.clone());
            }
        }
        self.emit(LinkEvent::PeerFound(candidate.clone()));

        let preferred_matches = self
            .inner
            .preferred
            .load()
            .is_some_and(|p| p.instance_name == candidate.instance_name);
        if preferred_matches && lock(&self.inner.reconnect).try_begin(Instant::now()) {
            info!(
                "auto-reconnecting to preferred peer '{}'",
                candidate.instance_name
            );
            self.confirm_candidate(candidate);
            self.arm_reconnect_timer();
        }
    }

    /// Confirm a discovered peer by instance name.
    ///
    /// Stops browsing and asks the link layer (via
    /// [`LinkEvent::ConnectRequested`]) to establish the session.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::UnknownPeer`] when no discovered candidate has
    /// that name.
    pub fn confirm_peer(&self, instance_name: &str) -> Result<()> {
        let candidate = lock(&self.inner.candidates)
            .iter()
            .find(|c| c.instance_name == instance_name)
            .cloned()
            .ok_or_else(|| NodeError::UnknownPeer(instance_name.to_owned()))?;

        // A manual confirmation supersedes any pending auto-attempt.
        self.cancel_reconnect_timer();
        lock(&self.inner.reconnect).cancel();

        self.confirm_candidate(candidate);
        Ok(())
    }

    fn confirm_candidate(&self, candidate: PeerCandidate) {
        info!(
            "peer '{}' confirmed at {}",
            candidate.instance_name,
            candidate.endpoint()
        );
        *lock(&self.inner.pending_confirm) = Some(candidate.clone());
        if let Some(browser) = lock(&self.inner.browser).as_mut() {
            browser.stop();
        }
        self.emit(LinkEvent::ConnectRequested(candidate));
    }

    fn arm_reconnect_timer(&self) {
        let node = self.clone();
        let window = self.inner.config.auto_reconnect_window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if !node.status().is_some_and(LinkStatus::allows_sync) {
                warn!("auto-reconnect attempt timed out");
                lock(&node.inner.reconnect).cancel();
            }
        });
        if let Some(previous) = lock(&self.inner.reconnect_timer).replace(timer) {
            previous.abort();
        }
    }

    fn cancel_reconnect_timer(&self) {
        if let Some(timer) = lock(&self.inner.reconnect_timer).take() {
            timer.abort();
        }
    }

    // ------------------------------------------------------------------
    // Client registry
    // ------------------------------------------------------------------

    /// Apply a single-client status update (active upserts, inactive
    /// removes by `(ip, id)`). Emits one
    /// [`LinkEvent::ClientListChanged`] when the registry changed.
    pub fn apply_client_update(&self, info: ClientInfo, active: bool) {
        let changed = lock(&self.inner.registry).apply_status_update(info, active);
        if changed {
            self.emit_client_list();
        }
    }

    /// Apply a full client-list snapshot. Emits a change event only when
    /// the ordered `(ip, id)` sequence actually differs.
    pub fn apply_client_snapshot(&self, list: Vec<ClientInfo>) {
        let changed = lock(&self.inner.registry).apply_full_snapshot(list);
        if changed {
            self.emit_client_list();
        }
    }

    /// Snapshot of the attached clients.
    #[must_use]
    pub fn clients(&self) -> Vec<ClientInfo> {
        lock(&self.inner.registry).clients()
    }

    /// Look a client up by id.
    #[must_use]
    pub fn client(&self, id: &str) -> Option<ClientInfo> {
        lock(&self.inner.registry).get(id)
    }

    fn emit_client_list(&self) {
        let list = lock(&self.inner.registry).clients();
        self.emit(LinkEvent::ClientListChanged(list));
    }

    // ------------------------------------------------------------------
    // File transfer
    // ------------------------------------------------------------------

    /// Request a multi-file drop to an attached client.
    ///
    /// Transfers are gated on a connected session; outside of one the
    /// request answers `NotInitialized`, matching an engine nobody started.
    /// An unknown client id is a parameter error.
    ///
    /// # Errors
    ///
    /// Returns the wire rejection code; accepted requests return the new
    /// session's timestamp id.
    pub fn request_drop(
        &self,
        paths: Vec<PathBuf>,
        target_client_id: &str,
    ) -> std::result::Result<u64, DropStatus> {
        if !self.status().is_some_and(LinkStatus::allows_sync) {
            return Err(DropStatus::NotInitialized);
        }
        let Some(client) = self.client(target_client_id) else {
            return Err(DropStatus::InvalidParams);
        };
        self.inner.engine.request_drop(
            paths,
            DropTarget {
                ip: client.ip,
                port: client.source_port,
                client_id: client.id,
            },
        )
    }

    /// Best-effort transfer cancellation; see
    /// [`TransferEngine::cancel`].
    pub fn cancel_transfer(&self, endpoint: &str, client_id: &str, timestamp: u64) -> bool {
        self.inner.engine.cancel(endpoint, client_id, timestamp)
    }

    /// Snapshot of all transfer sessions, newest first.
    #[must_use]
    pub fn sessions(&self) -> Vec<TransferSession> {
        self.inner.engine.sessions()
    }

    /// Snapshot of one transfer session.
    #[must_use]
    pub fn session(&self, timestamp: u64) -> Option<TransferSession> {
        self.inner.engine.session(timestamp)
    }

    /// Delete a finished session record (local only).
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or still active.
    pub fn delete_session(&self, timestamp: u64) -> Result<()> {
        self.inner.engine.delete_session(timestamp)?;
        Ok(())
    }

    /// Path of the received file for a completed single-file session.
    ///
    /// # Errors
    ///
    /// Multi-file sessions are rejected; only single-file sessions can be
    /// opened.
    pub fn open_session_file(&self, timestamp: u64) -> Result<PathBuf> {
        Ok(self.inner.engine.open_session_file(timestamp)?)
    }

    // ------------------------------------------------------------------
    // Clipboard / screen sync
    // ------------------------------------------------------------------

    /// Queue a local clipboard change for the peer.
    ///
    /// # Errors
    ///
    /// Returns an error outside a connected session or for an empty
    /// payload.
    pub fn push_clipboard(&self, payload: ClipboardPayload) -> Result<()> {
        self.inner.bridge.push_clipboard(payload)?;
        Ok(())
    }

    /// Hand an inbound clipboard frame to the bridge. A decoded, non-empty
    /// payload is re-broadcast as [`LinkEvent::ClipboardReceived`].
    pub fn accept_clipboard_frame(&self, frame: &RawClipboardFrame) -> Option<ClipboardPayload> {
        let payload = self.inner.bridge.accept_inbound(frame)?;
        self.emit(LinkEvent::ClipboardReceived(payload.clone()));
        Some(payload)
    }

    /// Replace the local screen descriptor (wholesale).
    pub fn set_screen_descriptor(&self, descriptor: ScreenDescriptor) {
        self.inner.bridge.set_screen_descriptor(descriptor);
    }

    /// Answer a peer's auth-data request with the serialized local screen
    /// descriptor, or an empty string when none is set yet.
    #[must_use]
    pub fn auth_data_requested(&self, peer_index: u32) -> String {
        self.emit(LinkEvent::AuthDataRequested { peer_index });
        self.inner.bridge.screen_descriptor_json(peer_index)
    }

    fn emit(&self, event: LinkEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

/// Lock a mutex, recovering from poisoning instead of propagating panics.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::SourcePortKind;
    use tempfile::TempDir;

    fn test_node(dir: &TempDir) -> LinkNode {
        let config = NodeConfig {
            device_name: "test-node".into(),
            listen_ip: Some(Ipv4Addr::LOCALHOST),
            download_dir: dir.path().join("downloads"),
            preferred_peer_path: dir.path().join("preferred.json"),
            ..NodeConfig::default()
        };
        LinkNode::new(config)
    }

    fn client(id: &str) -> ClientInfo {
        ClientInfo {
            id: id.into(),
            ip: Ipv4Addr::new(10, 0, 0, 5),
            name: "Den PC".into(),
            device_type: "desktop".into(),
            source_kind: SourcePortKind::Cast,
            source_port: 40_123,
            version: "1".into(),
        }
    }

    fn candidate(name: &str) -> PeerCandidate {
        PeerCandidate {
            instance_name: name.into(),
            ip: Ipv4Addr::new(10, 0, 0, 5),
            port: 40_123,
            monitor_name: "Den Display".into(),
            version: "1".into(),
            timestamp_ms: 1,
        }
    }

    #[tokio::test]
    async fn duplicate_status_is_not_rebroadcast() {
        let dir = TempDir::new().unwrap();
        let node = test_node(&dir);
        let mut rx = node.subscribe();

        node.apply_status(LinkStatus::WaitConnecting);
        node.apply_status(LinkStatus::WaitConnecting);
        node.apply_status(LinkStatus::Connected);

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let LinkEvent::StatusChanged(s) = event {
                seen.push(s);
            }
        }
        assert_eq!(seen, vec![LinkStatus::WaitConnecting, LinkStatus::Connected]);
    }

    #[tokio::test]
    async fn connected_persists_confirmed_peer_and_clears_candidates() {
        let dir = TempDir::new().unwrap();
        let node = test_node(&dir);

        lock(&node.inner.candidates).push(candidate("den-pc"));
        *lock(&node.inner.pending_confirm) = Some(candidate("den-pc"));

        node.apply_status(LinkStatus::Connected);

        assert!(node.candidates().is_empty());
        let preferred = node.preferred_peer().unwrap();
        assert_eq!(preferred.instance_name, "den-pc");
    }

    #[tokio::test]
    async fn force_research_requires_confirmation_and_drops_preference() {
        let dir = TempDir::new().unwrap();
        let node = test_node(&dir);

        *lock(&node.inner.pending_confirm) = Some(candidate("den-pc"));
        node.apply_status(LinkStatus::Connected);
        assert!(node.preferred_peer().is_some());

        assert!(matches!(
            node.force_research(false),
            Err(NodeError::ConfirmationRequired(_))
        ));
        assert!(node.preferred_peer().is_some());

        // Confirmed research clears the preference. Discovery start may
        // fail in a sandboxed environment; the preference drop must hold
        // regardless.
        let _ = node.force_research(true);
        assert!(node.preferred_peer().is_none());
    }

    #[tokio::test]
    async fn transfers_are_gated_on_connected_status() {
        let dir = TempDir::new().unwrap();
        let node = test_node(&dir);
        node.apply_client_update(client("A"), true);

        let file = dir.path().join("f.bin");
        std::fs::write(&file, b"x").unwrap();

        // Not connected: gate answers NotInitialized.
        assert_eq!(
            node.request_drop(vec![file.clone()], "A").unwrap_err(),
            DropStatus::NotInitialized
        );

        node.apply_status(LinkStatus::Connected);
        // Connected but engine never initialized (node not started):
        // the engine's own admission takes over.
        assert_eq!(
            node.request_drop(vec![file.clone()], "A").unwrap_err(),
            DropStatus::NotInitialized
        );

        // Unknown client is a parameter error.
        node.inner.engine.initialize();
        assert_eq!(
            node.request_drop(vec![file], "nobody").unwrap_err(),
            DropStatus::InvalidParams
        );
    }

    #[tokio::test]
    async fn client_updates_emit_single_change_events() {
        let dir = TempDir::new().unwrap();
        let node = test_node(&dir);
        let mut rx = node.subscribe();

        node.apply_client_update(client("A"), true);
        node.apply_client_snapshot(vec![client("A")]);
        node.apply_client_update(client("A"), false);

        let mut changes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let LinkEvent::ClientListChanged(list) = event {
                changes.push(list.len());
            }
        }
        // Snapshot with identical (ip, id) order produced no event.
        assert_eq!(changes, vec![1, 0]);
    }

    #[tokio::test]
    async fn clipboard_gating_follows_status() {
        let dir = TempDir::new().unwrap();
        let node = test_node(&dir);

        assert!(node.push_clipboard(ClipboardPayload::text("x")).is_err());

        node.apply_status(LinkStatus::ConnectedNoClients);
        node.push_clipboard(ClipboardPayload::text("x")).unwrap();

        node.apply_status(LinkStatus::ConnectedFailed);
        assert!(node.push_clipboard(ClipboardPayload::text("x")).is_err());
    }

    #[tokio::test]
    async fn auth_data_request_answers_descriptor_and_emits() {
        let dir = TempDir::new().unwrap();
        let node = test_node(&dir);
        let mut rx = node.subscribe();

        assert_eq!(node.auth_data_requested(0), "");

        node.set_screen_descriptor(ScreenDescriptor {
            width: 1920,
            height: 1080,
            framerate: 60,
            kind: 0,
            display_name: "Built-in".into(),
        });
        assert!(node.auth_data_requested(1).contains("Built-in"));

        let mut requests = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, LinkEvent::AuthDataRequested { .. }) {
                requests += 1;
            }
        }
        assert_eq!(requests, 2);
    }
}
