//! Transfer engine: drop-request admission, session table, cancellation.
//!
//! Exactly one outbound batch may be in flight system-wide, and inbound and
//! outbound transfers are mutually exclusive: a drop request is rejected
//! with `ReceiveBusy` while a batch is being received, and an incoming offer
//! is declined while a batch is being sent. Rejected requests never produce
//! progress events.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::DEFAULT_CHUNK_SIZE;
use crate::error::{Result, TransferError};
use crate::session::{
    DropStatus, ERROR_CANCELLED, ERROR_TRANSFER_FAILED, TransferProgress, TransferSession,
};
use crate::wire::{self, BatchOffer, LocalIdentity};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chunk size for streaming and progress granularity.
    pub chunk_size: usize,
    /// Directory received files land in.
    pub download_dir: PathBuf,
    /// Local peer id stamped on outbound progress.
    pub device_id: String,
    /// Local device name stamped on outbound progress.
    pub device_name: String,
    /// Local IPv4 address stamped on outbound progress.
    pub local_ip: Ipv4Addr,
}

impl EngineConfig {
    /// Configuration with the default chunk size.
    #[must_use]
    pub fn new(
        download_dir: PathBuf,
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        local_ip: Ipv4Addr,
    ) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            download_dir,
            device_id: device_id.into(),
            device_name: device_name.into(),
            local_ip,
        }
    }
}

/// Where a drop request should be delivered.
#[derive(Debug, Clone)]
pub struct DropTarget {
    /// Target client IPv4 address.
    pub ip: Ipv4Addr,
    /// Target client transfer port.
    pub port: u16,
    /// Target client id, recorded for cancellation matching.
    pub client_id: String,
}

/// Events pushed by the engine.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// A progress observation for some session.
    Progress(TransferProgress),
    /// A session just completed (stamped exactly once).
    Completed(TransferSession),
    /// A session ended with an error code (5520 = cancelled by user).
    Errored {
        /// Session id.
        timestamp: u64,
        /// Terminal error code, retained on the session record.
        code: u32,
    },
}

/// File transfer engine.
///
/// Owns every [`TransferSession`] record; consumers only ever see clones.
pub struct TransferEngine {
    config: EngineConfig,
    sessions: DashMap<u64, TransferSession>,
    cancel_flags: DashMap<u64, Arc<AtomicBool>>,
    outbound_busy: AtomicBool,
    inbound_busy: AtomicBool,
    initialized: AtomicBool,
    last_timestamp: AtomicU64,
    events: mpsc::UnboundedSender<TransferEvent>,
}

impl TransferEngine {
    /// Create an engine and the channel its events arrive on.
    ///
    /// The engine starts uninitialized; [`TransferEngine::initialize`] must
    /// run before drop requests are admitted.
    #[must_use]
    pub fn new(config: EngineConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            config,
            sessions: DashMap::new(),
            cancel_flags: DashMap::new(),
            outbound_busy: AtomicBool::new(false),
            inbound_busy: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            last_timestamp: AtomicU64::new(0),
            events: tx,
        });
        (engine, rx)
    }

    /// Prepare local storage and mark the engine ready.
    ///
    /// An unusable download directory leaves the engine uninitialized so
    /// drop requests keep answering `NotInitialized`; the condition is
    /// logged rather than escalated.
    pub fn initialize(&self) {
        match std::fs::create_dir_all(&self.config.download_dir) {
            Ok(()) => {
                self.initialized.store(true, Ordering::SeqCst);
                debug!(
                    "transfer engine ready, download dir {}",
                    self.config.download_dir.display()
                );
            }
            Err(e) => {
                error!(
                    "download dir {} unavailable, transfers disabled: {e}",
                    self.config.download_dir.display()
                );
            }
        }
    }

    /// Whether [`TransferEngine::initialize`] has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Request an outbound multi-file drop.
    ///
    /// On acceptance the batch id (timestamp) is returned and the batch
    /// streams on a background task; progress arrives on the event channel.
    /// On rejection the wire status code explains why and no progress event
    /// is ever emitted for the request.
    ///
    /// # Errors
    ///
    /// Returns the [`DropStatus`] rejection code (never `Accepted`).
    pub fn request_drop(
        self: &Arc<Self>,
        paths: Vec<PathBuf>,
        target: DropTarget,
    ) -> std::result::Result<u64, DropStatus> {
        if !self.is_initialized() {
            return Err(DropStatus::NotInitialized);
        }
        if paths.is_empty() || !paths.iter().all(|p| p.is_file()) {
            return Err(DropStatus::InvalidParams);
        }
        if self.inbound_busy.load(Ordering::SeqCst) {
            return Err(DropStatus::ReceiveBusy);
        }
        if self
            .outbound_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DropStatus::SendBusy);
        }

        let timestamp = self.next_timestamp();
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags.insert(timestamp, Arc::clone(&cancel));

        info!(
            "drop accepted: {} file(s) -> {}:{} (session {timestamp})",
            paths.len(),
            target.ip,
            target.port
        );

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let result = engine
                .run_send(timestamp, &paths, &target, Arc::clone(&cancel))
                .await;
            if let Err(e) = result {
                let code = match e {
                    TransferError::Cancelled => ERROR_CANCELLED,
                    _ => ERROR_TRANSFER_FAILED,
                };
                warn!("send session {timestamp} failed: {e}");
                engine.fail_session(timestamp, code);
            }
            engine.cancel_flags.remove(&timestamp);
            engine.outbound_busy.store(false, Ordering::SeqCst);
        });

        Ok(timestamp)
    }

    async fn run_send(
        &self,
        timestamp: u64,
        paths: &[PathBuf],
        target: &DropTarget,
        cancel: Arc<AtomicBool>,
    ) -> Result<()> {
        let offer = wire::offer_from_paths(
            paths,
            timestamp,
            &self.config.device_id,
            &self.config.device_name,
        )?;
        let identity = LocalIdentity {
            ip: self.config.local_ip,
            id: self.config.device_id.clone(),
            device_name: self.config.device_name.clone(),
        };

        let mut stream = TcpStream::connect((target.ip, target.port)).await?;
        wire::send_batch(
            &mut stream,
            &offer,
            paths,
            &identity,
            self.config.chunk_size,
            &cancel,
            &mut |p| self.apply_progress(p),
        )
        .await
    }

    /// Fold a progress observation into the session table and re-emit it.
    ///
    /// The first observation for an unknown timestamp creates the session.
    /// Completion is detected here and announced exactly once.
    pub fn apply_progress(&self, progress: TransferProgress) {
        let now = now_ms();
        let completed = {
            let mut entry = self
                .sessions
                .entry(progress.timestamp)
                .or_insert_with(|| TransferSession::from_progress(&progress, now));
            let completed = entry.apply_progress(&progress, now);
            completed.then(|| entry.clone())
        };

        let _ = self.events.send(TransferEvent::Progress(progress));
        if let Some(session) = completed {
            info!("session {} complete", session.timestamp);
            let _ = self.events.send(TransferEvent::Completed(session));
        }
    }

    /// Best-effort cancellation of a session.
    ///
    /// Sets the session's cancel flag; the streaming task notices between
    /// chunks, tears the connection down, and surfaces an error-coded event
    /// (code 5520) for the same timestamp. There is no guaranteed immediate
    /// stop. Returns whether a cancellable session was found.
    pub fn cancel(&self, endpoint: &str, client_id: &str, timestamp: u64) -> bool {
        match self.cancel_flags.get(&timestamp) {
            Some(flag) => {
                info!("cancel requested for session {timestamp} ({endpoint}, client {client_id})");
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => {
                debug!("cancel for unknown or finished session {timestamp}");
                false
            }
        }
    }

    /// Attach a terminal error to a session and announce it.
    ///
    /// Creates a stub record when no progress was ever observed for the
    /// timestamp, so the failure is visible and deletable.
    pub fn fail_session(&self, timestamp: u64, code: u32) {
        let now = now_ms();
        let marked = {
            let mut entry = self.sessions.entry(timestamp).or_insert_with(|| {
                TransferSession::from_progress(
                    &TransferProgress {
                        sender_ip: self.config.local_ip,
                        sender_id: self.config.device_id.clone(),
                        sender_device_name: self.config.device_name.clone(),
                        current_file_name: String::new(),
                        received_file_count: 0,
                        total_file_count: 0,
                        current_file_size: 0,
                        total_size: 0,
                        received_size: 0,
                        timestamp,
                    },
                    now,
                )
            });
            entry.mark_error(code, now)
        };

        if marked {
            let _ = self.events.send(TransferEvent::Errored { timestamp, code });
        }
    }

    /// Snapshot of every session, newest first.
    #[must_use]
    pub fn sessions(&self) -> Vec<TransferSession> {
        let mut all: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all
    }

    /// Snapshot of one session.
    #[must_use]
    pub fn session(&self, timestamp: u64) -> Option<TransferSession> {
        self.sessions.get(&timestamp).map(|e| e.value().clone())
    }

    /// Remove a finished session record. Local only; the remote peer is not
    /// signalled.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or still in flight.
    pub fn delete_session(&self, timestamp: u64) -> Result<()> {
        let Some(entry) = self.sessions.get(&timestamp) else {
            return Err(TransferError::SessionNotFound(timestamp));
        };
        if !entry.is_terminal() {
            return Err(TransferError::SessionActive(timestamp));
        }
        drop(entry);
        self.sessions.remove(&timestamp);
        Ok(())
    }

    /// Path of the received file for a completed single-file session.
    ///
    /// Multi-file sessions are rejected outright; only single-file sessions
    /// may be opened.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown, still active, spans more
    /// than one file, or recorded no local path (send side).
    pub fn open_session_file(&self, timestamp: u64) -> Result<PathBuf> {
        let Some(entry) = self.sessions.get(&timestamp) else {
            return Err(TransferError::SessionNotFound(timestamp));
        };
        if entry.total_file_count > 1 {
            return Err(TransferError::MultiFileOpen);
        }
        if !entry.is_terminal() {
            return Err(TransferError::SessionActive(timestamp));
        }
        entry
            .first_file_path
            .clone()
            .ok_or(TransferError::SessionNotFound(timestamp))
    }

    /// Accept inbound batches on `listener` until it fails.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener itself breaks; per-connection
    /// failures are contained and logged.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("receiving batches on {}", listener.local_addr()?);
        loop {
            let (stream, peer) = listener.accept().await?;
            let engine = Arc::clone(&self);
            tokio::spawn(async move {
                let peer_ip = match peer.ip() {
                    std::net::IpAddr::V4(v4) => v4,
                    std::net::IpAddr::V6(_) => {
                        debug!("rejecting IPv6 peer {peer}");
                        return;
                    }
                };
                engine.handle_inbound(stream, peer_ip).await;
            });
        }
    }

    async fn handle_inbound(&self, mut stream: TcpStream, peer_ip: Ipv4Addr) {
        let offer: BatchOffer = match wire::read_frame(&mut stream).await {
            Ok(offer) => offer,
            Err(e) => {
                debug!("bad offer from {peer_ip}: {e}");
                return;
            }
        };

        if !self.is_initialized() {
            let _ = wire::decline(&mut stream, &offer, "not initialized").await;
            return;
        }
        if self.outbound_busy.load(Ordering::SeqCst) {
            let _ = wire::decline(&mut stream, &offer, "sending in progress").await;
            return;
        }
        if self
            .inbound_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let _ = wire::decline(&mut stream, &offer, "receiving in progress").await;
            return;
        }

        let timestamp = offer.timestamp;
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags.insert(timestamp, Arc::clone(&cancel));

        let result = wire::receive_accepted(
            &mut stream,
            &offer,
            peer_ip,
            &self.config.download_dir,
            self.config.chunk_size,
            &cancel,
            &mut |p| self.apply_progress(p),
            &mut |index, path| {
                // Record the landing path before the file's final progress
                // event, so a completed single-file session is openable as
                // soon as completion is observable.
                if index == 0 {
                    self.record_first_file(&offer, peer_ip, path);
                }
            },
        )
        .await;

        match result {
            Ok(_) => {}
            Err(e) => {
                let code = match e {
                    TransferError::Cancelled => ERROR_CANCELLED,
                    _ => ERROR_TRANSFER_FAILED,
                };
                warn!("receive session {timestamp} failed: {e}");
                self.fail_session(timestamp, code);
            }
        }

        self.cancel_flags.remove(&timestamp);
        self.inbound_busy.store(false, Ordering::SeqCst);
    }

    fn record_first_file(&self, offer: &BatchOffer, peer_ip: Ipv4Addr, path: &Path) {
        let now = now_ms();
        let mut entry = self.sessions.entry(offer.timestamp).or_insert_with(|| {
            TransferSession::from_progress(
                &TransferProgress {
                    sender_ip: peer_ip,
                    sender_id: offer.sender_id.clone(),
                    sender_device_name: offer.sender_name.clone(),
                    current_file_name: offer
                        .files
                        .first()
                        .map(|f| f.name.clone())
                        .unwrap_or_default(),
                    received_file_count: 0,
                    total_file_count: offer.files.len() as u32,
                    current_file_size: offer.files.first().map_or(0, |f| f.size),
                    total_size: offer.total_size(),
                    received_size: 0,
                    timestamp: offer.timestamp,
                },
                now,
            )
        });
        entry.first_file_path = Some(path.to_path_buf());
    }

    /// Next batch id: current wall-clock milliseconds, bumped past the last
    /// issued id so two rapid requests never collide.
    fn next_timestamp(&self) -> u64 {
        let now = now_ms();
        self.last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .map(|last| now.max(last + 1))
            .unwrap_or(now)
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
