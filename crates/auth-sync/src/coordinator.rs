//! The sync coordinator worker.
//!
//! One task owns the whole peer relationship: it reconciles session state
//! at startup, pushes local auth changes to the peer, applies peer-initiated
//! changes to the local store, and answers the peer's queries. Local
//! mutations and inbound peer messages land in one select loop and are
//! processed in receipt order; whichever side most recently observed a
//! login or logout wins.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_protocol::{
    error_codes, now_iso, AuthSuccessPayload, BridgeResponse, CheckAuthResult, LogoutPayload,
    LogoutReason, SyncAck, SyncMessage,
};
use peer_bridge::{PeerBridge, PeerIncoming};
use session_model::SessionRecord;
use session_store::SessionStore;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::state::{SessionEvent, SessionEventSource, SyncState, SyncStatus};

/// Tuning knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bounded wait on any single peer interaction. A peer that does not
    /// answer within this window counts as absent.
    pub peer_timeout: Duration,
    /// Capacity of the command channel feeding the worker.
    pub command_buffer: usize,
    /// Capacity of the session event bus.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            peer_timeout: Duration::from_secs(5),
            command_buffer: 32,
            event_capacity: 32,
        }
    }
}

enum SyncCommand {
    Initialize {
        done: oneshot::Sender<Option<SessionRecord>>,
    },
    LocalLogin {
        record: SessionRecord,
    },
    LocalLogout {
        reason: LogoutReason,
    },
    Status {
        reply: oneshot::Sender<SyncStatus>,
    },
    Shutdown,
}

/// Handle to the coordinator worker task.
///
/// Construct with [`SyncCoordinator::new`], then call [`start`] once to
/// spawn the worker and [`initialize`] to run startup reconciliation.
/// All other methods enqueue work for the worker and return quickly.
///
/// [`start`]: SyncCoordinator::start
/// [`initialize`]: SyncCoordinator::initialize
pub struct SyncCoordinator {
    commands: mpsc::Sender<SyncCommand>,
    receiver: Mutex<Option<mpsc::Receiver<SyncCommand>>>,
    events: broadcast::Sender<SessionEvent>,
    config: SyncConfig,
    store: Arc<dyn SessionStore>,
    bridge: Arc<dyn PeerBridge>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn SessionStore>,
        bridge: Arc<dyn PeerBridge>,
    ) -> Self {
        let (commands, receiver) = mpsc::channel(config.command_buffer);
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            commands,
            receiver: Mutex::new(Some(receiver)),
            events,
            config,
            store,
            bridge,
        }
    }

    /// Spawn the worker task and attach it to the bridge's inbound flow.
    ///
    /// Panics if called more than once.
    pub fn start(&self) {
        let receiver = self
            .receiver
            .lock()
            .expect("lock poisoned")
            .take()
            .expect("SyncCoordinator already started");
        let inbound = self.bridge.subscribe();

        let worker = Worker {
            store: Arc::clone(&self.store),
            bridge: Arc::clone(&self.bridge),
            events: self.events.clone(),
            config: self.config.clone(),
            state: SyncState::Uninitialized,
            reconciled: false,
            last_sync_at: None,
        };
        tokio::spawn(worker.run(receiver, inbound));
    }

    /// Run startup reconciliation and return the session that became
    /// authoritative, if any.
    ///
    /// Local wins when fresh; the peer is consulted only as a fallback,
    /// and a silent peer settles on logged out. Calling this again after
    /// reconciliation has run returns the current store contents without
    /// contacting the peer.
    pub async fn initialize(&self) -> SyncResult<Option<SessionRecord>> {
        let (done, rx) = oneshot::channel();
        self.send(SyncCommand::Initialize { done }).await?;
        rx.await.map_err(|_| SyncError::NotRunning)
    }

    /// Tell the coordinator that a login, signup, or refresh persisted
    /// `record`. The caller has already written the store; this emits the
    /// session event and pushes AUTH_SUCCESS to the peer fire-and-forget.
    pub async fn on_local_login(&self, record: SessionRecord) -> SyncResult<()> {
        self.send(SyncCommand::LocalLogin { record }).await
    }

    /// Tell the coordinator the local session ended. The caller has
    /// already cleared the store; this emits the session event and pushes
    /// LOGOUT with `reason` to the peer fire-and-forget.
    pub async fn on_local_logout(&self, reason: LogoutReason) -> SyncResult<()> {
        self.send(SyncCommand::LocalLogout { reason }).await
    }

    /// Subscribe to session change events. Each subscriber sees every
    /// event emitted after the point of subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current state, peer availability, and last successful push time.
    pub async fn sync_status(&self) -> SyncResult<SyncStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(SyncCommand::Status { reply }).await?;
        rx.await.map_err(|_| SyncError::NotRunning)
    }

    /// Stop the worker. Commands already queued ahead of the shutdown are
    /// still processed; later ones report [`SyncError::NotRunning`].
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SyncCommand::Shutdown).await;
    }

    async fn send(&self, command: SyncCommand) -> SyncResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::NotRunning)
    }
}

/// State owned by the worker task.
struct Worker {
    store: Arc<dyn SessionStore>,
    bridge: Arc<dyn PeerBridge>,
    events: broadcast::Sender<SessionEvent>,
    config: SyncConfig,
    state: SyncState,
    reconciled: bool,
    last_sync_at: Option<String>,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SyncCommand>,
        mut inbound: mpsc::Receiver<PeerIncoming>,
    ) {
        debug!("Sync worker started");
        let mut inbound_open = true;

        loop {
            tokio::select! {
                maybe_cmd = commands.recv() => {
                    match maybe_cmd {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                maybe_incoming = inbound.recv(), if inbound_open => {
                    match maybe_incoming {
                        Some(incoming) => self.handle_inbound(incoming).await,
                        None => {
                            debug!("Bridge inbound channel closed");
                            inbound_open = false;
                        }
                    }
                }
            }
        }
        debug!("Sync worker stopped");
    }

    /// Returns `false` when the worker should stop.
    async fn handle_command(&mut self, command: SyncCommand) -> bool {
        match command {
            SyncCommand::Initialize { done } => {
                if self.reconciled {
                    debug!("Reconciliation already ran");
                    let _ = done.send(self.store.get().ok().flatten());
                    return true;
                }
                self.reconciled = true;
                self.state = SyncState::Reconciling;
                info!("Reconciling session state");
                let adopted = self.reconcile().await;
                self.state = SyncState::Synced;
                self.emit(adopted.clone(), SessionEventSource::Reconciliation);
                let _ = done.send(adopted);
            }
            SyncCommand::LocalLogin { record } => {
                self.state = SyncState::Diverged;
                self.emit(Some(record.clone()), SessionEventSource::Local);
                let message = SyncMessage::AuthSuccess(AuthSuccessPayload::from_record(&record));
                self.push(message).await;
                self.state = SyncState::Synced;
            }
            SyncCommand::LocalLogout { reason } => {
                self.state = SyncState::Diverged;
                self.emit(None, SessionEventSource::Local);
                self.push(SyncMessage::Logout(LogoutPayload::new(reason))).await;
                self.state = SyncState::Synced;
            }
            SyncCommand::Status { reply } => {
                let _ = reply.send(SyncStatus {
                    state: self.state,
                    peer_available: self.bridge.available(),
                    last_sync_at: self.last_sync_at.clone(),
                });
            }
            SyncCommand::Shutdown => return false,
        }
        true
    }

    /// Startup reconciliation: fresh local wins, peer is the fallback,
    /// silence settles on logged out.
    async fn reconcile(&mut self) -> Option<SessionRecord> {
        match self.store.get() {
            Ok(Some(record)) if record.is_valid() => {
                info!(user_id = %record.user.user_id, "Adopted fresh local session");
                return Some(record);
            }
            Ok(Some(_)) => debug!("Local session stale, consulting peer"),
            Ok(None) => debug!("No local session, consulting peer"),
            Err(err) => warn!(error = %err, "Could not read local session, consulting peer"),
        }

        if let Some(record) = self.query_peer_session().await {
            if let Err(err) = self.store.put(&record) {
                warn!(error = %err, "Failed to persist session adopted from peer");
            }
            info!(user_id = %record.user.user_id, "Adopted session from peer");
            return Some(record);
        }

        if let Err(err) = self.store.clear() {
            warn!(error = %err, "Failed to clear session during reconciliation");
        }
        info!("Reconciliation settled on logged out");
        None
    }

    /// Ask the peer for its session. Any failure, malformed reply, or
    /// stale record collapses to `None`.
    async fn query_peer_session(&self) -> Option<SessionRecord> {
        let request = self.bridge.request(SyncMessage::check_auth());
        let response = match tokio::time::timeout(self.config.peer_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                debug!(error = %err, "Peer not reachable during reconciliation");
                return None;
            }
            Err(_) => {
                debug!("Peer did not answer CHECK_AUTH in time");
                return None;
            }
        };

        let result: CheckAuthResult = match response.result_as() {
            Ok(result) => result,
            Err(err) => {
                debug!(error = %err, "Malformed CHECK_AUTH reply from peer");
                return None;
            }
        };
        let record = result.session?;
        if !record.is_valid() {
            debug!("Peer session stale, ignoring");
            return None;
        }
        if let Err(err) = record.validate() {
            debug!(error = %err, "Peer session failed validation, ignoring");
            return None;
        }
        Some(record)
    }

    async fn handle_inbound(&mut self, incoming: PeerIncoming) {
        let PeerIncoming { envelope, reply } = incoming;
        debug!(kind = envelope.message.kind(), id = %envelope.id, "Inbound peer message");

        self.state = SyncState::Diverged;
        match envelope.message {
            SyncMessage::AuthSuccess(payload) => self.apply_peer_login(payload),
            SyncMessage::Logout(payload) => self.apply_peer_logout(&payload),
            SyncMessage::CheckAuth(_) => {
                let result = self.check_auth_reply();
                respond_ok(reply, &envelope.id, &result);
            }
            SyncMessage::SyncRequest(_) => {
                self.repush().await;
                respond_ok(reply, &envelope.id, &SyncAck { success: true });
            }
        }
        self.state = SyncState::Synced;
    }

    /// AUTH_SUCCESS pull: a valid peer record overwrites the local store
    /// unconditionally. Peer-initiated login wins even over an existing
    /// local session; the most recent authentication event reflects user
    /// intent.
    fn apply_peer_login(&mut self, payload: AuthSuccessPayload) {
        let record = payload.into_record();
        if let Err(err) = record.validate() {
            debug!(error = %err, "Ignoring malformed AUTH_SUCCESS from peer");
            return;
        }
        if !record.is_valid() {
            debug!("Ignoring expired AUTH_SUCCESS from peer");
            return;
        }

        if let Err(err) = self.store.put(&record) {
            warn!(error = %err, "Failed to persist session from peer");
        }
        info!(user_id = %record.user.user_id, "Adopted peer login");
        self.emit(Some(record), SessionEventSource::Peer);
    }

    /// LOGOUT pull: clear unconditionally.
    fn apply_peer_logout(&mut self, payload: &LogoutPayload) {
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "Failed to clear session on peer logout");
        }
        info!(reason = ?payload.reason, "Peer logout applied");
        self.emit(None, SessionEventSource::Peer);
    }

    /// CHECK_AUTH pull: report current store state without mutating it.
    fn check_auth_reply(&self) -> CheckAuthResult {
        match self.store.get() {
            Ok(Some(record)) => CheckAuthResult::for_session(&record),
            Ok(None) => CheckAuthResult::logged_out(),
            Err(err) => {
                warn!(error = %err, "Could not read store for CHECK_AUTH reply");
                CheckAuthResult::logged_out()
            }
        }
    }

    /// SYNC_REQUEST pull: re-run the push from current store contents.
    /// Nothing is sent when the store is empty or stale.
    async fn repush(&mut self) {
        match self.store.get() {
            Ok(Some(record)) if record.is_valid() => {
                let message = SyncMessage::AuthSuccess(AuthSuccessPayload::from_record(&record));
                self.push(message).await;
            }
            Ok(Some(_)) => debug!("Skipping re-push of stale session"),
            Ok(None) => debug!("Nothing to re-push"),
            Err(err) => warn!(error = %err, "Could not read store for re-push"),
        }
    }

    /// Fire-and-forget push, bounded by the peer timeout. Failures are
    /// logged at debug level and never escalated.
    async fn push(&mut self, message: SyncMessage) {
        let kind = message.kind();
        match tokio::time::timeout(self.config.peer_timeout, self.bridge.notify(message)).await {
            Ok(Ok(())) => {
                self.last_sync_at = Some(now_iso());
                debug!(kind, "Pushed session change to peer");
            }
            Ok(Err(err)) => debug!(kind, error = %err, "Peer push failed"),
            Err(_) => debug!(kind, "Peer push timed out"),
        }
    }

    fn emit(&self, session: Option<SessionRecord>, source: SessionEventSource) {
        // send fails only when nobody is subscribed
        let _ = self.events.send(SessionEvent { session, source });
    }
}

/// Serialize `result` and answer on the reply channel, if one is attached.
fn respond_ok<T: serde::Serialize>(
    reply: Option<oneshot::Sender<BridgeResponse>>,
    id: &str,
    result: &T,
) {
    let Some(tx) = reply else {
        return;
    };
    let response = match serde_json::to_value(result) {
        Ok(value) => BridgeResponse::success(id, value),
        Err(err) => {
            warn!(error = %err, "Could not serialize bridge reply");
            BridgeResponse::error(id, error_codes::INTERNAL_ERROR, "reply serialization failed")
        }
    };
    if tx.send(response).is_err() {
        debug!(id, "Reply channel closed before response was sent");
    }
}
