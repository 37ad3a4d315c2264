//! The session context: imperative auth operations plus reactive state.
//!
//! `SessionContext` sits on top of the backend service and the sync
//! coordinator. Operations go down through [`auth_backend::AuthService`]
//! (which owns the store writes) and fan out through
//! [`auth_sync::SyncCoordinator`] (which owns the peer); resulting state
//! comes back up as [`SessionSnapshot`] values on a watch channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use auth_backend::{AuthApiError, AuthApiResult, AuthService};
use auth_sync::{SessionEventSource, SyncCoordinator};
use bridge_protocol::LogoutReason;
use session_model::{SessionRecord, UserProfile};
use session_store::SessionStore;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::snapshot::SessionSnapshot;

/// Timer and error-display tuning.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Proactive refresh fires this long before token expiry.
    pub refresh_margin: Duration,
    /// Pacing between attempts after a refresh failure that kept the
    /// session (network trouble, not expiry).
    pub refresh_retry_interval: Duration,
    /// How long a login/signup error stays on display before
    /// auto-clearing.
    pub error_clear_delay: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(10 * 60),
            refresh_retry_interval: Duration::from_secs(60),
            error_clear_delay: Duration::from_secs(5),
        }
    }
}

pub struct SessionContext {
    service: Arc<AuthService>,
    coordinator: Arc<SyncCoordinator>,
    store: Arc<dyn SessionStore>,
    config: RuntimeConfig,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Bumped on every surfaced error so the auto-clear task can tell
    /// whether its error is still the one on display.
    error_seq: AtomicU64,
    /// Set when the outstanding error is network-class; an online
    /// transition then knows a retry is worthwhile.
    network_error_outstanding: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionContext {
    pub fn new(
        service: Arc<AuthService>,
        coordinator: Arc<SyncCoordinator>,
        store: Arc<dyn SessionStore>,
        config: RuntimeConfig,
    ) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Arc::new(Self {
            service,
            coordinator,
            store,
            config,
            snapshot_tx,
            error_seq: AtomicU64::new(0),
            network_error_outstanding: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the background tasks: the coordinator event listener and the
    /// proactive refresh timer.
    pub fn start(self: &Arc<Self>) {
        let listener = {
            let context = Arc::clone(self);
            let events = self.coordinator.subscribe();
            tokio::spawn(async move { context.listen_events(events).await })
        };
        let refresher = {
            let context = Arc::clone(self);
            let snapshots = self.snapshot_tx.subscribe();
            tokio::spawn(async move { context.refresh_loop(snapshots).await })
        };

        let mut tasks = self.tasks.lock().expect("lock poisoned");
        tasks.push(listener);
        tasks.push(refresher);
    }

    /// Abort the background tasks. Pending timers and listeners die with
    /// them; the snapshot keeps its last value.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().expect("lock poisoned").drain(..) {
            task.abort();
        }
    }

    /// Watch the session state. The receiver always holds the latest
    /// snapshot.
    pub fn snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The snapshot as of right now.
    pub fn current(&self) -> SessionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Run startup reconciliation, then validate whatever it adopted
    /// against the backend. Returns the session the process starts with.
    ///
    /// A backend rejection forces logout; a network failure keeps the
    /// adopted session and surfaces the error instead, so an offline
    /// start never throws a valid session away.
    pub async fn initialize(&self) -> Option<SessionRecord> {
        self.begin_loading();

        let adopted = match self.coordinator.initialize().await {
            Ok(adopted) => adopted,
            Err(err) => {
                warn!(error = %err, "Coordinator unavailable during initialization");
                self.error_seq.fetch_add(1, Ordering::SeqCst);
                self.snapshot_tx.send_modify(|snapshot| {
                    snapshot.is_loading = false;
                    snapshot.last_error =
                        Some("Failed to initialize authentication".to_string());
                });
                return None;
            }
        };

        let Some(record) = adopted else {
            self.set_logged_out();
            return None;
        };

        match self.service.get_current_user().await {
            Ok(_profile) => {
                // the validation round-trip may have rotated tokens
                let current = self.store.get().ok().flatten().unwrap_or(record);
                info!(user_id = %current.user.user_id, "Session validated");
                self.set_session(current.clone());
                Some(current)
            }
            Err(AuthApiError::SessionExpired) => {
                info!("Stored session rejected by backend");
                self.force_logout().await;
                None
            }
            Err(AuthApiError::NotAuthenticated) => {
                self.set_logged_out();
                None
            }
            Err(err) => {
                debug!(error = %err, "Could not validate session, keeping it");
                self.set_session(record.clone());
                self.set_error(&err);
                Some(record)
            }
        }
    }

    /// Sign in. On success the store is already written; the snapshot and
    /// the peer are updated here. On failure the error goes on display
    /// and auto-clears.
    pub async fn login(
        self: &Arc<Self>,
        email: &str,
        password: &str,
    ) -> AuthApiResult<SessionRecord> {
        self.begin_loading();
        match self.service.login(email, password).await {
            Ok(record) => {
                self.set_session(record.clone());
                self.notify_login(record.clone()).await;
                Ok(record)
            }
            Err(err) => {
                self.set_error_with_clear(&err);
                Err(err)
            }
        }
    }

    /// Create an account and sign in. Same choreography as [`login`].
    ///
    /// [`login`]: SessionContext::login
    pub async fn register(
        self: &Arc<Self>,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> AuthApiResult<SessionRecord> {
        self.begin_loading();
        match self.service.register(email, password, name).await {
            Ok(record) => {
                self.set_session(record.clone());
                self.notify_login(record.clone()).await;
                Ok(record)
            }
            Err(err) => {
                self.set_error_with_clear(&err);
                Err(err)
            }
        }
    }

    /// Sign out. Local state clears even when the server call fails.
    pub async fn logout(&self) -> AuthApiResult<()> {
        self.begin_loading();
        let result = self.service.logout().await;
        self.set_logged_out();
        if let Err(err) = self
            .coordinator
            .on_local_logout(LogoutReason::UserLogout)
            .await
        {
            debug!(error = %err, "Could not notify coordinator of logout");
        }
        result
    }

    /// Refresh the session with the stored refresh token. Expiry forces
    /// logout; any other failure keeps the session and surfaces the
    /// error.
    pub async fn refresh(&self) -> AuthApiResult<SessionRecord> {
        self.begin_loading();
        match self.service.refresh().await {
            Ok(record) => {
                self.set_session(record.clone());
                self.notify_login(record.clone()).await;
                Ok(record)
            }
            Err(AuthApiError::SessionExpired) => {
                self.force_logout().await;
                Err(AuthApiError::SessionExpired)
            }
            Err(err) => {
                self.set_error(&err);
                Err(err)
            }
        }
    }

    /// Change the display name optimistically: the snapshot shows the new
    /// name immediately and falls back to the stored record if the
    /// backend rejects it.
    pub async fn update_profile(&self, name: &str) -> AuthApiResult<UserProfile> {
        self.snapshot_tx.send_modify(|snapshot| {
            if let Some(session) = snapshot.session.as_mut() {
                session.user.display_name = Some(name.to_string());
            }
        });

        match self.service.update_profile(name).await {
            Ok(profile) => {
                if let Some(current) = self.store.get().ok().flatten() {
                    self.set_session(current);
                }
                Ok(profile)
            }
            Err(err) => {
                // the service already rolled the store back
                let rolled_back = self.store.get().ok().flatten();
                self.snapshot_tx.send_modify(|snapshot| {
                    snapshot.session = rolled_back;
                });
                self.set_error(&err);
                Err(err)
            }
        }
    }

    /// Start an email-based password reset.
    pub async fn forgot_password(&self, email: &str) -> AuthApiResult<()> {
        self.service.forgot_password(email).await
    }

    /// Complete a password reset with the emailed token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthApiResult<()> {
        self.service.reset_password(token, new_password).await
    }

    /// Call on an offline-to-online transition. If the outstanding error
    /// is network-class, clear it and attempt one refresh.
    pub async fn notify_online(&self) {
        if !self.network_error_outstanding.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Back online, retrying session refresh");
        self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.last_error.is_some() {
                snapshot.last_error = None;
                true
            } else {
                false
            }
        });
        let _ = self.refresh().await;
    }

    /// Apply peer-initiated session changes to the snapshot. Local and
    /// reconciliation events are skipped: the imperative methods already
    /// updated the snapshot on those paths.
    async fn listen_events(
        self: Arc<Self>,
        mut events: broadcast::Receiver<auth_sync::SessionEvent>,
    ) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if event.source != SessionEventSource::Peer {
                        continue;
                    }
                    match event.session {
                        Some(record) => {
                            info!(user_id = %record.user.user_id, "Signed in by peer");
                            self.set_session(record);
                        }
                        None => {
                            info!("Signed out by peer");
                            self.set_logged_out();
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session event listener lagged, resyncing from store");
                    let current = self.store.get().ok().flatten();
                    self.snapshot_tx.send_modify(|snapshot| {
                        snapshot.session = current;
                    });
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Keep a refresh scheduled a fixed margin before expiry. The timer
    /// is recomputed whenever the session changes, so a superseded
    /// deadline never fires against a stale session.
    async fn refresh_loop(self: Arc<Self>, mut snapshots: watch::Receiver<SessionSnapshot>) {
        loop {
            let expires_at_epoch_ms = {
                let snapshot = snapshots.borrow_and_update();
                snapshot
                    .session
                    .as_ref()
                    .map(|record| record.expires_at_epoch_ms)
            };

            let Some(expires_at_epoch_ms) = expires_at_epoch_ms else {
                // no session, nothing to schedule
                if snapshots.changed().await.is_err() {
                    break;
                }
                continue;
            };

            let fire_in = refresh_delay(expires_at_epoch_ms, self.config.refresh_margin);
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep(fire_in) => {}
            }

            debug!("Proactive refresh firing");
            if self.refresh().await.is_err() {
                // an error that kept the session would refire immediately;
                // pace the retries instead
                tokio::select! {
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.config.refresh_retry_interval) => {}
                }
            }
        }
    }

    /// Clear the session everywhere after expiry: store, snapshot, peer.
    /// Already-logged-out state makes this a no-op toward the peer.
    async fn force_logout(&self) {
        let store_had_record = self.store.get().map(|r| r.is_some()).unwrap_or(true);
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "Failed to clear session during forced logout");
        }

        self.error_seq.fetch_add(1, Ordering::SeqCst);
        self.network_error_outstanding.store(false, Ordering::SeqCst);
        let mut snapshot_had_session = false;
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot_had_session = snapshot.session.is_some();
            snapshot.session = None;
            snapshot.is_loading = false;
            snapshot.last_error = Some("Session expired. Please sign in again.".to_string());
        });

        if !store_had_record && !snapshot_had_session {
            debug!("Forced logout requested while already logged out");
            return;
        }

        if let Err(err) = self
            .coordinator
            .on_local_logout(LogoutReason::SessionExpired)
            .await
        {
            debug!(error = %err, "Could not notify coordinator of forced logout");
        }
        info!("Forced logout: session expired");
    }

    async fn notify_login(&self, record: SessionRecord) {
        if let Err(err) = self.coordinator.on_local_login(record).await {
            debug!(error = %err, "Could not notify coordinator of login");
        }
    }

    fn begin_loading(&self) {
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.is_loading = true;
            snapshot.last_error = None;
        });
    }

    fn set_session(&self, record: SessionRecord) {
        self.network_error_outstanding.store(false, Ordering::SeqCst);
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.session = Some(record);
            snapshot.is_loading = false;
            snapshot.last_error = None;
        });
    }

    fn set_logged_out(&self) {
        self.network_error_outstanding.store(false, Ordering::SeqCst);
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.session = None;
            snapshot.is_loading = false;
            snapshot.last_error = None;
        });
    }

    fn set_error(&self, err: &AuthApiError) {
        self.error_seq.fetch_add(1, Ordering::SeqCst);
        self.network_error_outstanding
            .store(err.is_retryable(), Ordering::SeqCst);
        let message = err.to_string();
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.is_loading = false;
            snapshot.last_error = Some(message);
        });
    }

    /// [`set_error`] plus scheduled auto-clear, unless a newer error has
    /// replaced this one by then.
    ///
    /// [`set_error`]: SessionContext::set_error
    fn set_error_with_clear(self: &Arc<Self>, err: &AuthApiError) {
        self.set_error(err);
        let seq = self.error_seq.load(Ordering::SeqCst);
        let context = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(context.config.error_clear_delay).await;
            if context.error_seq.load(Ordering::SeqCst) != seq {
                return;
            }
            context.snapshot_tx.send_if_modified(|snapshot| {
                if snapshot.last_error.is_some() {
                    snapshot.last_error = None;
                    true
                } else {
                    false
                }
            });
        });
    }
}

fn refresh_delay(expires_at_epoch_ms: i64, margin: Duration) -> Duration {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0);
    let fire_at = expires_at_epoch_ms - margin.as_millis() as i64;
    if fire_at <= now_ms {
        Duration::ZERO
    } else {
        Duration::from_millis((fire_at - now_ms) as u64)
    }
}
