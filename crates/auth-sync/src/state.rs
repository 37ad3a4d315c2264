//! Coordinator state machine and the events it broadcasts.

use session_model::SessionRecord;

/// Where the coordinator stands relative to the peer.
///
/// Transitions: `Uninitialized → Reconciling` when `initialize` runs,
/// `Reconciling → Synced` once reconciliation settles, `Synced ⇄ Diverged`
/// around each push or pull attempt. `Diverged` resolves back to `Synced`
/// when the attempt completes or times out, never to an error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Startup reconciliation has not run yet.
    Uninitialized,
    /// Startup reconciliation is in progress.
    Reconciling,
    /// Local store and peer agree as far as we know.
    Synced,
    /// A session change is being propagated.
    Diverged,
}

impl SyncState {
    /// Lowercase name for logs and status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::Reconciling => "reconciling",
            SyncState::Synced => "synced",
            SyncState::Diverged => "diverged",
        }
    }
}

/// Point-in-time snapshot returned by `sync_status`.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Whether a peer is reachable right now.
    pub peer_available: bool,
    /// RFC 3339 timestamp of the last successful push, if any.
    /// Observability only; correctness never depends on it.
    pub last_sync_at: Option<String>,
}

/// Where a session change originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventSource {
    /// An operation in this process (login, logout, refresh).
    Local,
    /// An inbound peer message (AUTH_SUCCESS or LOGOUT).
    Peer,
    /// Startup reconciliation settling the initial state.
    Reconciliation,
}

/// Broadcast once per session change.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    /// The session after the change; `None` means logged out.
    pub session: Option<SessionRecord>,
    pub source: SessionEventSource,
}
