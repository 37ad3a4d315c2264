//! Reactive session state.

use session_model::SessionRecord;

/// What the rendering layer sees: the current session plus transient
/// loading and error state. Published through a `tokio::sync::watch`
/// channel, so readers always observe the latest value.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current session; `None` means logged out.
    pub session: Option<SessionRecord>,
    /// True while initialization or an auth operation is in flight.
    pub is_loading: bool,
    /// Most recent user-visible error, if any.
    pub last_error: Option<String>,
}

impl Default for SessionSnapshot {
    /// The boot state: loading, no session, no error.
    fn default() -> Self {
        Self {
            session: None,
            is_loading: true,
            last_error: None,
        }
    }
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}
