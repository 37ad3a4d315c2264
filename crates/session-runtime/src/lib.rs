//! Reactive session state for a Knugget client process.
//!
//! [`SessionContext`] composes the backend service, the sync coordinator,
//! and the session store into one surface: imperative operations (login,
//! logout, refresh, profile updates) on one side, a watch channel of
//! [`SessionSnapshot`] values on the other. It owns the proactive refresh
//! timer and mirrors peer-initiated session changes into the snapshot.

mod context;
mod snapshot;

pub use context::{RuntimeConfig, SessionContext};
pub use snapshot::SessionSnapshot;
