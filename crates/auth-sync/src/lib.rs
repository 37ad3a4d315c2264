//! Cross-context session synchronization.
//!
//! The [`SyncCoordinator`] keeps the local session store and the
//! extension-helper peer in agreement: it reconciles at startup (fresh
//! local wins, peer is the fallback), pushes local login/logout changes
//! fire-and-forget, and applies peer-initiated changes as they arrive.
//! Every change fans out on a broadcast bus as a [`SessionEvent`].
//!
//! The peer is always optional. Its absence, silence, or malformed
//! traffic degrades to "extension not reachable" and never surfaces as
//! an error to callers.

mod coordinator;
mod error;
mod state;

pub use coordinator::{SyncConfig, SyncCoordinator};
pub use error::{SyncError, SyncResult};
pub use state::{SessionEvent, SessionEventSource, SyncState, SyncStatus};
