//! Coordinator error type.

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by [`crate::SyncCoordinator`] handles.
///
/// Peer and store failures inside the worker are absorbed and logged, so
/// the only thing a caller can observe going wrong is the worker itself
/// being gone.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The worker task has stopped and its command channel is closed.
    #[error("sync coordinator is not running")]
    NotRunning,
}
