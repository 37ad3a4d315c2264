use thiserror::Error;

/// Errors from peer bridge transports.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No peer is connected to deliver to.
    #[error("peer is not connected")]
    PeerUnavailable,

    /// A peer is connected but did not respond within the bounded wait.
    #[error("timed out waiting for peer response")]
    Timeout,

    /// The connection carrying the request went away before a response.
    #[error("bridge connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// True for outcomes that mean the extension is not reachable right
    /// now. Callers degrade these silently instead of surfacing them.
    pub fn is_peer_absent(&self) -> bool {
        matches!(
            self,
            BridgeError::PeerUnavailable | BridgeError::Timeout | BridgeError::Closed
        )
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
