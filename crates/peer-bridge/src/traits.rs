//! The peer bridge capability interface.

use bridge_protocol::{BridgeResponse, Envelope, SyncMessage};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::error::BridgeResult;

/// Boxed future returned by [`PeerBridge`] methods.
pub type BridgeFuture<'a, T> = Pin<Box<dyn Future<Output = BridgeResult<T>> + Send + 'a>>;

/// Capacity of the inbound delivery channel handed out by `subscribe`.
pub const INBOUND_BUFFER: usize = 64;

/// Bounded wait on a peer response before the peer counts as absent.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// An envelope received from the peer.
///
/// When the message expects a response, `reply` carries a one-shot sender
/// the subscriber must answer on; dropping it unanswered is allowed and
/// leaves the peer to its own timeout.
pub struct PeerIncoming {
    pub envelope: Envelope,
    pub reply: Option<oneshot::Sender<BridgeResponse>>,
}

/// Message-passing access to the extension-helper peer.
///
/// Implementations differ only in transport; all of them uphold the same
/// contract: `notify` is fire-and-forget, `request` has a bounded wait,
/// and absence of the peer is an expected outcome, not a fault.
pub trait PeerBridge: Send + Sync {
    /// Whether a peer is reachable right now. A `false` answer is a
    /// capability probe result, never an error.
    fn available(&self) -> bool;

    /// Send a fire-and-forget message.
    fn notify(&self, message: SyncMessage) -> BridgeFuture<'_, ()>;

    /// Send a request message and wait (bounded) for the correlated
    /// response.
    fn request(&self, message: SyncMessage) -> BridgeFuture<'_, BridgeResponse>;

    /// Attach to the inbound message flow. The returned receiver yields
    /// every envelope the peer sends from this point on; attaching again
    /// replaces the previous subscriber.
    fn subscribe(&self) -> mpsc::Receiver<PeerIncoming>;
}
