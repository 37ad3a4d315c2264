//! Transports for talking to the extension-helper peer.
//!
//! The peer is a capability: it may be absent, it may come and go, and
//! nothing in the client is allowed to fail because of it. [`PeerBridge`]
//! is the one interface the sync layer sees; behind it live a null object
//! ([`NullPeerBridge`]), an in-memory pair for tests ([`PairBridge`]), and
//! the production Unix-socket host ([`SocketBridge`]).

mod error;
mod null;
mod pair;
mod socket;
mod traits;

pub use error::{BridgeError, BridgeResult};
pub use null::NullPeerBridge;
pub use pair::PairBridge;
pub use socket::SocketBridge;
pub use traits::{
    BridgeFuture, PeerBridge, PeerIncoming, DEFAULT_REQUEST_TIMEOUT, INBOUND_BUFFER,
};
