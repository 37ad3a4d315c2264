//! Null-object bridge for peerless operation.

use bridge_protocol::{BridgeResponse, SyncMessage};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::BridgeError;
use crate::traits::{BridgeFuture, PeerBridge, PeerIncoming, INBOUND_BUFFER};

/// A bridge with no peer behind it.
///
/// Used when the transport is disabled: notifications vanish successfully,
/// requests report the peer absent, and the inbound flow never yields.
#[derive(Default)]
pub struct NullPeerBridge {
    // Held so the subscriber's receiver stays open (pending forever)
    // instead of closing immediately.
    keepalive: Mutex<Option<mpsc::Sender<PeerIncoming>>>,
}

impl NullPeerBridge {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeerBridge for NullPeerBridge {
    fn available(&self) -> bool {
        false
    }

    fn notify(&self, _message: SyncMessage) -> BridgeFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn request(&self, _message: SyncMessage) -> BridgeFuture<'_, BridgeResponse> {
        Box::pin(async { Err(BridgeError::PeerUnavailable) })
    }

    fn subscribe(&self) -> mpsc::Receiver<PeerIncoming> {
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        *self.keepalive.lock().unwrap() = Some(tx);
        rx
    }
}
