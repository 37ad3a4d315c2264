//! In-memory duplex bridge.

use bridge_protocol::{BridgeResponse, Envelope, SyncMessage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::error::{BridgeError, BridgeResult};
use crate::traits::{
    BridgeFuture, PeerBridge, PeerIncoming, DEFAULT_REQUEST_TIMEOUT, INBOUND_BUFFER,
};

type SubscriberSlot = Arc<Mutex<Option<mpsc::Sender<PeerIncoming>>>>;

/// One half of an in-process bridge pair.
///
/// Whatever one half notifies or requests arrives on the other half's
/// subscription, which makes a scripted "extension" a few lines of test
/// code. Availability mirrors whether the other half has subscribed.
pub struct PairBridge {
    mine: SubscriberSlot,
    remote: SubscriberSlot,
    request_timeout: Duration,
}

impl PairBridge {
    /// Create both halves of a connected pair.
    pub fn pair() -> (PairBridge, PairBridge) {
        let a: SubscriberSlot = Arc::new(Mutex::new(None));
        let b: SubscriberSlot = Arc::new(Mutex::new(None));
        (
            PairBridge {
                mine: Arc::clone(&a),
                remote: Arc::clone(&b),
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            },
            PairBridge {
                mine: b,
                remote: a,
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            },
        )
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn remote_sender(&self) -> Option<mpsc::Sender<PeerIncoming>> {
        self.remote
            .lock()
            .unwrap()
            .as_ref()
            .filter(|tx| !tx.is_closed())
            .cloned()
    }

    fn deliver(&self, incoming: PeerIncoming) -> BridgeResult<()> {
        let tx = self.remote_sender().ok_or(BridgeError::PeerUnavailable)?;
        tx.try_send(incoming)
            .map_err(|_| BridgeError::PeerUnavailable)
    }
}

impl PeerBridge for PairBridge {
    fn available(&self) -> bool {
        self.remote_sender().is_some()
    }

    fn notify(&self, message: SyncMessage) -> BridgeFuture<'_, ()> {
        Box::pin(async move {
            self.deliver(PeerIncoming {
                envelope: Envelope::new(message),
                reply: None,
            })
        })
    }

    fn request(&self, message: SyncMessage) -> BridgeFuture<'_, BridgeResponse> {
        Box::pin(async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.deliver(PeerIncoming {
                envelope: Envelope::new(message),
                reply: Some(reply_tx),
            })?;
            match tokio::time::timeout(self.request_timeout, reply_rx).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(_)) => Err(BridgeError::Closed),
                Err(_) => Err(BridgeError::Timeout),
            }
        })
    }

    fn subscribe(&self) -> mpsc::Receiver<PeerIncoming> {
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        *self.mine.lock().unwrap() = Some(tx);
        rx
    }
}
