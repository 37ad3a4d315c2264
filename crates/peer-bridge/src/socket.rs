//! Unix-socket bridge host.
//!
//! The client hosts the socket; extension-helper peers connect to it and
//! exchange newline-delimited JSON. One frame per line: an [`Envelope`]
//! carries a message from the peer, a [`BridgeResponse`] answers one of
//! ours. Fire-and-forget messages go to every connected peer; requests go
//! to every peer and the first response with the matching envelope id wins.

use bridge_protocol::{error_codes, BridgeResponse, Envelope, SyncMessage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::traits::{
    BridgeFuture, PeerBridge, PeerIncoming, DEFAULT_REQUEST_TIMEOUT, INBOUND_BUFFER,
};

type ConnectionMap = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>>;
type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<BridgeResponse>>>>;
type SubscriberSlot = Arc<Mutex<Option<mpsc::Sender<PeerIncoming>>>>;

/// Bridge transport that hosts a Unix domain socket for peer processes.
pub struct SocketBridge {
    socket_path: PathBuf,
    request_timeout: Duration,
    connections: ConnectionMap,
    pending: PendingMap,
    subscriber: SubscriberSlot,
    shutdown_tx: broadcast::Sender<()>,
    next_conn_id: AtomicU64,
}

impl SocketBridge {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            socket_path: socket_path.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connections: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            subscriber: Arc::new(Mutex::new(None)),
            shutdown_tx,
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop the accept loop and let `run` return.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Bind the socket and accept peer connections until shutdown.
    pub async fn run(&self) -> BridgeResult<()> {
        // A stale socket file from a previous process blocks bind.
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "Bridge socket listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
                            let connections = Arc::clone(&self.connections);
                            let pending = Arc::clone(&self.pending);
                            let subscriber = Arc::clone(&self.subscriber);
                            tokio::spawn(async move {
                                handle_connection(conn_id, stream, connections, pending, subscriber)
                                    .await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Accept error");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Bridge socket shutting down");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }

    /// Queue a line on every live connection; returns how many took it.
    fn broadcast_line(&self, line: &str) -> usize {
        let mut connections = self.connections.lock().unwrap();
        let mut dead = Vec::new();
        let mut delivered = 0;
        for (conn_id, tx) in connections.iter() {
            if tx.send(line.to_string()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*conn_id);
            }
        }
        for conn_id in dead {
            connections.remove(&conn_id);
        }
        delivered
    }
}

impl PeerBridge for SocketBridge {
    fn available(&self) -> bool {
        !self.connections.lock().unwrap().is_empty()
    }

    fn notify(&self, message: SyncMessage) -> BridgeFuture<'_, ()> {
        Box::pin(async move {
            let envelope = Envelope::new(message);
            let line = envelope.to_json()?;
            if self.broadcast_line(&line) == 0 {
                return Err(BridgeError::PeerUnavailable);
            }
            debug!(kind = envelope.message.kind(), id = %envelope.id, "Notified peer");
            Ok(())
        })
    }

    fn request(&self, message: SyncMessage) -> BridgeFuture<'_, BridgeResponse> {
        Box::pin(async move {
            let envelope = Envelope::new(message);
            let line = envelope.to_json()?;

            let (reply_tx, reply_rx) = oneshot::channel();
            self.pending
                .lock()
                .unwrap()
                .insert(envelope.id.clone(), reply_tx);

            if self.broadcast_line(&line) == 0 {
                self.pending.lock().unwrap().remove(&envelope.id);
                return Err(BridgeError::PeerUnavailable);
            }

            match tokio::time::timeout(self.request_timeout, reply_rx).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(_)) => {
                    self.pending.lock().unwrap().remove(&envelope.id);
                    Err(BridgeError::Closed)
                }
                Err(_) => {
                    self.pending.lock().unwrap().remove(&envelope.id);
                    debug!(kind = envelope.message.kind(), "Peer request timed out");
                    Err(BridgeError::Timeout)
                }
            }
        })
    }

    fn subscribe(&self) -> mpsc::Receiver<PeerIncoming> {
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        *self.subscriber.lock().unwrap() = Some(tx);
        rx
    }
}

/// Handle a single peer connection: writer task fed by a queue, reader
/// loop dispatching one frame per line.
async fn handle_connection(
    conn_id: u64,
    stream: UnixStream,
    connections: ConnectionMap,
    pending: PendingMap,
    subscriber: SubscriberSlot,
) {
    let (reader, mut writer) = stream.into_split();
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    connections.lock().unwrap().insert(conn_id, line_tx.clone());
    debug!(conn_id, "Peer connected");

    let writer_task = tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!(conn_id, "Peer disconnected");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                dispatch_line(conn_id, trimmed, &pending, &subscriber, &line_tx);
            }
            Err(e) => {
                debug!(conn_id, error = %e, "Read error on bridge connection");
                break;
            }
        }
    }

    connections.lock().unwrap().remove(&conn_id);
    writer_task.abort();
}

/// Classify one inbound line. Envelopes are tried first: a response frame
/// never carries a `type` field, so it cannot parse as an envelope, while
/// the reverse would succeed spuriously.
fn dispatch_line(
    conn_id: u64,
    line: &str,
    pending: &PendingMap,
    subscriber: &SubscriberSlot,
    line_tx: &mpsc::UnboundedSender<String>,
) {
    if let Ok(envelope) = Envelope::from_json(line) {
        deliver_inbound(conn_id, envelope, subscriber, line_tx);
        return;
    }

    if let Ok(response) = BridgeResponse::from_json(line) {
        let waiter = pending.lock().unwrap().remove(&response.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => {
                debug!(conn_id, id = %response.id, "Response with no pending request");
            }
        }
        return;
    }

    warn!(conn_id, "Unparseable bridge frame; message ignored");
    let reply = BridgeResponse::error("", error_codes::PARSE_ERROR, "unparseable frame");
    if let Ok(json) = reply.to_json() {
        let _ = line_tx.send(json);
    }
}

/// Hand an inbound envelope to the subscriber, wiring a reply path back to
/// the connection it arrived on when the message expects a response.
fn deliver_inbound(
    conn_id: u64,
    envelope: Envelope,
    subscriber: &SubscriberSlot,
    line_tx: &mpsc::UnboundedSender<String>,
) {
    let maybe_tx = subscriber
        .lock()
        .unwrap()
        .as_ref()
        .filter(|tx| !tx.is_closed())
        .cloned();

    let tx = match maybe_tx {
        Some(tx) => tx,
        None => {
            debug!(
                conn_id,
                kind = envelope.message.kind(),
                "Inbound message dropped; no subscriber"
            );
            if envelope.message.expects_response() {
                let reply = BridgeResponse::error(
                    &envelope.id,
                    error_codes::INTERNAL_ERROR,
                    "no message handler attached",
                );
                if let Ok(json) = reply.to_json() {
                    let _ = line_tx.send(json);
                }
            }
            return;
        }
    };

    let incoming = if envelope.message.expects_response() {
        let (reply_tx, reply_rx) = oneshot::channel::<BridgeResponse>();
        let id = envelope.id.clone();
        let line_tx = line_tx.clone();
        tokio::spawn(async move {
            match reply_rx.await {
                Ok(response) => {
                    if let Ok(json) = response.to_json() {
                        let _ = line_tx.send(json);
                    }
                }
                Err(_) => {
                    debug!(id = %id, "Subscriber dropped the reply for a peer request");
                }
            }
        });
        PeerIncoming {
            envelope,
            reply: Some(reply_tx),
        }
    } else {
        PeerIncoming {
            envelope,
            reply: None,
        }
    };

    if let Err(e) = tx.try_send(incoming) {
        warn!(conn_id, error = %e, "Inbound queue full; dropping peer message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_protocol::{CheckAuthResult, LogoutPayload, LogoutReason};

    async fn started_bridge(path: &Path) -> Arc<SocketBridge> {
        let bridge = Arc::new(SocketBridge::new(path));
        let runner = Arc::clone(&bridge);
        tokio::spawn(async move {
            let _ = runner.run().await;
        });
        for _ in 0..100 {
            if path.exists() {
                return bridge;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("bridge socket never appeared");
    }

    async fn wait_available(bridge: &SocketBridge) {
        for _ in 0..100 {
            if bridge.available() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("bridge never saw the peer connect");
    }

    #[tokio::test]
    async fn no_peer_means_unavailable_and_notify_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = started_bridge(&dir.path().join("bridge.sock")).await;

        assert!(!bridge.available());
        let err = bridge
            .notify(SyncMessage::Logout(LogoutPayload::new(
                LogoutReason::UserLogout,
            )))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::PeerUnavailable));

        bridge.shutdown();
    }

    #[tokio::test]
    async fn connected_peer_receives_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let bridge = started_bridge(&path).await;

        let stream = UnixStream::connect(&path).await.unwrap();
        wait_available(&bridge).await;

        bridge
            .notify(SyncMessage::Logout(LogoutPayload::new(
                LogoutReason::SessionExpired,
            )))
            .await
            .unwrap();

        let mut lines = BufReader::new(stream).lines();
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let envelope = Envelope::from_json(&line).unwrap();
        assert_eq!(envelope.message.kind(), "LOGOUT");

        bridge.shutdown();
    }

    #[tokio::test]
    async fn request_is_answered_by_peer_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let bridge = started_bridge(&path).await;

        let stream = UnixStream::connect(&path).await.unwrap();
        wait_available(&bridge).await;

        let peer = tokio::spawn(async move {
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let envelope = Envelope::from_json(&line).unwrap();
            assert_eq!(envelope.message.kind(), "CHECK_AUTH");

            let reply = BridgeResponse::success(
                &envelope.id,
                serde_json::to_value(CheckAuthResult::logged_out()).unwrap(),
            );
            let json = reply.to_json().unwrap();
            write_half.write_all(json.as_bytes()).await.unwrap();
            write_half.write_all(b"\n").await.unwrap();
            write_half.flush().await.unwrap();
        });

        let response = bridge.request(SyncMessage::check_auth()).await.unwrap();
        assert!(response.is_success());
        let result: CheckAuthResult = response.result_as().unwrap();
        assert!(!result.is_authenticated);

        peer.await.unwrap();
        bridge.shutdown();
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let bridge = Arc::new(
            SocketBridge::new(&path).with_request_timeout(Duration::from_millis(100)),
        );
        let runner = Arc::clone(&bridge);
        tokio::spawn(async move {
            let _ = runner.run().await;
        });
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let _stream = UnixStream::connect(&path).await.unwrap();
        wait_available(&bridge).await;

        let err = bridge.request(SyncMessage::check_auth()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout));

        bridge.shutdown();
    }

    #[tokio::test]
    async fn inbound_request_reaches_subscriber_and_reply_flows_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let bridge = started_bridge(&path).await;
        let mut inbound = bridge.subscribe();

        let stream = UnixStream::connect(&path).await.unwrap();
        wait_available(&bridge).await;
        let (read_half, mut write_half) = stream.into_split();

        let envelope = Envelope::new(SyncMessage::check_auth());
        let sent_id = envelope.id.clone();
        write_half
            .write_all(envelope.to_json().unwrap().as_bytes())
            .await
            .unwrap();
        write_half.write_all(b"\n").await.unwrap();
        write_half.flush().await.unwrap();

        let incoming = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(incoming.envelope.id, sent_id);
        incoming
            .reply
            .unwrap()
            .send(BridgeResponse::success(
                &sent_id,
                serde_json::json!({ "isAuthenticated": false, "timestampIso": "now" }),
            ))
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let response = BridgeResponse::from_json(&line).unwrap();
        assert_eq!(response.id, sent_id);
        assert!(response.is_success());

        bridge.shutdown();
    }

    #[tokio::test]
    async fn malformed_line_is_ignored_and_connection_survives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let bridge = started_bridge(&path).await;
        let mut inbound = bridge.subscribe();

        let stream = UnixStream::connect(&path).await.unwrap();
        wait_available(&bridge).await;
        let (read_half, mut write_half) = stream.into_split();

        write_half.write_all(b"this is not json\n").await.unwrap();
        write_half.flush().await.unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let response = BridgeResponse::from_json(&line).unwrap();
        assert!(!response.is_success());

        // The same connection still carries well-formed traffic.
        let envelope = Envelope::new(SyncMessage::Logout(LogoutPayload::new(
            LogoutReason::UserLogout,
        )));
        write_half
            .write_all(envelope.to_json().unwrap().as_bytes())
            .await
            .unwrap();
        write_half.write_all(b"\n").await.unwrap();
        write_half.flush().await.unwrap();

        let incoming = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(incoming.envelope.message.kind(), "LOGOUT");

        bridge.shutdown();
    }
}
