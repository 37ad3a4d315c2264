//! Foreground client: hosts the extension bridge socket, reconciles the
//! session at startup, and keeps it fresh until shutdown.

use super::ClientSetup;
use anyhow::{Context, Result};
use auth_sync::{SyncConfig, SyncCoordinator};
use peer_bridge::{NullPeerBridge, PeerBridge, SocketBridge};
use session_runtime::{RuntimeConfig, SessionContext};
use session_store::SessionStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub async fn run(setup: ClientSetup) -> Result<()> {
    let store = Arc::clone(&setup.store) as Arc<dyn SessionStore>;

    // A disabled bridge degrades to the null object; everything else
    // keeps working without a peer.
    let (bridge, socket) = if setup.config.bridge_enabled {
        let socket = Arc::new(SocketBridge::new(setup.paths.bridge_socket_file()));
        let runner = Arc::clone(&socket);
        let accept_task: JoinHandle<()> = tokio::spawn(async move {
            if let Err(err) = runner.run().await {
                warn!(error = %err, "Bridge socket stopped");
            }
        });
        (
            Arc::clone(&socket) as Arc<dyn PeerBridge>,
            Some((socket, accept_task)),
        )
    } else {
        info!("Extension bridge disabled by configuration");
        (Arc::new(NullPeerBridge::new()) as Arc<dyn PeerBridge>, None)
    };

    let coordinator = Arc::new(SyncCoordinator::new(
        SyncConfig::default(),
        Arc::clone(&store),
        bridge,
    ));
    coordinator.start();

    let context = SessionContext::new(
        Arc::clone(&setup.service),
        Arc::clone(&coordinator),
        store,
        RuntimeConfig::default(),
    );
    context.start();

    match context.initialize().await {
        Some(record) => {
            info!(user_id = %record.user.user_id, email = %record.user.email, "Session active")
        }
        None => info!("No session; run 'knugget login' to sign in"),
    }

    println!("Knugget client running. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;
    info!("Received shutdown signal, exiting");

    context.shutdown();
    coordinator.shutdown().await;
    if let Some((socket, accept_task)) = socket {
        socket.shutdown();
        let _ = accept_task.await;
    }

    Ok(())
}
