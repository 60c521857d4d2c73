//! Client Session Loop

use axum::extract::ws::Message;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::Inbound;
use crate::metrics::RelayMetrics;
use crate::registry::{ClientHandle, ConnectionRegistry, JoinSnapshot};

/// Why a client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    Closed,
    TransportError,
    /// The relay dropped the client after a failed send.
    Pruned,
}

/// Drive a classified client connection until it goes away.
///
/// Clients are receive-only: whatever they send is read and discarded, only
/// to notice when the connection dies.
pub async fn run_client<S: Inbound>(
    handle: ClientHandle,
    inbound: &mut S,
    registry: &ConnectionRegistry,
    metrics: &RelayMetrics,
) -> ClientExit {
    let id = handle.id;
    let watch = handle.clone();

    // Joining -> Listening
    match registry.add_client(handle).await {
        JoinSnapshot::NoState => debug!(conn_id = %id, "No state to replay on join"),
        JoinSnapshot::Sent => metrics.frames_queued(1),
        JoinSnapshot::Failed(e) => {
            warn!(conn_id = %id, error = %e, "Failed to send initial state to new client")
        }
    }
    metrics.client_joined();
    info!(conn_id = %id, "Client connected");

    let exit = loop {
        tokio::select! {
            _ = watch.cancelled() => break ClientExit::Pruned,
            frame = inbound.next() => match frame {
                None | Some(Ok(Message::Close(_))) => break ClientExit::Closed,
                Some(Err(e)) => {
                    debug!(conn_id = %id, error = %e, "Client receive failed");
                    break ClientExit::TransportError;
                }
                Some(Ok(_)) => {}
            },
        }
    };

    // Listening -> Disconnected
    if registry.remove_client(id).await {
        info!(conn_id = %id, exit = ?exit, "Client disconnected");
    } else {
        debug!(conn_id = %id, exit = ?exit, "Client already removed by relay");
    }
    exit
}
