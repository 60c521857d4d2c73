//! Host Session Loop

use axum::extract::ws::Message;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Inbound, reject_duplicate_host};
use crate::metrics::RelayMetrics;
use crate::protocol::parse_state_update;
use crate::registry::{ConnectionId, ConnectionRegistry, HostClaim};
use crate::relay;

/// Why a host session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostExit {
    /// Another host won the slot between handshake and claim.
    Rejected,
    /// Clean close, end of stream, or an empty frame.
    Closed,
    TransportError,
    /// The host sent something that is not a JSON state value.
    MalformedUpdate,
}

/// Drive a classified host connection until it goes away.
///
/// On any exit other than [`HostExit::Rejected`] the host slot is released,
/// the game state is reset and clients are told the host disconnected.
pub async fn run_host<S: Inbound>(
    id: ConnectionId,
    outbound: &mpsc::Sender<Message>,
    inbound: &mut S,
    registry: &ConnectionRegistry,
    metrics: &RelayMetrics,
) -> HostExit {
    // Connected -> Relaying. The classifier's check was only advisory; this
    // claim is the one that counts.
    if let HostClaim::Occupied { holder } = registry.claim_host(id).await {
        warn!(conn_id = %id, holder = %holder, "Host slot taken before claim; rejecting");
        metrics.host_rejected();
        reject_duplicate_host(outbound).await;
        return HostExit::Rejected;
    }
    metrics.host_accepted();
    info!(conn_id = %id, "Host connected");

    let exit = relay_updates(id, inbound, registry, metrics).await;

    // Relaying -> Disconnected
    if let Some(departure) = registry.release_host(id).await {
        metrics.frames_queued(departure.notified);
        metrics.clients_dropped(departure.pruned);
    }
    info!(conn_id = %id, exit = ?exit, "Host disconnected; game state reset");
    exit
}

async fn relay_updates<S: Inbound>(
    id: ConnectionId,
    inbound: &mut S,
    registry: &ConnectionRegistry,
    metrics: &RelayMetrics,
) -> HostExit {
    while let Some(frame) = inbound.next().await {
        let raw = match frame {
            Ok(Message::Text(text)) if text.as_str().is_empty() => return HostExit::Closed,
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %id, "Binary frame from host; ending session");
                metrics.malformed_update();
                return HostExit::MalformedUpdate;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => return HostExit::Closed,
            Err(e) => {
                warn!(conn_id = %id, error = %e, "Host receive failed");
                return HostExit::TransportError;
            }
        };

        let update = match parse_state_update(raw) {
            Ok(update) => update,
            Err(e) => {
                warn!(conn_id = %id, error = %e, "Host sent a non-JSON update; ending session");
                metrics.malformed_update();
                return HostExit::MalformedUpdate;
            }
        };

        let raw = update.raw.clone();
        let Some(recipients) = registry.publish(id, update.into()).await else {
            // Only reachable if the slot was released under us.
            warn!(conn_id = %id, "Lost the host slot while relaying");
            return HostExit::Closed;
        };

        let report = relay::deliver(registry, &recipients, &raw).await;
        metrics.update_relayed(&report);
        debug!(conn_id = %id, bytes = raw.as_str().len(), "State update relayed");
    }

    HostExit::Closed
}
