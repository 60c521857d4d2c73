//! Broadcast Relay
//!
//! Fans one host frame out to every registered client. Delivery is
//! best-effort: a client that can't take the frame is pruned and the rest
//! still get it.

use axum::extract::ws::{Message, Utf8Bytes};
use tracing::{debug, info};

use crate::registry::{ClientHandle, ConnectionRegistry};

/// Counts from one broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

/// Send `raw` unmodified to every client registered at call time.
///
/// Membership is snapshotted first, so joins and leaves during the broadcast
/// neither disturb the iteration nor cause a double send.
pub async fn broadcast(registry: &ConnectionRegistry, raw: &Utf8Bytes) -> BroadcastReport {
    let recipients = registry.client_snapshot().await;
    deliver(registry, &recipients, raw).await
}

/// Send `raw` to a recipient set taken earlier, usually by
/// [`ConnectionRegistry::publish`]. Failed recipients are pruned.
pub async fn deliver(
    registry: &ConnectionRegistry,
    recipients: &[ClientHandle],
    raw: &Utf8Bytes,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    for client in recipients {
        match client.try_send(Message::Text(raw.clone())) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                if registry.remove_client(client.id).await {
                    report.pruned += 1;
                    info!(conn_id = %client.id, error = %e, "Client dropped during broadcast");
                }
            }
        }
    }

    debug!(
        recipients = recipients.len(),
        delivered = report.delivered,
        pruned = report.pruned,
        "Broadcast state update"
    );
    report
}
