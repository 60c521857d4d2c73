//! Connection driver
//!
//! Glue between an upgraded WebSocket and the relay core: split the socket,
//! hand the write half to a writer task fed by a queue, classify the
//! connection, then run the matching session loop.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::RelayState;
use crate::classifier::classify;
use crate::error::HandshakeError;
use crate::protocol::Role;
use crate::registry::{ClientHandle, ConnectionId};
use crate::session::{self, Inbound};

/// How long queued frames (e.g. a rejection notice) get to flush after the
/// session has ended.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle one upgraded WebSocket until it closes.
pub async fn handle_socket(socket: WebSocket, state: RelayState) {
    let conn_id = Uuid::new_v4();
    debug!(conn_id = %conn_id, "New WebSocket connection");
    state.metrics.connection_opened();

    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(state.config.client_buffer);
    let mut writer = tokio::spawn(write_frames(conn_id, ws_sender, rx));

    drive(conn_id, tx, &mut ws_receiver, &state).await;

    // All senders are gone once the session has cleaned up, so the writer
    // drains what is left and closes the socket.
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        debug!(conn_id = %conn_id, "Writer did not drain in time; aborting");
        writer.abort();
    }

    state.metrics.connection_closed();
    debug!(conn_id = %conn_id, "WebSocket connection finished");
}

/// Classify the connection and run its session. Takes ownership of the
/// outbound queue so it is released as soon as the session is over.
pub(crate) async fn drive<S: Inbound>(
    conn_id: ConnectionId,
    outbound: mpsc::Sender<Message>,
    inbound: &mut S,
    state: &RelayState,
) {
    let role = match classify(inbound, &state.registry, state.config.handshake_timeout).await {
        Ok(role) => role,
        Err(HandshakeError::DuplicateHost) => {
            warn!(conn_id = %conn_id, "Attempted to connect a second host");
            state.metrics.handshake_failed(&HandshakeError::DuplicateHost);
            session::reject_duplicate_host(&outbound).await;
            return;
        }
        Err(e) => {
            warn!(
                conn_id = %conn_id,
                code = e.error_code(),
                error = %e,
                "Handshake failed; disconnecting"
            );
            state.metrics.handshake_failed(&e);
            return;
        }
    };
    info!(conn_id = %conn_id, role = %role, "Connection classified");

    match role {
        Role::Host => {
            session::run_host(
                conn_id,
                &outbound,
                inbound,
                &state.registry,
                &state.metrics,
            )
            .await;
        }
        Role::Client => {
            let handle = ClientHandle::new(conn_id, outbound);
            session::run_client(handle, inbound, &state.registry, &state.metrics).await;
        }
    }
}

/// Forward queued frames to the socket. Ends when every sender is dropped or
/// the socket refuses a frame; in the latter case the queue is dropped with
/// it, which is how the relay learns the client is gone.
async fn write_frames<W>(conn_id: ConnectionId, mut sink: W, mut rx: mpsc::Receiver<Message>)
where
    W: Sink<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg).await {
            debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
            return;
        }
        if closing {
            return;
        }
    }
    let _ = sink.close().await;
}
