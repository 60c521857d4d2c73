//! Connection Registry
//!
//! Owns the three pieces of process-wide state: the host slot, the client set
//! and the latest game state. Every method takes the lock for its whole
//! read-modify-write, so no caller can observe a half-applied change.

use std::collections::HashMap;

use axum::extract::ws::{Message, Utf8Bytes};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SendFailure;
use crate::protocol::{ServerNotice, StateUpdate};

/// Identifies one accepted connection for its whole lifetime.
pub type ConnectionId = Uuid;

/// The registry's reference to a client connection.
///
/// The socket itself is owned by the connection's writer task; the registry
/// only holds the queue feeding it and a token to end the client's session.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: ConnectionId,
    outbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl ClientHandle {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            outbound,
            cancel: CancellationToken::new(),
        }
    }

    /// Queue a frame without waiting. A full queue counts as a failure: the
    /// host loop never waits on a slow client.
    pub fn try_send(&self, msg: Message) -> Result<(), SendFailure> {
        self.outbound.try_send(msg).map_err(SendFailure::from)
    }

    /// Resolves once the relay has dropped this client.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The latest full state published by the host.
#[derive(Debug, Clone)]
pub struct GameState {
    pub value: serde_json::Value,
    /// Exactly what the host sent, replayed to late joiners as-is.
    pub raw: Utf8Bytes,
}

impl From<StateUpdate> for GameState {
    fn from(update: StateUpdate) -> Self {
        Self {
            value: update.value,
            raw: update.raw,
        }
    }
}

/// Result of trying to take the host slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClaim {
    Claimed,
    Occupied { holder: ConnectionId },
}

/// What a joining client was told on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSnapshot {
    /// No host, or the host has not published yet.
    NoState,
    Sent,
    Failed(SendFailure),
}

/// Outcome of a host leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Departure {
    pub notified: usize,
    pub pruned: usize,
}

#[derive(Default)]
struct Inner {
    host: Option<ConnectionId>,
    clients: HashMap<ConnectionId, ClientHandle>,
    state: Option<GameState>,
}

impl Inner {
    fn prune(&mut self, id: &ConnectionId) -> bool {
        match self.clients.remove(id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Shared registry of the host, the clients and the current state.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the host slot if it is free. Check and set happen under one lock,
    /// so of any number of concurrent claims exactly one succeeds.
    pub async fn claim_host(&self, id: ConnectionId) -> HostClaim {
        let mut inner = self.inner.write().await;
        match inner.host {
            Some(holder) => HostClaim::Occupied { holder },
            None => {
                inner.host = Some(id);
                info!(conn_id = %id, "Host slot claimed");
                HostClaim::Claimed
            }
        }
    }

    /// Clear the host slot, drop the game state and tell every client the host
    /// is gone. Notices are queued while the lock is held so a successor host
    /// can't slip a state update in ahead of them.
    ///
    /// Returns `None` if `id` does not hold the slot; nothing is touched then.
    pub async fn release_host(&self, id: ConnectionId) -> Option<Departure> {
        let mut inner = self.inner.write().await;
        if inner.host != Some(id) {
            warn!(conn_id = %id, "Release requested by a connection that is not the host");
            return None;
        }

        inner.host = None;
        inner.state = None;

        let notice = ServerNotice::HostDisconnected.to_message();
        let mut departure = Departure::default();
        let mut failed = Vec::new();
        for (client_id, handle) in inner.clients.iter() {
            match handle.try_send(notice.clone()) {
                Ok(()) => departure.notified += 1,
                Err(e) => {
                    debug!(conn_id = %client_id, error = %e, "Dropping client on host-departure notice");
                    failed.push(*client_id);
                }
            }
        }
        for client_id in &failed {
            if inner.prune(client_id) {
                departure.pruned += 1;
            }
        }

        info!(
            conn_id = %id,
            notified = departure.notified,
            pruned = departure.pruned,
            "Host released; game state reset"
        );
        Some(departure)
    }

    pub async fn host(&self) -> Option<ConnectionId> {
        self.inner.read().await.host
    }

    /// Register a client. If a host is connected and has published, its
    /// latest state is queued for the client before anything else can be.
    pub async fn add_client(&self, handle: ClientHandle) -> JoinSnapshot {
        let mut inner = self.inner.write().await;

        let snapshot = match (&inner.host, &inner.state) {
            (Some(_), Some(state)) => {
                match handle.try_send(Message::Text(state.raw.clone())) {
                    Ok(()) => JoinSnapshot::Sent,
                    Err(e) => JoinSnapshot::Failed(e),
                }
            }
            _ => JoinSnapshot::NoState,
        };

        inner.clients.insert(handle.id, handle);
        snapshot
    }

    /// Remove a client and end its session. Removing an absent client is a
    /// no-op; the return value says whether anything was removed.
    pub async fn remove_client(&self, id: ConnectionId) -> bool {
        self.inner.write().await.prune(&id)
    }

    /// Replace the game state wholesale. Only the current host may publish.
    pub async fn set_state(&self, id: ConnectionId, state: GameState) -> bool {
        self.publish(id, state).await.is_some()
    }

    /// Store a new state and take the broadcast recipients under the same lock.
    ///
    /// A client joining concurrently either registers first and is returned
    /// here, or registers after and gets the new state as its join snapshot.
    /// It never gets both. Returns `None` if `id` does not hold the host slot.
    pub async fn publish(&self, id: ConnectionId, state: GameState) -> Option<Vec<ClientHandle>> {
        let mut inner = self.inner.write().await;
        if inner.host != Some(id) {
            return None;
        }
        inner.state = Some(state);
        Some(inner.clients.values().cloned().collect())
    }

    pub async fn state(&self) -> Option<GameState> {
        self.inner.read().await.state.clone()
    }

    /// Point-in-time copy of the client set for a broadcast to iterate.
    pub async fn client_snapshot(&self) -> Vec<ClientHandle> {
        self.inner.read().await.clients.values().cloned().collect()
    }

    pub async fn client_count(&self) -> usize {
        self.inner.read().await.clients.len()
    }

    pub async fn has_client(&self, id: ConnectionId) -> bool {
        self.inner.read().await.clients.contains_key(&id)
    }
}
