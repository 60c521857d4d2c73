//! Relay metrics for observability
//!
//! Counters are bumped by the sessions and read by the `/metrics` and
//! `/health` endpoints.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::HandshakeError;
use crate::relay::BroadcastReport;

/// Process-wide relay metrics
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since start
    pub total_connections: AtomicU64,

    // Role metrics
    pub hosts_accepted: AtomicU64,
    /// Second-host attempts turned away
    pub hosts_rejected: AtomicU64,
    pub clients_joined: AtomicU64,
    /// Connections that never produced a valid role
    pub handshake_failures: AtomicU64,

    // Relay metrics
    /// Host frames accepted as new state
    pub updates_relayed: AtomicU64,
    /// Host frames that were not JSON
    pub malformed_updates: AtomicU64,
    /// Frames queued to clients (broadcasts, snapshots, notices)
    pub frames_delivered: AtomicU64,
    /// Clients dropped because they could not take a frame
    pub clients_pruned: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    // Role tracking
    pub fn host_accepted(&self) {
        self.hosts_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn host_rejected(&self) {
        self.hosts_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_joined(&self) {
        self.clients_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self, err: &HandshakeError) {
        if matches!(err, HandshakeError::DuplicateHost) {
            self.host_rejected();
        } else {
            self.handshake_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Relay tracking
    pub fn update_relayed(&self, report: &BroadcastReport) {
        self.updates_relayed.fetch_add(1, Ordering::Relaxed);
        self.frames_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.clients_pruned
            .fetch_add(report.pruned as u64, Ordering::Relaxed);
    }

    pub fn malformed_update(&self) {
        self.malformed_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_queued(&self, n: usize) {
        self.frames_delivered.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn clients_dropped(&self, n: usize) {
        self.clients_pruned.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            roles: RoleMetrics {
                hosts_accepted: self.hosts_accepted.load(Ordering::Relaxed),
                hosts_rejected: self.hosts_rejected.load(Ordering::Relaxed),
                clients_joined: self.clients_joined.load(Ordering::Relaxed),
                handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            },
            relay: RelayCounters {
                updates: self.updates_relayed.load(Ordering::Relaxed),
                malformed_updates: self.malformed_updates.load(Ordering::Relaxed),
                frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
                clients_pruned: self.clients_pruned.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub roles: RoleMetrics,
    pub relay: RelayCounters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleMetrics {
    pub hosts_accepted: u64,
    pub hosts_rejected: u64,
    pub clients_joined: u64,
    pub handshake_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayCounters {
    pub updates: u64,
    pub malformed_updates: u64,
    pub frames_delivered: u64,
    pub clients_pruned: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub host_connected: bool,
    pub clients: u64,
    pub uptime_secs: u64,
}
