//! Error types for the relay core.
//!
//! None of these cross a session boundary: each is handled by the session
//! that hit it and only surfaces in logs and metrics.

use axum::extract::ws::Message;
use tokio::sync::mpsc::error::TrySendError;

/// Why a new connection could not be assigned a role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("no handshake frame before timeout")]
    Timeout,

    #[error("connection closed before handshake")]
    ConnectionClosed,

    #[error("empty handshake frame")]
    Empty,

    #[error("malformed handshake: {0}")]
    Malformed(String),

    #[error("handshake has no role field")]
    MissingRole,

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("a host is already connected")]
    DuplicateHost,
}

impl HandshakeError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Timeout => "handshake_timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::Empty => "empty_handshake",
            Self::Malformed(_) => "malformed_handshake",
            Self::MissingRole => "missing_role",
            Self::UnknownRole(_) => "unknown_role",
            Self::DuplicateHost => "duplicate_host",
        }
    }
}

/// A frame could not be queued for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendFailure {
    #[error("client connection is gone")]
    Closed,

    #[error("client outbound queue is full")]
    Full,
}

impl From<TrySendError<Message>> for SendFailure {
    fn from(err: TrySendError<Message>) -> Self {
        match err {
            TrySendError::Closed(_) => SendFailure::Closed,
            TrySendError::Full(_) => SendFailure::Full,
        }
    }
}
