//! Role Classifier
//!
//! Reads the opening frame of a connection and decides whether it is the host
//! or a client. Classification only looks at the registry; claiming the host
//! slot is left to the host session.

use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes};
use futures::StreamExt;
use tracing::debug;

use crate::error::HandshakeError;
use crate::protocol::{Role, parse_handshake};
use crate::registry::ConnectionRegistry;
use crate::session::Inbound;

/// Assign a role from the first data frame, waiting at most `wait` for it.
pub async fn classify<S: Inbound>(
    inbound: &mut S,
    registry: &ConnectionRegistry,
    wait: Duration,
) -> Result<Role, HandshakeError> {
    let text = tokio::time::timeout(wait, first_data_frame(inbound))
        .await
        .map_err(|_| HandshakeError::Timeout)??;

    let role = parse_handshake(text.as_str())?;

    if role == Role::Host && registry.host().await.is_some() {
        return Err(HandshakeError::DuplicateHost);
    }
    Ok(role)
}

async fn first_data_frame<S: Inbound>(inbound: &mut S) -> Result<Utf8Bytes, HandshakeError> {
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Text(text)) => return Ok(text),
            Ok(Message::Binary(_)) => {
                return Err(HandshakeError::Malformed("binary frame".to_string()));
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!(error = %e, "Receive failed during handshake");
                break;
            }
        }
    }
    Err(HandshakeError::ConnectionClosed)
}
