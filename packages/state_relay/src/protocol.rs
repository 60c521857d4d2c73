//! Wire protocol
//!
//! Every frame is a JSON text frame. A connection opens with
//! `{"role": "host" | "client"}`; after that the host sends full state values
//! and the server sends clients either those values verbatim or a [`ServerNotice`].

use axum::extract::ws::{Message, Utf8Bytes};
use serde::{Deserialize, Serialize};

use crate::error::HandshakeError;

/// Role of a connection, fixed by its first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Client => "client",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications the server originates itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerNotice {
    Error { message: String },
    HostDisconnected,
}

/// Message carried by the rejection sent to a second host.
pub const HOST_ALREADY_EXISTS: &str = "HostAlreadyExists";

impl ServerNotice {
    pub fn host_already_exists() -> Self {
        ServerNotice::Error {
            message: HOST_ALREADY_EXISTS.to_string(),
        }
    }

    pub fn to_message(&self) -> Message {
        // Both variants are plain strings; serialization cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        Message::Text(json.into())
    }
}

/// Parse the opening frame of a connection into a [`Role`].
///
/// The role field is read by hand rather than through serde so that a
/// structurally valid record with an unknown role can be told apart from
/// one that is not a record at all.
pub fn parse_handshake(text: &str) -> Result<Role, HandshakeError> {
    if text.is_empty() {
        return Err(HandshakeError::Empty);
    }

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| HandshakeError::Malformed(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| HandshakeError::Malformed("expected a JSON object".to_string()))?;

    let role = object
        .get("role")
        .and_then(|r| r.as_str())
        .ok_or(HandshakeError::MissingRole)?;

    match role {
        "host" => Ok(Role::Host),
        "client" => Ok(Role::Client),
        other => Err(HandshakeError::UnknownRole(other.to_string())),
    }
}

/// A host update that has been checked to be JSON.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub value: serde_json::Value,
    pub raw: Utf8Bytes,
}

/// Validate a host frame as a full-state replacement. The raw text is kept so
/// clients receive exactly what the host sent.
pub fn parse_state_update(raw: Utf8Bytes) -> Result<StateUpdate, serde_json::Error> {
    let value = serde_json::from_str(raw.as_str())?;
    Ok(StateUpdate { value, raw })
}
