//! Session loops
//!
//! One loop per classified connection:
//! - host: `Connected -> Relaying -> Disconnected`
//! - client: `Joining -> Listening -> Disconnected`
//!
//! Both run against the shared [`ConnectionRegistry`](crate::registry::ConnectionRegistry)
//! and end in a named cleanup transition.

mod client;
mod host;

pub use client::{ClientExit, run_client};
pub use host::{HostExit, run_host};

use axum::extract::ws::{CloseFrame, Message, close_code};
use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::{HOST_ALREADY_EXISTS, ServerNotice};

/// Inbound half of a connection: frames in arrival order, ending on close.
pub trait Inbound: Stream<Item = Result<Message, axum::Error>> + Unpin + Send {}

impl<T> Inbound for T where T: Stream<Item = Result<Message, axum::Error>> + Unpin + Send {}

/// Tell a would-be second host why it is being turned away, then close it.
pub(crate) async fn reject_duplicate_host(outbound: &mpsc::Sender<Message>) {
    let notice = ServerNotice::host_already_exists().to_message();
    let close = Message::Close(Some(CloseFrame {
        code: close_code::POLICY,
        reason: HOST_ALREADY_EXISTS.into(),
    }));
    for msg in [notice, close] {
        if outbound.send(msg).await.is_err() {
            debug!("Rejected host hung up before the notice was queued");
            return;
        }
    }
}
