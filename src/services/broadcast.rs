use axum::extract::ws::Message;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::ws::ServerMessage,
    state::{AppState, registry::Outcome, room::ConnectionId},
};

/// Failure to hand a message to a connection's writer task.
#[derive(Debug, Error)]
pub enum SendError {
    /// Writer channel closed; the socket is going away.
    #[error("connection closed")]
    ConnectionClosed,
    /// The payload could not be encoded.
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Push every delivery of `outcome` to its targets, in order.
///
/// Each message is serialized once. Targets whose socket already closed are
/// skipped; their own handler prunes them from the rooms.
pub fn deliver(state: &AppState, outcome: Outcome) {
    for delivery in outcome.into_deliveries() {
        let frame = match encode(&delivery.message) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping undeliverable message");
                continue;
            }
        };

        for target in delivery.targets {
            let Some(tx) = state.connections().get(&target).map(|conn| conn.tx.clone()) else {
                debug!(connection_id = %target, "skipping delivery to unknown connection");
                continue;
            };
            if tx.send(frame.clone()).is_err() {
                debug!(connection_id = %target, "skipping delivery to closed connection");
            }
        }
    }
}

/// Send a single message to one connection.
pub fn send_to(
    state: &AppState,
    target: ConnectionId,
    message: &ServerMessage,
) -> Result<(), SendError> {
    let tx = state
        .connections()
        .get(&target)
        .map(|conn| conn.tx.clone())
        .ok_or(SendError::ConnectionClosed)?;
    send_message_to_websocket(&tx, message)
}

/// Serialize a payload and push it onto the provided WebSocket sender.
pub fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), SendError>
where
    T: ?Sized + Serialize,
{
    let frame = encode(value)?;
    tx.send(frame).map_err(|_| SendError::ConnectionClosed)
}

fn encode<T>(value: &T) -> Result<Message, serde_json::Error>
where
    T: ?Sized + Serialize,
{
    let payload = serde_json::to_string(value)?;
    Ok(Message::Text(payload.into()))
}
