use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::protocol;
use crate::registry::ConnectionHandle;
use crate::state::PierState;

/// WebSocket upgrade handler; the only way in for signaling clients.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<PierState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: PierState) {
    let (connection, mut outbound) = ConnectionHandle::new(state.outbound_buffer());
    let connection_id = connection.id();
    let (mut sender, mut receiver) = socket.split();

    state.connection_opened();
    counter!("beach_pier_connections_total", 1);
    info!(connection_id = %connection_id, "signaling connection opened");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let kind = message.kind();
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(err) => {
                    warn!(
                        connection_id = %connection_id,
                        kind,
                        error = %err,
                        "failed to encode message"
                    );
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        debug!(connection_id = %connection_id, "writer task finished");
    });

    // Frames from one connection are handled strictly in order.
    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!(connection_id = %connection_id, error = %err, "error receiving frame");
                break;
            }
        };

        let decoded = match frame {
            Message::Text(text) => protocol::decode_text(&text),
            Message::Binary(bytes) => protocol::decode_binary(&bytes),
            Message::Close(frame) => {
                debug!(
                    connection_id = %connection_id,
                    reason = ?frame.map(|f| f.reason.to_string()),
                    "client closed websocket"
                );
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match decoded {
            Ok(message) => {
                let outcome = state.router().dispatch(&connection, message);
                debug!(connection_id = %connection_id, ?outcome, "handled signaling event");
            }
            Err(err) => {
                counter!("beach_pier_malformed_frames_total", 1);
                warn!(connection_id = %connection_id, error = %err, "ignoring malformed frame");
            }
        }
    }

    state.router().disconnect(&connection);
    state.connection_closed();
    counter!("beach_pier_connections_closed_total", 1);
    writer.abort();

    info!(connection_id = %connection_id, "signaling connection closed");
}
