//! Schema subscriptions over WebSocket.
//!
//! # Data Flow
//! ```text
//! SchemaBroadcast ── SchemaSubscription.recv() ──→ text frame {sequence, version, sdl} ──→ client
//! ```
//!
//! # Design Decisions
//! - The first frame is the replayed latest value, if one exists
//! - Incoming frames are only read to notice the client going away

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};

use crate::http::server::AppState;
use crate::sync::SchemaSubscription;

pub async fn subscribe_schema(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let subscription = state.schema.subscribe();
    ws.on_upgrade(move |socket| stream_schema(socket, subscription))
}

async fn stream_schema(socket: WebSocket, mut subscription: SchemaSubscription) {
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!("Schema subscriber connected");

    loop {
        tokio::select! {
            next = subscription.recv() => {
                let Some(schema) = next else { break };
                let frame = match serde_json::to_string(&*schema) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode schema frame");
                        break;
                    }
                };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
                tracing::trace!(sequence = schema.sequence, "Schema frame sent");
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("Schema subscriber disconnected");
}
