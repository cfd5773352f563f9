//! WebSocket handling for live enrichment updates
//!
//! Every connection starts with a `full-snapshot`, then receives each
//! scheduler event as it is published.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use grove_core::GraphEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::ServerState;

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    RequestSnapshot,
    AnalyzeFile {
        path: String,
        #[serde(default)]
        force: bool,
    },
    Ping,
}

/// Replies that are not graph events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerReply {
    Pong,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json<S, T>(sender: &mut S, value: &T) -> bool
where
    S: Sink<Message> + Unpin,
    T: Serialize,
{
    match serde_json::to_string(value) {
        Ok(json) => sender.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize WebSocket message: {}", e);
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    // Subscribe before the snapshot so nothing published in between is lost.
    let mut events = state.scheduler.subscribe();

    if !send_json(&mut sender, &state.full_snapshot_event().await).await {
        warn!("Failed to send initial snapshot to WebSocket client");
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!("WebSocket receive error: {}", e);
                        break;
                    }
                };
                if !handle_client_message(&text, &state, &mut sender).await {
                    break;
                }
            }
            event = events.recv() => {
                let delivered = match event {
                    Ok(event) => send_json(&mut sender, &event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        // Deltas were dropped; resynchronize from scratch.
                        warn!("WebSocket client lagged by {} events", skipped);
                        send_json(&mut sender, &state.full_snapshot_event().await).await
                    }
                    Err(RecvError::Closed) => break,
                };
                if !delivered {
                    break;
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

/// Returns false once the client can no longer be written to.
async fn handle_client_message<S>(text: &str, state: &ServerState, sender: &mut S) -> bool
where
    S: Sink<Message> + Unpin,
{
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to parse WebSocket message: {}", e);
            let error = GraphEvent::Error { message: format!("invalid message: {e}") };
            return send_json(sender, &error).await;
        }
    };
    debug!("Received {:?}", message);

    match message {
        ClientMessage::RequestSnapshot => send_json(sender, &state.full_snapshot_event().await).await,
        ClientMessage::Ping => send_json(sender, &ServerReply::Pong).await,
        // The resulting focus and update events arrive through the subscription.
        ClientMessage::AnalyzeFile { path, force } => match state.scheduler.request_analysis(&path, force).await {
            Ok(_) => true,
            Err(e) => send_json(sender, &GraphEvent::Error { message: e.to_string() }).await,
        },
    }
}
