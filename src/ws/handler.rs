//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::PlayerId;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::ClientMsg;

/// Consecutive bad packets tolerated before the connection is closed
pub const MAX_PROTOCOL_VIOLATIONS: u32 = 5;

/// Packets buffered per client before new ones are dropped
const OUTBOUND_CAPACITY: usize = 64;

const MAX_NAME_LEN: usize = 32;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Display name
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let name = display_name(query.name.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, name, state))
}

fn display_name(requested: Option<&str>) -> String {
    let name: String = requested
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();

    if name.is_empty() {
        "Snowman".to_string()
    } else {
        name
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, name: String, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_CAPACITY);

    let player_id = state.server.connect(name.clone(), outbound_tx);
    info!(player_id, name = %name, "New WebSocket connection");

    // Writer task: game packets -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(bytes) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Binary(bytes.to_vec())).await {
                debug!(player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    read_loop(player_id, &mut ws_stream, &state).await;

    // Dropping the receiver marks this player's outbound channel closed
    writer_handle.abort();
    let _ = writer_handle.await;

    state.server.disconnect(player_id);
    info!(player_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> game server
async fn read_loop(
    player_id: PlayerId,
    ws_stream: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
) {
    let rate_limiter = PlayerRateLimiter::new(state.config.input_rate_limit);
    let mut violations = 0u32;

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Binary(data)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id, "Rate limited input message");
                    continue;
                }

                match ClientMsg::decode(&data) {
                    Ok((_timestamp, msg)) => {
                        violations = 0;
                        state.server.dispatch(player_id, msg);
                    }
                    Err(e) => {
                        violations += 1;
                        warn!(player_id, error = %e, violations, "Failed to parse client packet");
                        if violations >= MAX_PROTOCOL_VIOLATIONS {
                            warn!(player_id, "Too many protocol violations, closing connection");
                            break;
                        }
                    }
                }
            }
            Ok(Message::Text(_)) => {
                warn!(player_id, "Received text message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(player_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(player_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}
