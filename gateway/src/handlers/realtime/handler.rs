//! Realtime WebSocket handler
//!
//! Upgrades `/realtime` requests and hands each socket to a fresh
//! [`RelaySession`] backed by its own upstream session.

use axum::{
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::info;

use super::session::{RelaySession, SessionSettings};
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Realtime WebSocket handler
///
/// Upgrades the HTTP connection to WebSocket and relays it to the upstream
/// realtime API. Clients send binary PCM16 audio and JSON control events;
/// they receive upstream events verbatim, binary audio, and bridge messages.
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Realtime WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_realtime_socket(socket, state))
}

/// Run one relay session on an upgraded socket.
async fn handle_realtime_socket(socket: WebSocket, state: Arc<AppState>) {
    let session = RelaySession::new(
        state.upstream.create(),
        SessionSettings::from_config(&state.config),
    );
    info!(session_id = %session.id(), "Realtime WebSocket connection established");

    let (sender, receiver) = socket.split();
    session.run(sender, receiver).await;
}
