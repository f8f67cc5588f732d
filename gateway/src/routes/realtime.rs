//! Realtime WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the Realtime WebSocket router
///
/// # Endpoint
///
/// `GET /realtime` - WebSocket upgrade, relayed to the OpenAI Realtime API
///
/// # Example
///
/// ```json
/// // Server, once the upstream session is open
/// {"type": "realtime.connected", "message": "Connected to OpenAI Realtime API", "agent": "Assistant"}
///
/// // Client control event, forwarded verbatim
/// {"type": "response.create"}
///
/// // Client sends audio as binary frames
/// // Server sends upstream events as text and decoded audio as binary
/// ```
pub fn create_realtime_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime", get(realtime_handler))
        .layer(TraceLayer::new_for_http())
}
