//! Call WebSocket route configuration

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::call::call_handler;
use crate::state::AppState;

/// Create the call WebSocket router
///
/// # Endpoint
///
/// `GET /{call_id}` - WebSocket upgrade for one phone call
///
/// # Protocol
///
/// After the upgrade, the platform sends JSON events:
/// - `caller_utterance` with the transcript so far and an `isFinal` flag
/// - `interruption` when the caller talks over the agent
/// - `call_end` when the call is over
/// - `ping` keepalives
///
/// Server responds with:
/// - `response_chunk` pieces of the agent's reply, tagged with a `turnId`
/// - `response_end` closing each turn
/// - `error` with a machine-readable reason code
/// - `pong` keepalive replies
///
/// # Example
///
/// ```json
/// // Platform sends a finished utterance
/// {"type": "caller_utterance", "text": "What's the weather?", "isFinal": true}
///
/// // Server streams the reply
/// {"type": "response_chunk", "text": "It's ", "turnId": 2}
/// {"type": "response_chunk", "text": "sunny.", "turnId": 2}
/// {"type": "response_end", "turnId": 2}
/// ```
pub fn create_call_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{call_id}", get(call_handler))
        .layer(TraceLayer::new_for_http())
}
