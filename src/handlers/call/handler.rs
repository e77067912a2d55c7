//! Call WebSocket handler.
//!
//! Upgrades the platform's connection for one phone call, pumps inbound
//! events to the call's session in arrival order, and writes outbound frames
//! from a single sender task so ordering survives all the way to the wire.
//!
//! Accepting a call never waits on any other call: the only shared state is
//! the session registry, and registration is a single per-key map operation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::errors::app_error::AppError;
use crate::state::AppState;

use super::messages::{self, IncomingMessage, MessageRoute, OutgoingMessage, ReasonCode};
use super::session::CallSession;

/// Outbound channel depth per connection
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Upper bound on how long an idle check can be deferred
const MAX_IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Call WebSocket handler
///
/// `GET /{call_id}`: the platform appends the call id to the base URL and
/// opens exactly one connection per call. A second connection for a call id
/// that is still live is rejected with 409 before the upgrade; the first
/// connection is unaffected.
pub async fn call_handler(
    ws: WebSocketUpgrade,
    Path(call_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let (message_tx, message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);
    let session = CallSession::new(
        call_id.clone(),
        state.config.clone(),
        state.completion.clone(),
        message_tx.clone(),
    );

    if let Err(e) = state.sessions.register(session.clone()) {
        warn!(call_id = %call_id, "Rejecting connection: {e}");
        return AppError::from(e).into_response();
    }

    info!(call_id = %call_id, "Call connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_call_socket(socket, state, session, message_tx, message_rx))
}

/// Drive one call connection from upgrade to teardown.
async fn handle_call_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    session: Arc<CallSession>,
    message_tx: mpsc::Sender<MessageRoute>,
    mut message_rx: mpsc::Receiver<MessageRoute>,
) {
    let call_id = session.call_id().to_string();
    info!(call_id = %call_id, active_calls = state.sessions.active_calls(), "Call connection established");

    let (mut sender, mut receiver) = socket.split();

    // Sender task for outgoing frames
    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MessageRoute::Outgoing(message) => match messages::encode(&message) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    // The agent speaks first
    session.activate().await;

    let idle_timeout = state.config.idle_timeout();
    let idle_check = (idle_timeout / 4).clamp(Duration::from_millis(250), MAX_IDLE_CHECK_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        select! {
            frame = receiver.next() => {
                last_activity = Instant::now();

                match frame {
                    Some(Ok(frame)) => {
                        if !process_call_frame(frame, &state, &session, &message_tx).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(call_id = %call_id, "Call WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(call_id = %call_id, "Call connection closed by platform");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(idle_check) => {
                // A live generation counts as activity even when the
                // platform is quiet.
                if !session.is_generating() && last_activity.elapsed() > idle_timeout {
                    warn!(
                        call_id = %call_id,
                        idle_secs = last_activity.elapsed().as_secs(),
                        "Tearing down idle call"
                    );
                    let _ = message_tx
                        .send(MessageRoute::Outgoing(OutgoingMessage::Error {
                            reason_code: ReasonCode::IdleTimeout,
                        }))
                        .await;
                    break;
                }
            }
        }
    }

    teardown(&state, &session).await;

    // Drain whatever the teardown queued, then close the socket.
    let _ = message_tx.send(MessageRoute::Close).await;
    let _ = tokio::time::timeout(Duration::from_secs(1), sender_task).await;

    info!(call_id = %call_id, "Call connection terminated");
}

/// Process one inbound WebSocket frame.
///
/// Returns true to keep the connection alive, false to terminate it.
async fn process_call_frame(
    frame: Message,
    state: &Arc<AppState>,
    session: &Arc<CallSession>,
    message_tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    match frame {
        Message::Text(text) => {
            let event = match messages::decode(&text) {
                Ok(event) => event,
                Err(e) => {
                    // Policy: drop the frame and keep the call alive
                    warn!(call_id = %session.call_id(), "Dropping malformed message: {}", e);
                    return true;
                }
            };
            dispatch_event(event, state, session, message_tx).await
        }
        Message::Binary(data) => {
            debug!(call_id = %session.call_id(), bytes = data.len(), "Ignoring binary frame");
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            info!(call_id = %session.call_id(), "Call close frame received");
            false
        }
    }
}

/// Route one decoded event to the live session.
async fn dispatch_event(
    event: IncomingMessage,
    state: &Arc<AppState>,
    session: &Arc<CallSession>,
    message_tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    // Events are routed through the registry rather than the captured
    // session so a frame racing teardown is dropped instead of resurrecting
    // a call that no longer exists.
    let Some(live) = state.sessions.get(session.call_id()) else {
        let err = AppError::SessionNotFound(session.call_id().to_string());
        warn!("Dropping event: {err}");
        return false;
    };

    match event {
        IncomingMessage::CallerUtterance { text, is_final } => {
            debug!(
                call_id = %live.call_id(),
                is_final,
                chars = text.len(),
                "Caller transcript update"
            );
            live.handle_caller_update(text, is_final).await;
            true
        }
        IncomingMessage::Interruption => {
            live.handle_interruption().await;
            true
        }
        IncomingMessage::Ping { timestamp } => {
            let _ = message_tx
                .send(MessageRoute::Outgoing(OutgoingMessage::Pong { timestamp }))
                .await;
            true
        }
        IncomingMessage::CallEnd => {
            info!(call_id = %live.call_id(), "Platform ended the call");
            false
        }
    }
}

/// Tear down the session and release its registry slot.
///
/// Safe to call more than once: the session ignores a second close and the
/// registry slot can only be released once.
async fn teardown(state: &Arc<AppState>, session: &Arc<CallSession>) {
    session.close().await;
    if state.sessions.remove(session.call_id()).is_some() {
        debug!(
            call_id = %session.call_id(),
            active_calls = state.sessions.active_calls(),
            "Session released"
        );
    }
}
