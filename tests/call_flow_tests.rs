//! End-to-End Call Flow Tests
//!
//! Tests for complete call flows over a real WebSocket connection, with the
//! upstream completion backend replaced by a scripted stub. These verify the
//! wire protocol the voice platform sees: greeting, streamed responses,
//! interruption, upstream failure fallback, keepalives, and duplicate
//! connection rejection.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use voicelink_gateway::core::completion::{
    BaseCompletion, CompletionError, CompletionResult, CompletionStream, PromptContext,
};
use voicelink_gateway::{ServerConfig, routes, state::AppState};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Test Harness
// =============================================================================

/// One scripted upstream exchange.
struct Script {
    chunks: Vec<&'static str>,
    /// Pause before each chunk, for interruption-timing tests.
    delay: Option<Duration>,
    /// Error yielded after the chunks, if any.
    error: Option<CompletionError>,
}

impl Script {
    fn chunks(chunks: Vec<&'static str>) -> Self {
        Self { chunks, delay: None, error: None }
    }

    fn slow(chunks: Vec<&'static str>, delay: Duration) -> Self {
        Self { chunks, delay: Some(delay), error: None }
    }

    fn failing(chunks: Vec<&'static str>, error: CompletionError) -> Self {
        Self { chunks, delay: None, error: Some(error) }
    }
}

/// Completion stub that plays back scripted outcomes, one per request.
struct ScriptedCompletion {
    scripts: Mutex<VecDeque<Script>>,
}

impl ScriptedCompletion {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
        })
    }
}

#[async_trait]
impl BaseCompletion for ScriptedCompletion {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    async fn start(
        &self,
        _context: PromptContext,
        cancel: CancellationToken,
    ) -> CompletionResult<CompletionStream> {
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Script::chunks(vec!["fallback script"]));

        let chunks = stream! {
            for chunk in script.chunks {
                if let Some(delay) = script.delay {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if cancel.is_cancelled() {
                    return;
                }
                yield Ok(chunk.to_string());
            }
            if let Some(error) = script.error {
                yield Err(error);
            }
        };
        Ok(Box::pin(chunks))
    }
}

/// Minimal test configuration; port 0 because the listener picks its own.
fn create_test_config(idle_timeout_secs: u64, greeting: Option<&str>) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        completion_provider: "scripted".to_string(),
        groq_api_key: None,
        model: "llama-3.1-8b-instant".to_string(),
        temperature: 0.6,
        max_tokens: 150,
        system_prompt: "You are a helpful assistant.".to_string(),
        greeting: greeting.map(str::to_string),
        fallback_utterance: "Sorry, could you say that again?".to_string(),
        max_history_turns: 6,
        idle_timeout_secs,
        generation_timeout_secs: 30,
        cors_allowed_origins: None,
    }
}

/// Start the gateway on an ephemeral port and return its address.
async fn spawn_gateway(scripts: Vec<Script>, greeting: Option<&str>) -> SocketAddr {
    spawn_gateway_with_config(create_test_config(300, greeting), scripts).await
}

async fn spawn_gateway_with_config(config: ServerConfig, scripts: Vec<Script>) -> SocketAddr {
    let app_state = AppState::with_provider(config, ScriptedCompletion::new(scripts));
    let app = routes::api::create_api_router()
        .merge(routes::calls::create_call_router())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, call_id: &str) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{addr}/{call_id}"))
        .await
        .expect("WebSocket connect failed");
    ws
}

async fn send_event(ws: &mut WsClient, event: Value) {
    ws.send(Message::Text(event.to_string().into()))
        .await
        .expect("Failed to send event");
}

/// Next JSON event from the server, skipping non-text frames.
async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("Timed out waiting for server event")
            .expect("Connection closed unexpectedly")
            .expect("WebSocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("Server sent invalid JSON");
        }
    }
}

/// Drain events until `response_end` for the given turn, returning the chunk
/// texts seen for that turn.
async fn collect_response(ws: &mut WsClient, turn_id: u64) -> Vec<String> {
    let mut chunks = Vec::new();
    loop {
        let event = next_event(ws).await;
        match event["type"].as_str() {
            Some("response_chunk") if event["turnId"] == json!(turn_id) => {
                chunks.push(event["text"].as_str().unwrap().to_string());
            }
            Some("response_end") if event["turnId"] == json!(turn_id) => return chunks,
            _ => {}
        }
    }
}

fn utterance(text: &str, is_final: bool) -> Value {
    json!({"type": "caller_utterance", "text": text, "isFinal": is_final})
}

// =============================================================================
// Call Flow Tests
// =============================================================================

/// The agent speaks first: a configured greeting arrives as a closed turn
/// before the caller says anything.
#[tokio::test]
async fn test_greeting_is_sent_on_connect() {
    let addr = spawn_gateway(vec![], Some("Hi, thanks for calling!")).await;
    let mut ws = connect(addr, "call_greeting").await;

    let chunk = next_event(&mut ws).await;
    assert_eq!(chunk["type"], "response_chunk");
    assert_eq!(chunk["text"], "Hi, thanks for calling!");
    assert_eq!(chunk["turnId"], 0);

    let end = next_event(&mut ws).await;
    assert_eq!(end["type"], "response_end");
    assert_eq!(end["turnId"], 0);
}

/// One final utterance produces exactly one chunk stream followed by one
/// response_end with a matching turn id.
#[tokio::test]
async fn test_final_utterance_streams_one_response() {
    let scripts = vec![Script::chunks(vec!["It's ", "sunny ", "today."])];
    let addr = spawn_gateway(scripts, None).await;
    let mut ws = connect(addr, "call_weather").await;

    send_event(&mut ws, utterance("What's the weather?", true)).await;

    // Caller turn 0, agent turn 1
    let chunks = collect_response(&mut ws, 1).await;
    assert_eq!(chunks, vec!["It's ", "sunny ", "today."]);

    // Nothing further is queued for this turn
    let quiet = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(quiet.is_err(), "unexpected frame after response_end");
}

/// Partial updates never trigger a generation on their own.
#[tokio::test]
async fn test_partial_updates_stay_silent() {
    let addr = spawn_gateway(vec![], None).await;
    let mut ws = connect(addr, "call_partial").await;

    send_event(&mut ws, utterance("What's", false)).await;
    send_event(&mut ws, utterance("What's the", false)).await;

    let quiet = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(quiet.is_err(), "partial update triggered output");
}

/// An interruption mid-stream closes the turn with only the chunks already
/// sent; no chunk for that turn follows the response_end.
#[tokio::test]
async fn test_interruption_stops_stream() {
    let scripts = vec![Script::slow(
        vec!["one ", "two ", "three ", "four ", "five"],
        Duration::from_millis(50),
    )];
    let addr = spawn_gateway(scripts, None).await;
    let mut ws = connect(addr, "call_bargein").await;

    send_event(&mut ws, utterance("Tell me everything", true)).await;

    // Wait for the first chunk, then barge in
    let first = next_event(&mut ws).await;
    assert_eq!(first["type"], "response_chunk");
    send_event(&mut ws, json!({"type": "interruption"})).await;

    // The turn must close, and nothing may follow its end
    let mut saw_end = false;
    loop {
        match timeout(Duration::from_millis(500), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let event: Value = serde_json::from_str(text.as_str()).unwrap();
                if saw_end {
                    assert_ne!(
                        event["type"], "response_chunk",
                        "chunk observed after response_end"
                    );
                }
                if event["type"] == "response_end" && event["turnId"] == json!(1) {
                    saw_end = true;
                }
            }
            _ => break,
        }
    }
    assert!(saw_end, "interrupted turn was never closed");
}

/// Scenario: the upstream stream dies mid-response. The caller still hears a
/// closed turn (fallback utterance), and the session keeps working.
#[tokio::test]
async fn test_upstream_failure_speaks_fallback_and_recovers() {
    let scripts = vec![
        Script::failing(
            vec!["Let me "],
            CompletionError::Timeout("upstream stalled".to_string()),
        ),
        Script::chunks(vec!["Back again."]),
    ];
    let addr = spawn_gateway(scripts, None).await;
    let mut ws = connect(addr, "call_upstream_error").await;

    send_event(&mut ws, utterance("Question one", true)).await;

    let partial = next_event(&mut ws).await;
    assert_eq!(partial["type"], "response_chunk");
    assert_eq!(partial["text"], "Let me ");

    let error = next_event(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["reasonCode"], "timeout");

    let fallback = next_event(&mut ws).await;
    assert_eq!(fallback["type"], "response_chunk");
    assert_eq!(fallback["text"], "Sorry, could you say that again?");

    let end = next_event(&mut ws).await;
    assert_eq!(end["type"], "response_end");
    assert_eq!(end["turnId"], 1);

    // The session remains usable for the next utterance
    send_event(&mut ws, utterance("Question two", true)).await;
    let chunks = collect_response(&mut ws, 3).await;
    assert_eq!(chunks, vec!["Back again."]);
}

/// A second connection for a live call id is rejected; the first connection
/// is unaffected.
#[tokio::test]
async fn test_duplicate_connection_rejected() {
    let scripts = vec![Script::chunks(vec!["still here"])];
    let addr = spawn_gateway(scripts, None).await;
    let mut first = connect(addr, "call_dup").await;

    let second = connect_async(format!("ws://{addr}/call_dup")).await;
    match second {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 409);
        }
        other => panic!("Expected HTTP 409 rejection, got {other:?}"),
    }

    // First connection still serves responses
    send_event(&mut first, utterance("You still there?", true)).await;
    let chunks = collect_response(&mut first, 1).await;
    assert_eq!(chunks, vec!["still here"]);
}

/// A call id becomes connectable again once its first connection is gone.
#[tokio::test]
async fn test_call_id_released_after_disconnect() {
    let scripts = vec![Script::chunks(vec!["first"]), Script::chunks(vec!["second"])];
    let addr = spawn_gateway(scripts, None).await;

    let mut first = connect(addr, "call_reuse").await;
    send_event(&mut first, utterance("hello", true)).await;
    collect_response(&mut first, 1).await;
    first.close(None).await.unwrap();

    // Give the server a beat to run teardown
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut second = connect(addr, "call_reuse").await;
    send_event(&mut second, utterance("hello again", true)).await;
    let chunks = collect_response(&mut second, 1).await;
    assert_eq!(chunks, vec!["second"]);
}

/// Keepalive pings are answered with pongs echoing the timestamp.
#[tokio::test]
async fn test_ping_pong_keepalive() {
    let addr = spawn_gateway(vec![], None).await;
    let mut ws = connect(addr, "call_ping").await;

    send_event(&mut ws, json!({"type": "ping", "timestamp": 1722700000})).await;

    let pong = next_event(&mut ws).await;
    assert_eq!(pong["type"], "pong");
    assert_eq!(pong["timestamp"], 1722700000);
}

/// Malformed frames are dropped; the call stays alive.
#[tokio::test]
async fn test_malformed_message_is_dropped() {
    let scripts = vec![Script::chunks(vec!["unbothered"])];
    let addr = spawn_gateway(scripts, None).await;
    let mut ws = connect(addr, "call_malformed").await;

    ws.send(Message::Text("this is not json".to_string().into()))
        .await
        .unwrap();
    send_event(&mut ws, json!({"type": "made_up_event"})).await;

    send_event(&mut ws, utterance("Still with me?", true)).await;
    let chunks = collect_response(&mut ws, 1).await;
    assert_eq!(chunks, vec!["unbothered"]);
}

/// call_end tears the connection down server-side.
#[tokio::test]
async fn test_call_end_closes_connection() {
    let addr = spawn_gateway(vec![], None).await;
    let mut ws = connect(addr, "call_bye").await;

    send_event(&mut ws, json!({"type": "call_end"})).await;

    // The server closes; the client observes a close frame or stream end
    let closed = timeout(Duration::from_secs(3), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return true,
            }
        }
    })
    .await
    .expect("server never closed the connection");
    assert!(closed);
}

/// An idle call is torn down proactively with an idle_timeout error.
#[tokio::test]
async fn test_idle_call_is_torn_down() {
    let config = create_test_config(1, None);
    let addr = spawn_gateway_with_config(config, vec![]).await;
    let mut ws = connect(addr, "call_idle").await;

    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "error");
    assert_eq!(event["reasonCode"], "idle_timeout");

    let closed = timeout(Duration::from_secs(3), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return true,
            }
        }
    })
    .await
    .expect("idle connection never closed");
    assert!(closed);
}

/// Two calls run independently; one call's traffic never leaks into the
/// other's connection.
#[tokio::test]
async fn test_concurrent_calls_are_isolated() {
    let scripts = vec![
        Script::chunks(vec!["answer for a"]),
        Script::chunks(vec!["answer for b"]),
    ];
    let addr = spawn_gateway(scripts, None).await;

    let mut ws_a = connect(addr, "call_a").await;
    let mut ws_b = connect(addr, "call_b").await;

    send_event(&mut ws_a, utterance("question a", true)).await;
    let chunks_a = collect_response(&mut ws_a, 1).await;

    send_event(&mut ws_b, utterance("question b", true)).await;
    let chunks_b = collect_response(&mut ws_b, 1).await;

    assert_eq!(chunks_a, vec!["answer for a"]);
    assert_eq!(chunks_b, vec!["answer for b"]);
}
