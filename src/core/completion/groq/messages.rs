//! Request/response types for Groq's OpenAI-compatible chat-completions API.

use serde::{Deserialize, Serialize};

use crate::core::completion::{PromptContext, PromptTurn};
use crate::core::conversation::Role;

// =============================================================================
// Request Types
// =============================================================================

/// Streaming chat-completions request body.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One message in the upstream request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn from_turn(turn: &PromptTurn) -> Self {
        let role = match turn.role {
            Role::Agent => "assistant",
            Role::Caller => "user",
        };
        Self {
            role: role.to_string(),
            content: turn.content.clone(),
        }
    }
}

impl ChatCompletionRequest {
    /// Build a streaming request from a prompt context.
    ///
    /// The system prompt leads, transcript turns follow in order with the
    /// caller mapped to `user` and the agent to `assistant`.
    pub fn from_context(
        context: &PromptContext,
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        let mut messages = Vec::with_capacity(context.turns.len() + 1);
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: context.system.clone(),
        });
        messages.extend(context.turns.iter().map(ChatMessage::from_turn));

        Self {
            model: model.to_string(),
            messages,
            stream: true,
            temperature,
            max_tokens,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// One server-sent chunk of a streamed completion.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamChunk {
    /// Text carried by the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}

/// Error envelope Groq returns on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

// =============================================================================
// SSE Parsing
// =============================================================================

/// A parsed server-sent-events line.
#[derive(Debug)]
pub enum SseEvent {
    /// A data line holding a completion chunk.
    Chunk(StreamChunk),
    /// The `[DONE]` terminator.
    Done,
}

/// Parse one SSE line. Comments, blank lines, and unparseable payloads all
/// come back as `None`; the caller skips them.
pub fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let data = line.strip_prefix("data:")?.trim_start();

    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    serde_json::from_str::<StreamChunk>(data)
        .ok()
        .map(SseEvent::Chunk)
}
