//! Groq streaming completion provider.
//!
//! Speaks Groq's OpenAI-compatible chat-completions API over SSE. Chosen as
//! the default provider for its inference speed; a voice conversation lives
//! or dies on first-token latency.

mod client;
mod config;
mod messages;

pub use client::GroqCompletion;
pub use config::GroqCompletionConfig;
pub use messages::{ChatCompletionRequest, ChatMessage, SseEvent, StreamChunk, parse_sse_line};
