//! Base trait and types for streaming completion providers.
//!
//! A completion provider turns a prompt context (system prompt plus recent
//! transcript turns) into a finite stream of text chunks. The stream is
//! consumed by a call session and forwarded to the platform as the agent's
//! spoken response, so latency rules everything here: providers must not
//! retry on their own. A silently retried call would wreck the perceived
//! turn-taking timing, and the retry decision belongs to the caller.
//!
//! Cancellation is cooperative. Providers receive a [`CancellationToken`]
//! and must stop producing between chunks once it fires; the session
//! guarantees nothing is forwarded after it observes the cancellation.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::conversation::Role;

// =============================================================================
// Error Types
// =============================================================================

/// Errors surfaced by a streaming completion call.
///
/// The three variants are the upstream reason codes the wire protocol knows
/// about; everything a provider can fail with must collapse into one of them.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Upstream rejected the request for quota reasons
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Upstream did not answer (or stopped answering) in time
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Anything else the provider reported
    #[error("provider error: {0}")]
    Provider(String),
}

/// Result type for completion operations.
pub type CompletionResult<T> = Result<T, CompletionError>;

/// A finite, non-restartable stream of response text chunks.
pub type CompletionStream = Pin<Box<dyn Stream<Item = CompletionResult<String>> + Send>>;

// =============================================================================
// Prompt Context
// =============================================================================

/// One transcript turn as sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTurn {
    pub role: Role,
    pub content: String,
}

/// Everything a provider needs to build one completion request.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    /// System prompt prepended to every request.
    pub system: String,
    /// Recent transcript, oldest first.
    pub turns: Vec<PromptTurn>,
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Streaming completion provider.
#[async_trait]
pub trait BaseCompletion: Send + Sync {
    /// Provider name for logs and factory lookups.
    fn provider_name(&self) -> &'static str;

    /// Issue one streaming completion request.
    ///
    /// Returns the chunk stream once upstream has accepted the request;
    /// request-level failures (bad status, connect timeout) surface here,
    /// mid-stream failures surface as `Err` items on the stream. The stream
    /// ends without further items as soon as `cancel` is observed.
    async fn start(
        &self,
        context: PromptContext,
        cancel: CancellationToken,
    ) -> CompletionResult<CompletionStream>;
}

/// Boxed completion provider for dynamic dispatch.
pub type BoxedCompletion = std::sync::Arc<dyn BaseCompletion>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompletionError::RateLimited("429 from upstream".to_string());
        assert_eq!(err.to_string(), "rate limited: 429 from upstream");

        let err = CompletionError::Timeout("no bytes for 30s".to_string());
        assert!(err.to_string().starts_with("request timed out"));
    }

    #[test]
    fn test_prompt_context_default_is_empty() {
        let context = PromptContext::default();
        assert!(context.system.is_empty());
        assert!(context.turns.is_empty());
    }
}
