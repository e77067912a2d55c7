//! Streaming completion providers.
//!
//! Providers implement [`BaseCompletion`]: one request in, a cancellable
//! stream of text chunks out. The factory resolves the provider configured
//! for the process; sessions only ever see the trait object.

mod base;
mod groq;

pub use base::{
    BaseCompletion, BoxedCompletion, CompletionError, CompletionResult, CompletionStream,
    PromptContext, PromptTurn,
};
pub use groq::{GroqCompletion, GroqCompletionConfig};

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;

/// Names accepted by [`create_completion_provider`].
pub fn get_supported_completion_providers() -> Vec<&'static str> {
    vec!["groq"]
}

/// Build the completion provider named in the server configuration.
pub fn create_completion_provider(config: &ServerConfig) -> CompletionResult<BoxedCompletion> {
    match config.completion_provider.to_lowercase().as_str() {
        "groq" => {
            let api_key = config
                .groq_api_key
                .clone()
                .ok_or_else(|| CompletionError::Provider("Groq API key not configured".into()))?;
            let provider = GroqCompletion::new(GroqCompletionConfig {
                api_key,
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                request_timeout: Duration::from_secs(config.generation_timeout_secs.max(30)),
                ..Default::default()
            })?;
            Ok(Arc::new(provider))
        }
        other => Err(CompletionError::Provider(format!(
            "Unsupported completion provider: {}. Supported: {:?}",
            other,
            get_supported_completion_providers()
        ))),
    }
}
