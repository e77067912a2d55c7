//! Groq completion provider configuration.

use std::time::Duration;

/// Default Groq OpenAI-compatible API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default model. Llama 3.1 8B Instant is the latency sweet spot for voice.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Default sampling temperature. Kept low for fast, deterministic tokens.
pub const DEFAULT_TEMPERATURE: f32 = 0.6;

/// Default response cap. Voice replies should stay short.
pub const DEFAULT_MAX_TOKENS: u32 = 150;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default overall request timeout, including the streamed body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the Groq chat-completions client.
#[derive(Debug, Clone)]
pub struct GroqCompletionConfig {
    /// API key (`gsk_...`).
    pub api_key: String,
    /// Base URL, overridable for self-hosted gateways and tests.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature (0.0 to 2.0).
    pub temperature: f32,
    /// Maximum completion tokens per response.
    pub max_tokens: u32,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Overall request timeout; a stream still open past this errors out.
    pub request_timeout: Duration,
}

impl Default for GroqCompletionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl GroqCompletionConfig {
    /// Chat-completions endpoint derived from the base URL.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GroqCompletionConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_completions_url_strips_trailing_slash() {
        let config = GroqCompletionConfig {
            base_url: "http://localhost:9999/openai/v1/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.completions_url(),
            "http://localhost:9999/openai/v1/chat/completions"
        );
    }
}
