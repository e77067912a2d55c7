//! Configuration module for the VoiceLink gateway.
//!
//! Configuration comes from three sources, highest priority first: a YAML
//! file (when passed on the command line), environment variables (with .env
//! loaded at startup), and built-in defaults. The merged result is validated
//! once and read-only for the life of the process.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod yaml;

pub use yaml::YamlConfig;

/// Default bind host.
const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port.
const DEFAULT_PORT: u16 = 8080;

/// System prompt used when no prompt file is present.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// File the system prompt is read from unless overridden.
const DEFAULT_SYSTEM_PROMPT_FILE: &str = "system_prompt.txt";

/// Opening line the agent speaks as soon as a call connects.
const DEFAULT_GREETING: &str = "Hi, thanks for calling. How can I help you today?";

/// Utterance spoken when the upstream completion fails mid-turn.
const DEFAULT_FALLBACK_UTTERANCE: &str = "Sorry, I didn't catch that. Could you say it again?";

/// Transcript turns sent upstream per request.
const DEFAULT_MAX_HISTORY_TURNS: usize = 6;

/// Seconds of silence before an idle call is torn down.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Seconds a single generation may run before being cancelled.
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the gateway: bind address and TLS,
/// upstream completion provider settings, conversation behavior (system
/// prompt, greeting, fallback utterance, history window), timeouts, and CORS.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Upstream completion provider
    /// Provider name resolved by the completion factory (currently "groq")
    pub completion_provider: String,
    /// Groq API key for streaming chat completions
    pub groq_api_key: Option<String>,
    /// Model identifier sent upstream
    pub model: String,
    /// Sampling temperature (0.0 to 2.0)
    pub temperature: f32,
    /// Maximum completion tokens per response
    pub max_tokens: u32,

    // Conversation behavior
    /// System prompt, resolved from file at load time
    pub system_prompt: String,
    /// Opening line spoken on connect; None disables the greeting
    pub greeting: Option<String>,
    /// Utterance spoken when a generation fails
    pub fallback_utterance: String,
    /// Transcript turns included in each upstream request
    pub max_history_turns: usize,

    // Timeouts
    /// Idle seconds (no inbound event, no live generation) before teardown
    pub idle_timeout_secs: u64,
    /// Seconds a generation may run before cancellation
    pub generation_timeout_secs: u64,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            completion_provider: "groq".to_string(),
            groq_api_key: None,
            model: crate::core::completion::GroqCompletionConfig::default().model,
            temperature: 0.6,
            max_tokens: 150,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting: Some(DEFAULT_GREETING.to_string()),
            fallback_utterance: DEFAULT_FALLBACK_UTTERANCE.to_string(),
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            generation_timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
            cors_allowed_origins: None,
        }
    }
}

/// Zeroize the provider credential when the config is dropped so the secret
/// does not linger in freed memory.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.groq_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables over defaults.
    ///
    /// `.env` is loaded in main.rs before this runs, so its values are
    /// visible here as ordinary environment variables (with actual ENV vars
    /// taking precedence).
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            config.port = port
                .parse()
                .map_err(|e| format!("Invalid PORT '{port}': {e}"))?;
        }

        config.tls = match (env::var("TLS_CERT_PATH"), env::var("TLS_KEY_PATH")) {
            (Ok(cert), Ok(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (Err(_), Err(_)) => None,
            _ => {
                return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into());
            }
        };

        if let Ok(provider) = env::var("COMPLETION_PROVIDER") {
            config.completion_provider = provider;
        }
        if let Ok(key) = env::var("GROQ_API_KEY") {
            config.groq_api_key = Some(key);
        }
        if let Ok(model) = env::var("MODEL_ID") {
            config.model = model;
        }
        if let Ok(temperature) = env::var("TEMPERATURE") {
            config.temperature = temperature
                .parse()
                .map_err(|e| format!("Invalid TEMPERATURE '{temperature}': {e}"))?;
        }
        if let Ok(max_tokens) = env::var("MAX_TOKENS") {
            config.max_tokens = max_tokens
                .parse()
                .map_err(|e| format!("Invalid MAX_TOKENS '{max_tokens}': {e}"))?;
        }

        let prompt_file = env::var("SYSTEM_PROMPT_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SYSTEM_PROMPT_FILE));
        config.system_prompt = read_system_prompt(&prompt_file);

        if let Ok(greeting) = env::var("GREETING") {
            config.greeting = normalize_optional(greeting);
        }
        if let Ok(fallback) = env::var("FALLBACK_UTTERANCE") {
            config.fallback_utterance = fallback;
        }
        if let Ok(turns) = env::var("MAX_HISTORY_TURNS") {
            config.max_history_turns = turns
                .parse()
                .map_err(|e| format!("Invalid MAX_HISTORY_TURNS '{turns}': {e}"))?;
        }
        if let Ok(secs) = env::var("IDLE_TIMEOUT_SECS") {
            config.idle_timeout_secs = secs
                .parse()
                .map_err(|e| format!("Invalid IDLE_TIMEOUT_SECS '{secs}': {e}"))?;
        }
        if let Ok(secs) = env::var("GENERATION_TIMEOUT_SECS") {
            config.generation_timeout_secs = secs
                .parse()
                .map_err(|e| format!("Invalid GENERATION_TIMEOUT_SECS '{secs}': {e}"))?;
        }
        if let Ok(origins) = env::var("CORS_ALLOWED_ORIGINS") {
            config.cors_allowed_origins = normalize_optional(origins);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file layered over the environment.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. Default values
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::from_env()?;
        let yaml_config = YamlConfig::from_file(path)?;
        yaml_config.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Get the server address as a string in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Validate the merged configuration.
    fn validate(&self) -> Result<(), String> {
        if self.completion_provider.trim().is_empty() {
            return Err("completion provider must not be empty".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("model identifier must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be at least 1".to_string());
        }
        if self.max_history_turns == 0 {
            return Err("max_history_turns must be at least 1".to_string());
        }
        if self.idle_timeout_secs == 0 {
            return Err("idle timeout must be at least 1 second".to_string());
        }
        if self.generation_timeout_secs == 0 {
            return Err("generation timeout must be at least 1 second".to_string());
        }
        Ok(())
    }
}

/// Read the system prompt file, falling back to the built-in prompt when the
/// file is absent or unreadable.
pub(crate) fn read_system_prompt(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                DEFAULT_SYSTEM_PROMPT.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => DEFAULT_SYSTEM_PROMPT.to_string(),
    }
}

/// Empty strings disable optional settings ("" unsets the greeting).
fn normalize_optional(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}
