//! YAML configuration file loading.
//!
//! Every field is optional; anything the file leaves out keeps the value
//! already merged from environment variables and defaults.
//!
//! # Example
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 8080
//!   cors_allowed_origins: "*"
//! completion:
//!   provider: groq
//!   model: llama-3.1-8b-instant
//!   temperature: 0.6
//!   max_tokens: 150
//! conversation:
//!   system_prompt_file: prompts/agent.txt
//!   greeting: "Hi, you've reached the support line."
//!   max_history_turns: 6
//! timeouts:
//!   idle_secs: 300
//!   generation_secs: 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{ServerConfig, TlsConfig, read_system_prompt};

/// Root of the YAML configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct YamlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub completion: CompletionSection,
    #[serde(default)]
    pub conversation: ConversationSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsSection>,
    pub cors_allowed_origins: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TlsSection {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletionSection {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationSection {
    pub system_prompt_file: Option<PathBuf>,
    pub greeting: Option<String>,
    pub fallback_utterance: Option<String>,
    pub max_history_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimeoutSection {
    pub idle_secs: Option<u64>,
    pub generation_secs: Option<u64>,
}

impl YamlConfig {
    /// Load and parse a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Overlay this file's values onto an already-loaded configuration.
    pub fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.server.host {
            config.host = host;
        }
        if let Some(port) = self.server.port {
            config.port = port;
        }
        if let Some(tls) = self.server.tls {
            config.tls = Some(TlsConfig {
                cert_path: tls.cert_path,
                key_path: tls.key_path,
            });
        }
        if let Some(origins) = self.server.cors_allowed_origins {
            config.cors_allowed_origins = Some(origins);
        }

        if let Some(provider) = self.completion.provider {
            config.completion_provider = provider;
        }
        if let Some(api_key) = self.completion.api_key {
            config.groq_api_key = Some(api_key);
        }
        if let Some(model) = self.completion.model {
            config.model = model;
        }
        if let Some(temperature) = self.completion.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.completion.max_tokens {
            config.max_tokens = max_tokens;
        }

        if let Some(prompt_file) = self.conversation.system_prompt_file {
            config.system_prompt = read_system_prompt(&prompt_file);
        }
        if let Some(greeting) = self.conversation.greeting {
            config.greeting = if greeting.trim().is_empty() {
                None
            } else {
                Some(greeting)
            };
        }
        if let Some(fallback) = self.conversation.fallback_utterance {
            config.fallback_utterance = fallback;
        }
        if let Some(turns) = self.conversation.max_history_turns {
            config.max_history_turns = turns;
        }

        if let Some(secs) = self.timeouts.idle_secs {
            config.idle_timeout_secs = secs;
        }
        if let Some(secs) = self.timeouts.generation_secs {
            config.generation_timeout_secs = secs;
        }
    }
}
