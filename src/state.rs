//! Shared application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::completion::{BoxedCompletion, create_completion_provider};
use crate::errors::app_error::AppResult;
use crate::handlers::call::SessionRegistry;

/// State shared by every handler.
///
/// Owns the read-only configuration, the call-id to session registry, and
/// the completion provider. The registry lives here, not in a static, so
/// tests can stand up isolated instances side by side.
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<SessionRegistry>,
    pub completion: BoxedCompletion,
}

impl AppState {
    /// Build state from configuration, resolving the completion provider
    /// through the factory.
    pub async fn new(config: ServerConfig) -> AppResult<Arc<Self>> {
        let completion = create_completion_provider(&config)?;
        Ok(Self::with_provider(config, completion))
    }

    /// Build state around an existing provider. This is the seam tests use
    /// to substitute a scripted completion backend.
    pub fn with_provider(config: ServerConfig, completion: BoxedCompletion) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::new()),
            completion,
        })
    }
}
