//! Live call-session registry.
//!
//! Process-wide map from call id to its one live session. The registry is
//! owned by [`AppState`](crate::state::AppState) and handed to the connection
//! handler at construction; there is no ambient/static state. `DashMap`
//! keeps insertion atomic per key, so concurrent connect/disconnect on the
//! same call id cannot race while operations on different call ids never
//! contend.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

use super::session::CallSession;

/// A second connection arrived for a call id that already has a live one.
///
/// The platform opens at most one connection per call, so this points at a
/// misconfigured or retrying client; the first connection stays untouched.
#[derive(Debug, Error)]
#[error("call {call_id} already has a live connection")]
pub struct DuplicateSessionError {
    pub call_id: String,
}

/// Map of live sessions, one per call id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<CallSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session's call id. Fails without side effects when the id
    /// is already held by a live session.
    pub fn register(&self, session: Arc<CallSession>) -> Result<(), DuplicateSessionError> {
        match self.sessions.entry(session.call_id().to_string()) {
            Entry::Occupied(_) => Err(DuplicateSessionError {
                call_id: session.call_id().to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(session);
                Ok(())
            }
        }
    }

    /// Look up the live session for a call id.
    pub fn get(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.get(call_id).map(|entry| entry.clone())
    }

    /// Release a call id. Returns the session that held it, if any; calling
    /// again for the same id finds nothing and does nothing.
    pub fn remove(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.remove(call_id).map(|(_, session)| session)
    }

    /// Number of live calls.
    pub fn active_calls(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::core::completion::{
        BaseCompletion, CompletionResult, CompletionStream, PromptContext,
    };
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct SilentCompletion;

    #[async_trait]
    impl BaseCompletion for SilentCompletion {
        fn provider_name(&self) -> &'static str {
            "silent"
        }

        async fn start(
            &self,
            _context: PromptContext,
            _cancel: CancellationToken,
        ) -> CompletionResult<CompletionStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn make_session(call_id: &str) -> Arc<CallSession> {
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        CallSession::new(
            call_id.to_string(),
            Arc::new(ServerConfig::default()),
            Arc::new(SilentCompletion),
            tx,
        )
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = SessionRegistry::new();
        registry.register(make_session("call_a")).unwrap();

        assert_eq!(registry.active_calls(), 1);
        assert!(registry.get("call_a").is_some());
        assert!(registry.get("call_b").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_call_id_rejected() {
        let registry = SessionRegistry::new();
        registry.register(make_session("call_a")).unwrap();

        let err = registry.register(make_session("call_a")).unwrap_err();
        assert_eq!(err.call_id, "call_a");
        // The original session is unaffected
        assert_eq!(registry.active_calls(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.register(make_session("call_a")).unwrap();

        assert!(registry.remove("call_a").is_some());
        assert!(registry.remove("call_a").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_id_reusable_after_removal() {
        let registry = SessionRegistry::new();
        registry.register(make_session("call_a")).unwrap();
        registry.remove("call_a");

        assert!(registry.register(make_session("call_a")).is_ok());
    }
}
