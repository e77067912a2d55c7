//! Groq streaming completion client.
//!
//! Issues a single OpenAI-compatible `chat/completions` request with
//! `stream: true` and exposes the response as a chunk stream. The client
//! never retries: upstream trouble is classified and reported immediately so
//! the session can close the turn within its latency budget.

use async_stream::stream;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::super::base::{
    BaseCompletion, CompletionError, CompletionResult, CompletionStream, PromptContext,
};
use super::config::GroqCompletionConfig;
use super::messages::{ChatCompletionRequest, ErrorResponse, SseEvent, parse_sse_line};

/// Groq chat-completions client implementing the [`BaseCompletion`] trait.
pub struct GroqCompletion {
    config: GroqCompletionConfig,
    client: Client,
}

impl GroqCompletion {
    pub fn new(config: GroqCompletionConfig) -> CompletionResult<Self> {
        if config.api_key.is_empty() {
            return Err(CompletionError::Provider(
                "Groq API key not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CompletionError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Map a transport-level failure onto the error taxonomy.
    fn classify_transport(e: reqwest::Error) -> CompletionError {
        if e.is_timeout() || e.is_connect() {
            CompletionError::Timeout(e.to_string())
        } else {
            CompletionError::Provider(e.to_string())
        }
    }

    /// Map a non-2xx status plus body onto the error taxonomy.
    fn classify_status(status: StatusCode, body: &str) -> CompletionError {
        let detail = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string());

        match status {
            StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited(detail),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                CompletionError::Timeout(detail)
            }
            _ => CompletionError::Provider(format!("HTTP {status}: {detail}")),
        }
    }
}

#[async_trait]
impl BaseCompletion for GroqCompletion {
    fn provider_name(&self) -> &'static str {
        "groq"
    }

    async fn start(
        &self,
        context: PromptContext,
        cancel: CancellationToken,
    ) -> CompletionResult<CompletionStream> {
        let request_id = Uuid::new_v4();
        let body = ChatCompletionRequest::from_context(
            &context,
            &self.config.model,
            self.config.temperature,
            self.config.max_tokens,
        );

        debug!(
            request_id = %request_id,
            model = %self.config.model,
            message_count = body.messages.len(),
            "Starting streaming completion request"
        );

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = Self::classify_status(status, &body);
            warn!(request_id = %request_id, status = %status, "Completion request rejected: {err}");
            return Err(err);
        }

        let mut bytes = response.bytes_stream();

        let chunks = stream! {
            let mut buf = BytesMut::new();
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(request_id = %request_id, "Completion stream cancelled");
                        return;
                    }
                    frame = bytes.next() => frame,
                };

                match frame {
                    Some(Ok(data)) => {
                        buf.extend_from_slice(&data);
                        // SSE frames are newline-delimited; a line is only
                        // parsed once its terminator has arrived.
                        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                            let line = buf.split_to(pos + 1);
                            let line = String::from_utf8_lossy(&line);
                            match parse_sse_line(line.trim_end()) {
                                Some(SseEvent::Done) => {
                                    debug!(request_id = %request_id, "Completion stream finished");
                                    return;
                                }
                                Some(SseEvent::Chunk(chunk)) => {
                                    if let Some(text) = chunk.first_content()
                                        && !text.is_empty()
                                    {
                                        yield Ok(text.to_string());
                                    }
                                }
                                None => {}
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(request_id = %request_id, "Completion stream failed: {e}");
                        yield Err(Self::classify_transport(e));
                        return;
                    }
                    // Upstream closed without [DONE]; treat as a clean end.
                    None => return,
                }
            }
        };

        Ok(Box::pin(chunks))
    }
}
