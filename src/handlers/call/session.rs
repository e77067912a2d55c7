//! Per-call session state machine.
//!
//! A session owns one call's transcript and, at most, one in-flight response
//! generation. Inbound events reach it in arrival order from the connection
//! loop, so transcript mutations are race-free by construction; the only
//! concurrent actor is the generation task the session itself spawns.
//!
//! The generation task is the sole producer of `response_chunk` /
//! `response_end` frames for its turn and emits the closing `response_end`
//! itself after it observes cancellation. Combined with the FIFO outbound
//! channel this gives the ordering guarantee the platform relies on: chunks
//! of a turn arrive in production order, and nothing follows that turn's
//! `response_end`.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::core::completion::{BoxedCompletion, CompletionError, PromptContext};
use crate::core::conversation::{Conversation, Role};

use super::messages::{MessageRoute, OutgoingMessage};

/// Call lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Connection accepted, greeting not yet sent
    Connecting,
    /// Ready for caller events; also covers the idle stretch between turns
    Active,
    /// A response generation is in flight
    Generating,
    /// Torn down; all further events are ignored
    Closed,
}

/// One in-flight response generation.
struct GenerationHandle {
    turn_id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct SessionInner {
    state: CallState,
    conversation: Conversation,
    generation: Option<GenerationHandle>,
}

/// State for one live call.
pub struct CallSession {
    call_id: String,
    config: Arc<ServerConfig>,
    provider: BoxedCompletion,
    outbound: mpsc::Sender<MessageRoute>,
    inner: Mutex<SessionInner>,
}

impl CallSession {
    pub fn new(
        call_id: String,
        config: Arc<ServerConfig>,
        provider: BoxedCompletion,
        outbound: mpsc::Sender<MessageRoute>,
    ) -> Arc<Self> {
        Arc::new(Self {
            call_id,
            config,
            provider,
            outbound,
            inner: Mutex::new(SessionInner {
                state: CallState::Connecting,
                conversation: Conversation::new(),
                generation: None,
            }),
        })
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn state(&self) -> CallState {
        self.inner.lock().state
    }

    pub fn is_generating(&self) -> bool {
        self.inner.lock().generation.is_some()
    }

    /// Number of transcript turns so far.
    pub fn transcript_len(&self) -> usize {
        self.inner.lock().conversation.len()
    }

    /// Move the session to Active and speak the configured greeting.
    ///
    /// The gateway talks first: the greeting lands in the transcript as an
    /// already-complete agent turn so the model sees it as history.
    pub async fn activate(&self) {
        let greeting = {
            let mut inner = self.inner.lock();
            if inner.state != CallState::Connecting {
                return;
            }
            inner.state = CallState::Active;
            self.config.greeting.clone().map(|text| {
                let turn_id = inner.conversation.push_complete_turn(Role::Agent, text.clone());
                (text, turn_id)
            })
        };

        if let Some((text, turn_id)) = greeting {
            self.send(OutgoingMessage::ResponseChunk { text, turn_id }).await;
            self.send(OutgoingMessage::ResponseEnd { turn_id }).await;
            debug!(call_id = %self.call_id, turn_id, "Greeting sent");
        }
    }

    /// Fold an incremental transcript update into the conversation.
    ///
    /// Caller speech landing while a response is still streaming is barge-in:
    /// the in-flight generation is cancelled before the transcript is
    /// touched, so at most one turn is ever open. A final utterance seals
    /// its turn and starts a response.
    pub async fn handle_caller_update(self: Arc<Self>, text: String, is_final: bool) {
        self.cancel_generation().await;

        {
            let mut inner = self.inner.lock();
            if inner.state == CallState::Closed {
                return;
            }
            let turn_id = inner.conversation.append_or_update_turn(Role::Caller, text);
            if is_final {
                inner.conversation.complete_turn(turn_id);
            }
        }

        if is_final {
            self.begin_generation().await;
        }
    }

    /// Explicit barge-in signal from the platform.
    ///
    /// The interrupted agent turn is closed with only the content streamed
    /// so far, keeping the transcript consistent with what was actually
    /// spoken to the caller.
    pub async fn handle_interruption(&self) {
        if self.is_generating() {
            info!(call_id = %self.call_id, "Caller interruption, cancelling generation");
        }
        self.cancel_generation().await;
    }

    /// Start a response generation for the current transcript.
    ///
    /// Any generation already in flight is cancelled and joined first, so
    /// its `response_end` is on the wire before the new turn's first chunk.
    pub async fn begin_generation(self: Arc<Self>) {
        self.cancel_generation().await;

        let mut inner = self.inner.lock();
        if inner.state == CallState::Closed {
            return;
        }

        let context = PromptContext {
            system: self.config.system_prompt.clone(),
            turns: inner
                .conversation
                .snapshot_for_prompt(self.config.max_history_turns),
        };
        let turn_id = inner.conversation.append_or_update_turn(Role::Agent, "");
        inner.state = CallState::Generating;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Self::run_generation(
            self.clone(),
            turn_id,
            context,
            cancel.clone(),
        ));
        inner.generation = Some(GenerationHandle {
            turn_id,
            cancel,
            task,
        });
    }

    /// Tear the session down. Idempotent; the generation task, if any, gets
    /// to close its turn on the way out.
    pub async fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == CallState::Closed {
                return;
            }
            inner.state = CallState::Closed;
        }
        self.cancel_generation().await;
        info!(call_id = %self.call_id, "Session closed");
    }

    /// Cancel the live generation, if any, and wait for its task to finish.
    ///
    /// Joining matters: the task emits the turn's `response_end` as it winds
    /// down, and waiting here keeps that frame ahead of whatever the caller
    /// sends next.
    async fn cancel_generation(&self) {
        let handle = self.inner.lock().generation.take();
        if let Some(handle) = handle {
            debug!(call_id = %self.call_id, turn_id = handle.turn_id, "Cancelling generation");
            handle.cancel.cancel();
            let _ = handle.task.await;
        }
    }

    /// Body of the spawned generation task.
    async fn run_generation(
        session: Arc<Self>,
        turn_id: u64,
        context: PromptContext,
        cancel: CancellationToken,
    ) {
        debug!(call_id = %session.call_id, turn_id, "Starting generation");

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                session.finish_turn(turn_id).await;
                return;
            }
            result = session.provider.start(context, cancel.clone()) => result,
        };

        let mut stream = match started {
            Ok(stream) => stream,
            Err(error) => {
                session.finish_turn_with_error(turn_id, error).await;
                return;
            }
        };

        let deadline = tokio::time::sleep(session.config.generation_timeout());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(call_id = %session.call_id, turn_id, "Generation cancelled");
                    session.finish_turn(turn_id).await;
                    return;
                }
                _ = &mut deadline => {
                    session.finish_turn_with_error(
                        turn_id,
                        CompletionError::Timeout("generation deadline exceeded".to_string()),
                    )
                    .await;
                    return;
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(text)) => {
                        {
                            let mut inner = session.inner.lock();
                            inner.conversation.append_to_turn(turn_id, &text);
                        }
                        session
                            .send(OutgoingMessage::ResponseChunk { text, turn_id })
                            .await;
                    }
                    Some(Err(error)) => {
                        session.finish_turn_with_error(turn_id, error).await;
                        return;
                    }
                    None => {
                        debug!(call_id = %session.call_id, turn_id, "Generation complete");
                        session.finish_turn(turn_id).await;
                        return;
                    }
                }
            }
        }
    }

    /// Seal the turn with whatever content it accumulated and announce the
    /// end of the response.
    async fn finish_turn(&self, turn_id: u64) {
        {
            let mut inner = self.inner.lock();
            inner.conversation.complete_turn(turn_id);
            inner.generation = None;
            if inner.state == CallState::Generating {
                inner.state = CallState::Active;
            }
        }
        self.send(OutgoingMessage::ResponseEnd { turn_id }).await;
    }

    /// Close the turn after an upstream failure.
    ///
    /// The caller must never be left waiting on a response that will not
    /// come: a short fallback utterance is spoken and recorded in the
    /// transcript, then the turn is sealed like any other.
    async fn finish_turn_with_error(&self, turn_id: u64, error: CompletionError) {
        warn!(call_id = %self.call_id, turn_id, "Generation failed: {error}");

        let fallback = self.config.fallback_utterance.clone();
        {
            let mut inner = self.inner.lock();
            let has_partial = inner
                .conversation
                .turn(turn_id)
                .is_some_and(|turn| !turn.content.is_empty());
            if has_partial {
                inner.conversation.append_to_turn(turn_id, " ");
            }
            inner.conversation.append_to_turn(turn_id, &fallback);
            inner.conversation.complete_turn(turn_id);
            inner.generation = None;
            if inner.state == CallState::Generating {
                inner.state = CallState::Active;
            }
        }

        self.send(OutgoingMessage::Error {
            reason_code: (&error).into(),
        })
        .await;
        self.send(OutgoingMessage::ResponseChunk {
            text: fallback,
            turn_id,
        })
        .await;
        self.send(OutgoingMessage::ResponseEnd { turn_id }).await;
    }

    async fn send(&self, message: OutgoingMessage) {
        // A closed channel means the connection is already gone; nothing
        // left to tell anyone.
        let _ = self.outbound.send(MessageRoute::Outgoing(message)).await;
    }
}
