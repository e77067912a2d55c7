//! Call WebSocket message types.
//!
//! Stateless translation between the platform's wire frames and the
//! gateway's internal event types. Inbound frames of unrecognized shape fail
//! with [`MalformedMessageError`]; the connection loop drops the frame and
//! logs, it never tears down the call over one bad message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::completion::CompletionError;

/// Maximum allowed size for a caller utterance (50 KB)
pub const MAX_UTTERANCE_SIZE: usize = 50 * 1024;

// =============================================================================
// Incoming Messages (Platform -> Server)
// =============================================================================

/// Incoming WebSocket messages from the voice platform
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    /// Incremental caller transcript; final when the utterance is done
    #[serde(rename_all = "camelCase")]
    CallerUtterance {
        /// Transcript text accumulated so far for this utterance
        text: String,
        /// Whether the platform considers the utterance finished
        #[serde(default)]
        is_final: bool,
    },

    /// Caller started talking over the agent; cancel the in-flight response
    Interruption,

    /// The call is over; the platform is about to close the connection
    CallEnd,

    /// Keepalive probe; echoed back as a pong
    Ping {
        /// Opaque timestamp, returned verbatim
        timestamp: u64,
    },
}

// =============================================================================
// Outgoing Messages (Server -> Platform)
// =============================================================================

/// Reason codes attached to outbound error events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Upstream rejected the generation for quota reasons
    RateLimited,
    /// Upstream (or the generation deadline) timed out
    Timeout,
    /// Any other upstream failure
    ProviderError,
    /// The call sat idle past the configured limit and was torn down
    IdleTimeout,
}

impl From<&CompletionError> for ReasonCode {
    fn from(error: &CompletionError) -> Self {
        match error {
            CompletionError::RateLimited(_) => ReasonCode::RateLimited,
            CompletionError::Timeout(_) => ReasonCode::Timeout,
            CompletionError::Provider(_) => ReasonCode::ProviderError,
        }
    }
}

/// Outgoing WebSocket messages to the voice platform
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    /// One streamed piece of the agent's response
    #[serde(rename_all = "camelCase")]
    ResponseChunk {
        /// Response text to synthesize
        text: String,
        /// Transcript turn this chunk belongs to
        turn_id: u64,
    },

    /// The turn is closed; no further chunks will follow for this turn id
    #[serde(rename_all = "camelCase")]
    ResponseEnd {
        /// Transcript turn being closed
        turn_id: u64,
    },

    /// Something went wrong; the reason code says what
    #[serde(rename_all = "camelCase")]
    Error {
        /// Machine-readable failure reason
        reason_code: ReasonCode,
    },

    /// Keepalive reply
    Pong {
        /// Timestamp copied from the ping
        timestamp: u64,
    },
}

// =============================================================================
// Message Routing
// =============================================================================

/// Frames routed to the connection's sender task
#[derive(Debug)]
pub enum MessageRoute {
    /// JSON text message
    Outgoing(OutgoingMessage),
    /// Close connection
    Close,
}

// =============================================================================
// Translation
// =============================================================================

/// Error type for inbound frames that cannot be translated
#[derive(Debug, Error)]
pub enum MalformedMessageError {
    /// The frame was not valid JSON or not a known event shape
    #[error("invalid message format: {0}")]
    Invalid(#[from] serde_json::Error),

    /// A field exceeded its size limit
    #[error("utterance too large: {size} bytes (max: {max} bytes)")]
    UtteranceTooLarge { size: usize, max: usize },
}

/// Decode one inbound text frame into an event.
pub fn decode(text: &str) -> Result<IncomingMessage, MalformedMessageError> {
    let message: IncomingMessage = serde_json::from_str(text)?;
    message.validate_size()?;
    Ok(message)
}

/// Encode one outbound event as a text frame.
pub fn encode(message: &OutgoingMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

impl IncomingMessage {
    /// Validates field sizes to prevent resource exhaustion from a
    /// misbehaving platform connection.
    pub fn validate_size(&self) -> Result<(), MalformedMessageError> {
        if let IncomingMessage::CallerUtterance { text, .. } = self {
            let size = text.len();
            if size > MAX_UTTERANCE_SIZE {
                return Err(MalformedMessageError::UtteranceTooLarge {
                    size,
                    max: MAX_UTTERANCE_SIZE,
                });
            }
        }
        Ok(())
    }
}
