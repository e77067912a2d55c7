//! Call WebSocket handling.
//!
//! One persistent connection per phone call, keyed by the call id in the
//! URL path. The handler owns the connection loop; the session owns the
//! conversation and the in-flight generation; the registry enforces the
//! one-live-session-per-call invariant.

pub mod handler;
pub mod messages;
pub mod registry;
pub mod session;

pub use handler::call_handler;
pub use messages::{
    IncomingMessage, MalformedMessageError, MessageRoute, OutgoingMessage, ReasonCode,
};
pub use registry::{DuplicateSessionError, SessionRegistry};
pub use session::{CallSession, CallState};
