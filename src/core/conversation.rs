//! Per-call conversation transcript.
//!
//! The conversation is an ordered sequence of turns, one per contiguous
//! utterance by either party. The trailing turn may still be accumulating
//! content (partial caller speech, or agent text that is still streaming);
//! every earlier turn is sealed. Turn completeness is monotonic and enforced
//! here: once a turn is marked complete its content never changes, whatever
//! the caller asks for.
//!
//! Only the owning call session mutates a conversation, so this type carries
//! no locking of its own.

use serde::{Deserialize, Serialize};

use super::completion::PromptTurn;

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human on the phone.
    Caller,
    /// The assistant whose responses this gateway generates.
    Agent,
}

/// One contiguous utterance by either party.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub complete: bool,
}

/// Ordered transcript for one call.
///
/// Turn ids are positions in the transcript and never reused; they double as
/// the `turnId` carried on outbound wire events.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a turn for `role`, or refresh the one already open.
    ///
    /// A later partial update from the same speaker replaces the trailing
    /// incomplete turn's content rather than appending a new turn. A turn
    /// opened by the other party seals any partial turn the previous speaker
    /// left behind, so at most one turn is ever incomplete.
    ///
    /// Returns the id of the turn now holding `content`.
    pub fn append_or_update_turn(&mut self, role: Role, content: impl Into<String>) -> u64 {
        let content = content.into();
        if let Some(last) = self.turns.last_mut()
            && !last.complete
        {
            if last.role == role {
                last.content = content;
                return (self.turns.len() - 1) as u64;
            }
            last.complete = true;
        }
        self.turns.push(Turn {
            role,
            content,
            complete: false,
        });
        (self.turns.len() - 1) as u64
    }

    /// Append `chunk` to an in-progress turn.
    ///
    /// Returns false without touching anything when the turn does not exist
    /// or is already complete.
    pub fn append_to_turn(&mut self, turn_id: u64, chunk: &str) -> bool {
        match self.turns.get_mut(turn_id as usize) {
            Some(turn) if !turn.complete => {
                turn.content.push_str(chunk);
                true
            }
            _ => false,
        }
    }

    /// Seal a turn. Completing an already-complete turn is a no-op.
    pub fn complete_turn(&mut self, turn_id: u64) {
        if let Some(turn) = self.turns.get_mut(turn_id as usize) {
            turn.complete = true;
        }
    }

    /// Record a turn that arrives already sealed, e.g. the opening greeting
    /// the agent speaks before the caller says anything.
    pub fn push_complete_turn(&mut self, role: Role, content: impl Into<String>) -> u64 {
        let id = self.append_or_update_turn(role, content);
        self.complete_turn(id);
        id
    }

    pub fn turn(&self, turn_id: u64) -> Option<&Turn> {
        self.turns.get(turn_id as usize)
    }

    /// Id and turn of the trailing incomplete turn, if any.
    pub fn trailing_incomplete(&self) -> Option<(u64, &Turn)> {
        let last = self.turns.last()?;
        if last.complete {
            None
        } else {
            Some(((self.turns.len() - 1) as u64, last))
        }
    }

    /// The most recent turns as prompt context: complete turns plus the
    /// trailing in-progress one, if any, capped at `max_turns`.
    ///
    /// The cap keeps upstream latency flat as calls run long; a voice agent
    /// only ever needs the recent exchange.
    pub fn snapshot_for_prompt(&self, max_turns: usize) -> Vec<PromptTurn> {
        let start = self.turns.len().saturating_sub(max_turns);
        self.turns[start..]
            .iter()
            .map(|turn| PromptTurn {
                role: turn.role,
                content: turn.content.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
