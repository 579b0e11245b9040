//! Classified conversation history and assistant reply snapshots.

use serde::{Deserialize, Serialize};

/// Author of a history entry as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Tool results, system notices and anything else the gateway records.
    Other,
}

impl Role {
    /// Maps a gateway role string onto a `Role`.
    pub fn from_gateway(role: &str) -> Self {
        match role {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other,
        }
    }
}

/// What a history entry is, decided once when the entry enters the relay.
///
/// Only [`MessageKind::Agent`] entries are eligible to be treated as a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Authored by the human side of the session.
    User,
    /// Authored by the agent and carrying speakable content.
    Agent,
    /// An announcement this relay injected into the session itself.
    SystemEcho,
    /// Heartbeat acknowledgement emitted by the agent.
    Heartbeat,
    /// The agent's explicit "nothing to say" marker, or an empty message.
    Silent,
    /// A message whose only content is media references.
    MediaOnly,
    /// Tool output and other non-conversational entries.
    Other,
}

impl MessageKind {
    pub fn is_qualifying(self) -> bool {
        matches!(self, MessageKind::Agent)
    }
}

/// A single classified entry of the gateway's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub kind: MessageKind,
    /// Message text with media-reference lines removed.
    pub text: String,
    /// Ordering marker (gateway timestamp in milliseconds, or a position
    /// fallback when the gateway omits it).
    pub marker: i64,
    /// `marker` is a 1-based position in the fetched window rather than a
    /// gateway timestamp.
    #[serde(default)]
    pub positional: bool,
}

/// The most recent qualifying assistant message at some point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantSnapshot {
    pub text: String,
    pub marker: i64,
}

impl AssistantSnapshot {
    pub fn new(text: impl Into<String>, marker: i64) -> Self {
        Self {
            text: text.into(),
            marker,
        }
    }

    /// The snapshot used when a history holds no qualifying message.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scans `messages` (oldest first) from the newest entry backwards and
    /// returns the last qualifying agent message with non-empty text.
    pub fn latest(messages: &[HistoryMessage]) -> Self {
        messages
            .iter()
            .rev()
            .find(|m| m.kind.is_qualifying() && !m.text.trim().is_empty())
            .map(|m| Self::new(m.text.trim(), m.marker))
            .unwrap_or_default()
    }

    /// Returns `true` when `self` represents a genuinely new reply relative
    /// to `earlier`: a strictly greater marker, non-empty text, and text that
    /// differs from the earlier snapshot.
    ///
    /// Marker equality alone is never enough; markers may be coarse and the
    /// gateway may replay an unchanged message under a new marker.
    pub fn supersedes(&self, earlier: &AssistantSnapshot) -> bool {
        self.marker > earlier.marker && !self.text.is_empty() && self.text != earlier.text
    }
}
