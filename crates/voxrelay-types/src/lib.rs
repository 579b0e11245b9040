//! Shared types for the voxrelay workspace.
//!
//! This crate holds the plain data that crosses crate boundaries: the
//! classified view of a gateway conversation history, the assistant reply
//! snapshot used to detect a fresh reply, the rule set that classifies
//! messages, and voice catalog entries.
//!
//! Nothing here performs I/O.

pub mod message;
pub mod rules;
pub mod voice;

pub use message::{AssistantSnapshot, HistoryMessage, MessageKind, Role};
pub use rules::MessageRules;
pub use voice::{VoiceCatalog, VoiceInfo};
