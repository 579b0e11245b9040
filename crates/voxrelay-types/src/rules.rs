//! Configurable classification rules for gateway history entries.
//!
//! The agent's output conventions change over time (new sentinel tokens,
//! new echo prefixes), so the rule set is data rather than code: it is
//! deserialised from the `[rules]` configuration section and shared by the
//! component that produces echo announcements, the history classifier and
//! the speech sanitizer.

use crate::message::{MessageKind, Role};
use serde::{Deserialize, Serialize};

fn default_no_content_markers() -> Vec<String> {
    vec!["NO_REPLY".to_string()]
}

fn default_heartbeat_markers() -> Vec<String> {
    vec!["HEARTBEAT_OK".to_string()]
}

fn default_media_only_markers() -> Vec<String> {
    vec![
        "<media:audio>".to_string(),
        "<media:image>".to_string(),
        "<media:video>".to_string(),
        "<media:document>".to_string(),
    ]
}

fn default_media_line_prefixes() -> Vec<String> {
    vec!["MEDIA:".to_string()]
}

fn default_transcript_echo_prefix() -> String {
    "🎤".to_string()
}

fn default_reply_echo_prefix() -> String {
    "⚡".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRules {
    /// Whole-message tokens meaning "the agent chose not to reply".
    #[serde(default = "default_no_content_markers")]
    pub no_content_markers: Vec<String>,

    /// Whole-message tokens acknowledging a heartbeat poll.
    #[serde(default = "default_heartbeat_markers")]
    pub heartbeat_markers: Vec<String>,

    /// Whole-message placeholders standing in for an attachment.
    #[serde(default = "default_media_only_markers")]
    pub media_only_markers: Vec<String>,

    /// Line prefixes marking a media reference line.
    #[serde(default = "default_media_line_prefixes")]
    pub media_line_prefixes: Vec<String>,

    /// Prefix this relay puts on the transcript it announces.
    #[serde(default = "default_transcript_echo_prefix")]
    pub transcript_echo_prefix: String,

    /// Prefix this relay puts on the reply it announces.
    #[serde(default = "default_reply_echo_prefix")]
    pub reply_echo_prefix: String,

    /// Additional echo prefixes from earlier relay revisions.
    #[serde(default)]
    pub extra_echo_prefixes: Vec<String>,
}

impl Default for MessageRules {
    fn default() -> Self {
        Self {
            no_content_markers: default_no_content_markers(),
            heartbeat_markers: default_heartbeat_markers(),
            media_only_markers: default_media_only_markers(),
            media_line_prefixes: default_media_line_prefixes(),
            transcript_echo_prefix: default_transcript_echo_prefix(),
            reply_echo_prefix: default_reply_echo_prefix(),
            extra_echo_prefixes: Vec::new(),
        }
    }
}

impl MessageRules {
    /// Formats the announcement of a user's transcript.
    pub fn transcript_echo(&self, transcript: &str) -> String {
        format!("{} {}", self.transcript_echo_prefix, transcript)
    }

    /// Formats the announcement of the agent's reply.
    pub fn reply_echo(&self, reply: &str) -> String {
        format!("{} {}", self.reply_echo_prefix, reply)
    }

    /// Every prefix that marks a message as one of this relay's own echoes.
    pub fn echo_prefixes(&self) -> impl Iterator<Item = &str> {
        [
            self.transcript_echo_prefix.as_str(),
            self.reply_echo_prefix.as_str(),
        ]
        .into_iter()
        .chain(self.extra_echo_prefixes.iter().map(String::as_str))
        .filter(|p| !p.is_empty())
    }

    /// Every reserved token that must never be spoken as reply content.
    pub fn sentinels(&self) -> impl Iterator<Item = &str> {
        self.no_content_markers
            .iter()
            .chain(&self.heartbeat_markers)
            .chain(&self.media_only_markers)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn is_echo(&self, text: &str) -> bool {
        let trimmed = text.trim_start();
        self.echo_prefixes().any(|p| trimmed.starts_with(p))
    }

    pub fn is_media_line(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        self.media_line_prefixes
            .iter()
            .any(|p| !p.is_empty() && trimmed.starts_with(p.as_str()))
    }

    /// Removes media reference lines and trims the result.
    pub fn strip_media_lines(&self, text: &str) -> String {
        text.lines()
            .filter(|line| !self.is_media_line(line))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// Classifies a history entry and returns its kind together with the
    /// text that remains once media reference lines are removed.
    pub fn classify(&self, role: Role, text: &str) -> (MessageKind, String) {
        match role {
            Role::User => (MessageKind::User, text.trim().to_string()),
            Role::Other => (MessageKind::Other, text.trim().to_string()),
            Role::Assistant => {
                let trimmed = text.trim();
                if self.is_echo(trimmed) {
                    return (MessageKind::SystemEcho, trimmed.to_string());
                }
                if self.media_only_markers.iter().any(|m| m == trimmed) {
                    return (MessageKind::MediaOnly, String::new());
                }

                let cleaned = self.strip_media_lines(trimmed);
                let kind = if self.no_content_markers.iter().any(|m| *m == cleaned) {
                    MessageKind::Silent
                } else if self.heartbeat_markers.iter().any(|m| *m == cleaned) {
                    MessageKind::Heartbeat
                } else if cleaned.is_empty() && !trimmed.is_empty() {
                    MessageKind::MediaOnly
                } else if cleaned.is_empty() {
                    MessageKind::Silent
                } else {
                    MessageKind::Agent
                };

                let text = if kind == MessageKind::Agent {
                    cleaned
                } else {
                    String::new()
                };
                (kind, text)
            }
        }
    }
}
