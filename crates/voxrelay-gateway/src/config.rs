use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_url() -> String {
    "http://127.0.0.1:18789".to_string()
}

fn default_session_key() -> String {
    "agent:main:main".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_history_limit() -> usize {
    20
}

fn default_model() -> String {
    "clawdbot:main".to_string()
}

fn default_session_header() -> String {
    "x-clawdbot-session-key".to_string()
}

fn default_reset_command() -> String {
    "/reset".to_string()
}

fn default_echo_channel() -> String {
    "telegram".to_string()
}

fn default_grace_ms() -> u64 {
    2000
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_max_polls() -> u32 {
    90
}

fn default_no_response_text() -> String {
    "No response".to_string()
}

/// How the orchestrator obtains the agent's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// Fire the message into the session and poll history for the reply.
    #[default]
    Poll,
    /// Ask the chat-completion endpoint directly and read its answer.
    Complete,
}

/// Connection and session settings for the agent gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the gateway, without a trailing slash.
    #[serde(default = "default_url")]
    pub url: String,

    /// The single shared conversation session this relay talks to.
    #[serde(default = "default_session_key")]
    pub session_key: String,

    /// Per-request timeout. Generous because the gateway may block while
    /// the agent computes a reply.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_model")]
    pub model: String,

    /// Header carrying the session key on chat-completion calls.
    #[serde(default = "default_session_header")]
    pub session_header: String,

    #[serde(default)]
    pub reply_mode: ReplyMode,

    /// Message sent into the session to reset it.
    #[serde(default = "default_reset_command")]
    pub reset_command: String,

    #[serde(default = "default_echo_channel")]
    pub echo_channel: String,

    /// Side-channel recipient for transcript/reply announcements. Empty
    /// disables echoing.
    #[serde(default)]
    pub echo_target: String,

    /// Replies longer than this are summarised before being spoken.
    /// Zero disables summarisation.
    #[serde(default)]
    pub summary_threshold_chars: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            session_key: default_session_key(),
            timeout_secs: default_timeout_secs(),
            history_limit: default_history_limit(),
            model: default_model(),
            session_header: default_session_header(),
            reply_mode: ReplyMode::default(),
            reset_command: default_reset_command(),
            echo_channel: default_echo_channel(),
            echo_target: String::new(),
            summary_threshold_chars: 0,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn echo_enabled(&self) -> bool {
        !self.echo_target.trim().is_empty()
    }
}

/// Timing of the reply-wait poll loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyWaitConfig {
    /// Delay between firing the message and the first poll.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Upper bound on history polls before giving up.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    /// Reply reported in-band when the agent does not answer in time.
    #[serde(default = "default_no_response_text")]
    pub no_response_text: String,
}

impl Default for ReplyWaitConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            interval_ms: default_interval_ms(),
            max_polls: default_max_polls(),
            no_response_text: default_no_response_text(),
        }
    }
}

impl ReplyWaitConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Wall-clock time spent sleeping before the loop gives up.
    pub fn ceiling(&self) -> Duration {
        self.grace() + self.interval() * self.max_polls.saturating_sub(1)
    }
}
