use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::history::parse_history;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use voxrelay_types::{HistoryMessage, MessageKind, MessageRules};

/// Upper bound on how much of an error body is kept in `GatewayError::Status`.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// A chat-completion turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Converts classified history into chat turns, keeping only what the
    /// user and the agent actually said.
    pub fn from_history(history: &[HistoryMessage]) -> Vec<Self> {
        history
            .iter()
            .filter(|m| !m.text.is_empty())
            .filter_map(|m| match m.kind {
                MessageKind::User => Some(Self::user(&m.text)),
                MessageKind::Agent => Some(Self::assistant(&m.text)),
                _ => None,
            })
            .collect()
    }
}

/// Operations the relay performs against the agent gateway's shared session.
///
/// Every call forwards the caller's bearer token untouched.
#[async_trait]
pub trait ConversationGateway: Send + Sync {
    /// Reads the tail of the session history, oldest first.
    async fn fetch_history(&self, token: &str, limit: usize) -> Result<Vec<HistoryMessage>, GatewayError>;

    /// Appends a user message to the session. May not return until the
    /// agent has finished replying.
    async fn send_message(&self, token: &str, message: &str) -> Result<Value, GatewayError>;

    /// Asks for a synchronous completion and returns the assistant content,
    /// if any.
    async fn chat_complete(
        &self,
        token: &str,
        messages: &[ChatMessage],
        session_hint: Option<&str>,
    ) -> Result<Option<String>, GatewayError>;

    /// Announces `text` on the configured side channel, if one is set.
    async fn echo(&self, token: &str, text: &str) -> Result<(), GatewayError>;

    /// Sends the reset command into the session.
    async fn reset_session(&self, token: &str) -> Result<(), GatewayError>;
}

/// HTTP client for the gateway's `/tools/invoke` and
/// `/v1/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
    rules: Arc<MessageRules>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, rules: Arc<MessageRules>) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config,
            rules,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    /// POSTs `body` as JSON with bearer auth.
    ///
    /// A 401 maps to [`GatewayError::Unauthorized`]; other non-2xx statuses
    /// map to [`GatewayError::Status`]. A 2xx body that is not valid JSON is
    /// returned as a JSON string rather than treated as an error.
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        token: &str,
        session_hint: Option<&str>,
    ) -> Result<Value, GatewayError> {
        let mut request = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(token)
            .json(body);
        if let Some(session) = session_hint {
            request = request.header(self.config.session_header.as_str(), session);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!(path, "gateway rejected token");
            return Err(GatewayError::Unauthorized);
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Generic remote-procedure call through `/tools/invoke`.
    ///
    /// Returns the `result` member of the envelope, or the whole body when
    /// there is no envelope. An envelope with `ok: false` is a tool error.
    pub async fn invoke_tool(&self, tool: &str, args: Value, token: &str) -> Result<Value, GatewayError> {
        let body = json!({ "tool": tool, "args": args });
        let response = self.post_json("/tools/invoke", &body, token, None).await?;

        if response.get("ok").and_then(Value::as_bool) == Some(false) {
            let message = response
                .get("error")
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string())
                })
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(GatewayError::Tool {
                tool: tool.to_string(),
                message,
            });
        }

        Ok(match response.get("result") {
            Some(result) => result.clone(),
            None => response,
        })
    }
}

#[async_trait]
impl ConversationGateway for GatewayClient {
    async fn fetch_history(&self, token: &str, limit: usize) -> Result<Vec<HistoryMessage>, GatewayError> {
        let result = self
            .invoke_tool(
                "sessions_history",
                json!({
                    "sessionKey": self.config.session_key,
                    "limit": limit,
                    "includeTools": false,
                }),
                token,
            )
            .await?;
        Ok(parse_history(&result, &self.rules))
    }

    async fn send_message(&self, token: &str, message: &str) -> Result<Value, GatewayError> {
        self.invoke_tool(
            "sessions_send",
            json!({
                "sessionKey": self.config.session_key,
                "message": message,
            }),
            token,
        )
        .await
    }

    async fn chat_complete(
        &self,
        token: &str,
        messages: &[ChatMessage],
        session_hint: Option<&str>,
    ) -> Result<Option<String>, GatewayError> {
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
        });
        let response = self
            .post_json("/v1/chat/completions", &body, token, session_hint)
            .await?;

        Ok(response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string))
    }

    async fn echo(&self, token: &str, text: &str) -> Result<(), GatewayError> {
        if !self.config.echo_enabled() {
            return Ok(());
        }
        self.invoke_tool(
            "message",
            json!({
                "action": "send",
                "channel": self.config.echo_channel,
                "target": self.config.echo_target,
                "message": text,
            }),
            token,
        )
        .await?;
        Ok(())
    }

    async fn reset_session(&self, token: &str) -> Result<(), GatewayError> {
        tracing::info!(session = %self.config.session_key, "resetting agent session");
        self.send_message(token, &self.config.reset_command).await?;
        Ok(())
    }
}
