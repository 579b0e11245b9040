use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// The gateway rejected the bearer credential (HTTP 401). Never retried.
    #[error("invalid or expired gateway token")]
    Unauthorized,

    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway request failed: {0}")]
    Transport(String),

    #[error("gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gateway tool `{tool}` failed: {message}")]
    Tool { tool: String, message: String },
}

impl GatewayError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}
