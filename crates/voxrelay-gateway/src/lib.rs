//! Client side of the agent gateway.
//!
//! The relay owns no conversation state. Everything lives in one shared
//! gateway session, reached through [`ConversationGateway`]:
//!
//! - [`GatewayClient`] speaks the gateway's HTTP tool-invocation and
//!   chat-completion endpoints, forwarding the caller's bearer token.
//! - [`ReplyWaiter`] implements the reply-wait protocol on top of any
//!   gateway: baseline snapshot, detached submission, bounded polling.
//! - [`parse_history`] turns raw history results into classified
//!   [`voxrelay_types::HistoryMessage`]s.

pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod wait;

pub use client::{ChatMessage, ConversationGateway, GatewayClient};
pub use config::{GatewayConfig, ReplyMode, ReplyWaitConfig};
pub use error::GatewayError;
pub use history::{align_positions, parse_history};
pub use wait::{ReplyOutcome, ReplyWaiter};
