pub mod http;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::state::ConversationId;

pub use http::HttpChatBackend;

/// Payload POSTed to the chat endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: String,
    pub timestamp: String,
}

impl ChatRequest {
    pub fn new(message: &str, conversation_id: &ConversationId) -> Self {
        Self {
            message: message.to_string(),
            conversation_id: conversation_id.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// A successfully decoded answer. `reply` is `None` when the body had no
/// usable `reply` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("chat endpoint did not answer in time")]
    Timeout,
    #[error("chat endpoint unreachable: {0}")]
    Network(#[source] reqwest::Error),
    #[error("chat endpoint returned HTTP {0}")]
    Status(StatusCode),
    #[error("chat endpoint sent an unreadable body: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn ask(&self, request: &ChatRequest) -> Result<ChatReply, BackendError>;

    /// Point the backend at another endpoint. Returns false when the
    /// backend has no notion of an endpoint.
    fn set_endpoint(&self, _endpoint: &str) -> bool {
        false
    }
}
