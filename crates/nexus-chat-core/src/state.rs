//! UI-agnostic conversation state types
//!
//! These are shared between the core and whatever presentation adapter renders
//! the widget. None of them depend on a UI framework.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Identifier of one conversation, `conv_<unix-millis>_<base36 suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();

        Self(format!("conv_{}_{}", Utc::now().timestamp_millis(), suffix))
    }

    /// Wrap an id read back from storage
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat message in the conversation log
///
/// Accepts the widget's older `type`/`content`/`timestamp` keys when reading
/// persisted history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(alias = "type")]
    pub role: ChatRole,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(alias = "timestamp")]
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub is_welcome: bool,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            sent_at: Utc::now(),
            is_welcome: false,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Bot,
            text: text.into(),
            sent_at: Utc::now(),
            is_welcome: false,
        }
    }

    pub fn welcome(text: impl Into<String>) -> Self {
        Self {
            is_welcome: true,
            ..Self::bot(text)
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Bot,
}

/// Transient widget state, never persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub is_panel_open: bool,
    pub is_awaiting_reply: bool,
}

/// Snapshot handed to hosts that want to show a status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatus {
    pub is_open: bool,
    pub is_loading: bool,
    pub messages_count: usize,
    pub conversation_id: ConversationId,
}
