//! Conversation Store
//!
//! Owns the ordered message log and the conversation id, and mirrors the full
//! log into key-value storage after every append. Persistence failures are
//! returned to the caller but never undo the in-memory change: the chat keeps
//! working without a disk.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::events::{ChatEvent, EventSink};
use crate::state::{ChatMessage, ConversationId};
use crate::storage::{KeyValueStorage, StorageError};

/// Every persisted conversation lives under this prefix
pub const HISTORY_KEY_PREFIX: &str = "chatbot_history_";
/// Remembers which conversation to restore on the next start
pub const ACTIVE_CONVERSATION_KEY: &str = "chatbot_active_conversation";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read conversation history: {0}")]
    Read(#[source] StorageError),
    #[error("failed to write conversation history: {0}")]
    Write(#[source] StorageError),
    #[error("persisted conversation history is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("failed to serialize conversation history: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to remove {failed} of {total} stored conversations")]
    Sweep {
        failed: usize,
        total: usize,
        #[source]
        last: StorageError,
    },
}

pub fn history_key(id: &ConversationId) -> String {
    format!("{}{}", HISTORY_KEY_PREFIX, id)
}

pub struct ConversationStore {
    id: ConversationId,
    log: Vec<ChatMessage>,
    storage: Arc<dyn KeyValueStorage>,
    events: EventSink,
}

impl ConversationStore {
    /// Start a store on the active conversation recorded in `storage`,
    /// or on a fresh conversation when none is recorded.
    pub fn open(storage: Arc<dyn KeyValueStorage>, events: EventSink) -> Self {
        let id = match storage.get_item(ACTIVE_CONVERSATION_KEY) {
            Ok(Some(raw)) if !raw.trim().is_empty() => ConversationId::from_stored(raw.trim()),
            Ok(_) => ConversationId::generate(),
            Err(e) => {
                warn!("Could not read active conversation id, starting fresh: {}", e);
                ConversationId::generate()
            }
        };

        let store = Self::with_id(id, storage, events);
        store.remember_active_id();
        store
    }

    pub fn with_id(id: ConversationId, storage: Arc<dyn KeyValueStorage>, events: EventSink) -> Self {
        Self {
            id,
            log: Vec::new(),
            storage,
            events,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.log
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.log.clone()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Load the persisted log for the current conversation
    ///
    /// A missing entry is a legitimately empty log. Unreadable or corrupt
    /// data leaves the log empty and reports why.
    pub fn restore(&mut self) -> Result<&[ChatMessage], StoreError> {
        self.log.clear();

        let raw = self
            .storage
            .get_item(&history_key(&self.id))
            .map_err(StoreError::Read)?;

        if let Some(raw) = raw {
            self.log = serde_json::from_str(&raw).map_err(StoreError::Corrupt)?;
        }

        debug!(conversation = %self.id, messages = self.log.len(), "restored conversation");
        Ok(&self.log)
    }

    /// Append a message and rewrite the whole persisted log
    pub fn append(&mut self, message: ChatMessage) -> Result<(), StoreError> {
        self.log.push(message.clone());
        self.events.emit(ChatEvent::MessageAppended(message));
        self.persist()
    }

    /// Drop every stored conversation and start over under a new id
    pub fn clear(&mut self) -> Result<(), StoreError> {
        let previous = std::mem::replace(&mut self.id, ConversationId::generate());
        self.log.clear();
        debug!(previous = %previous, current = %self.id, "cleared conversation");

        self.events.emit(ChatEvent::HistoryCleared {
            conversation_id: self.id.clone(),
        });
        self.remember_active_id();
        self.sweep_history()
    }

    /// Pretty-printed JSON array of the current log
    pub fn export_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(&self.log).map_err(StoreError::Serialize)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&self.log).map_err(StoreError::Serialize)?;
        self.storage
            .set_item(&history_key(&self.id), &serialized)
            .map_err(StoreError::Write)
    }

    fn remember_active_id(&self) {
        if let Err(e) = self.storage.set_item(ACTIVE_CONVERSATION_KEY, self.id.as_str()) {
            warn!("Could not record active conversation id: {}", e);
        }
    }

    fn sweep_history(&self) -> Result<(), StoreError> {
        let keys = self.storage.keys().map_err(StoreError::Read)?;
        let stale: Vec<String> = keys
            .into_iter()
            .filter(|key| key.starts_with(HISTORY_KEY_PREFIX))
            .collect();

        let total = stale.len();
        let mut failed = 0;
        let mut last = None;

        for key in stale {
            if let Err(e) = self.storage.remove_item(&key) {
                failed += 1;
                last = Some(e);
            }
        }

        match last {
            Some(last) => Err(StoreError::Sweep { failed, total, last }),
            None => Ok(()),
        }
    }
}
