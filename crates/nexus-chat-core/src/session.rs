//! Session context
//!
//! `ChatSession` is built once by the host and owns everything a running
//! widget needs: config, store, dispatcher and panel state. Nothing here is
//! global, so a host can run several independent sessions side by side.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::ChatBackend;
use crate::config::ChatConfig;
use crate::dispatcher::{MessageDispatcher, SendOutcome};
use crate::events::EventSink;
use crate::fallback::FallbackResponses;
use crate::state::{ChatMessage, ChatStatus, SessionState};
use crate::storage::KeyValueStorage;
use crate::store::{ConversationStore, StoreError};

pub struct ChatSession {
    config: ChatConfig,
    store: Arc<Mutex<ConversationStore>>,
    dispatcher: Arc<MessageDispatcher>,
    panel_open: bool,
}

impl ChatSession {
    pub fn new(
        config: ChatConfig,
        storage: Arc<dyn KeyValueStorage>,
        backend: Arc<dyn ChatBackend>,
        fallback: FallbackResponses,
        events: EventSink,
    ) -> Self {
        let store = Arc::new(Mutex::new(ConversationStore::open(storage, events.clone())));
        let dispatcher = Arc::new(MessageDispatcher::new(
            store.clone(),
            backend,
            fallback,
            config.messages.error.clone(),
            events,
        ));

        Self {
            config,
            store,
            dispatcher,
            panel_open: false,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Restore the active conversation and greet when it is empty
    ///
    /// Returns the restore error, if any, after falling back to an empty log.
    pub async fn initialize(&self) -> Option<StoreError> {
        let mut store = self.store.lock().await;

        let restore_error = match store.restore() {
            Ok(log) => {
                info!(messages = log.len(), "chat session initialized");
                None
            }
            Err(e) => {
                warn!("Starting with an empty conversation: {}", e);
                Some(e)
            }
        };

        if store.is_empty() {
            if let Err(e) = store.append(ChatMessage::welcome(&self.config.messages.welcome)) {
                warn!("Continuing without persistence: {}", e);
            }
        }

        restore_error
    }

    pub fn toggle_panel(&mut self) -> bool {
        self.panel_open = !self.panel_open;
        self.panel_open
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }

    pub async fn submit(&self, text: &str) -> SendOutcome {
        self.dispatcher.send(text).await
    }

    /// Shared handle for running sends on a spawned task
    pub fn dispatcher(&self) -> Arc<MessageDispatcher> {
        self.dispatcher.clone()
    }

    /// Wipe all stored history and greet again. Does nothing unless the user
    /// confirmed.
    pub async fn clear_history(&self, confirmed: bool) -> bool {
        if !confirmed {
            return false;
        }

        let mut store = self.store.lock().await;
        if let Err(e) = store.clear() {
            warn!("History cleared in memory only: {}", e);
        }
        info!(conversation = %store.conversation_id(), "chat history cleared");

        if let Err(e) = store.append(ChatMessage::welcome(&self.config.messages.welcome)) {
            warn!("Continuing without persistence: {}", e);
        }
        true
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.store.lock().await.snapshot()
    }

    pub async fn export_json(&self) -> Result<String, StoreError> {
        self.store.lock().await.export_json()
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            is_panel_open: self.panel_open,
            is_awaiting_reply: self.dispatcher.is_awaiting_reply(),
        }
    }

    pub async fn status(&self) -> ChatStatus {
        let store = self.store.lock().await;
        ChatStatus {
            is_open: self.panel_open,
            is_loading: self.dispatcher.is_awaiting_reply(),
            messages_count: store.len(),
            conversation_id: store.conversation_id().clone(),
        }
    }

    /// Retarget the chat endpoint for the rest of the session
    pub fn set_api_url(&mut self, url: &str) -> bool {
        let updated = self.dispatcher.backend().set_endpoint(url);
        if updated {
            self.config.api_url = url.to_string();
            info!(%url, "chat API URL updated");
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, ChatReply, ChatRequest, HttpChatBackend};
    use crate::state::ChatRole;
    use crate::storage::{FileStorage, MemoryStorage};
    use crate::store::history_key;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    struct EchoBackend;

    #[async_trait]
    impl ChatBackend for EchoBackend {
        async fn ask(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
            Ok(ChatReply {
                reply: Some(format!("echo: {}", request.message)),
            })
        }
    }

    fn session_with(storage: Arc<dyn KeyValueStorage>) -> ChatSession {
        ChatSession::new(
            ChatConfig::new(),
            storage,
            Arc::new(EchoBackend),
            FallbackResponses::default(),
            EventSink::disabled(),
        )
    }

    #[tokio::test]
    async fn test_initialize_adds_welcome_once() {
        let dir = TempDir::new().unwrap();

        {
            let session = session_with(Arc::new(FileStorage::open(dir.path()).unwrap()));
            assert!(session.initialize().await.is_none());
            let history = session.history().await;
            assert_eq!(history.len(), 1);
            assert!(history[0].is_welcome);
            assert_eq!(history[0].text, ChatConfig::new().messages.welcome);

            session.submit("hello").await;
        }

        let session = session_with(Arc::new(FileStorage::open(dir.path()).unwrap()));
        session.initialize().await;
        let texts: Vec<String> = session.history().await.into_iter().map(|m| m.text).collect();
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[1], "hello");
        assert_eq!(texts[2], "echo: hello");
    }

    #[tokio::test]
    async fn test_initialize_with_corrupt_history() {
        let storage = Arc::new(MemoryStorage::new());
        let session = session_with(storage.clone());
        let id = session.status().await.conversation_id;
        storage.set_item(&history_key(&id), "[{\"broken\"").unwrap();

        let err = session.initialize().await;

        assert!(matches!(err, Some(StoreError::Corrupt(_))));
        let history = session.history().await;
        assert_eq!(history.len(), 1);
        assert!(history[0].is_welcome);
    }

    #[tokio::test]
    async fn test_clear_history_requires_confirmation() {
        let session = session_with(Arc::new(MemoryStorage::new()));
        session.initialize().await;
        session.submit("hello").await;
        let before = session.status().await.conversation_id;

        assert!(!session.clear_history(false).await);
        assert_eq!(session.history().await.len(), 3);

        assert!(session.clear_history(true).await);
        let status = session.status().await;
        assert_ne!(status.conversation_id, before);
        assert_eq!(status.messages_count, 1);
        assert_eq!(session.history().await[0].role, ChatRole::Bot);
    }

    #[tokio::test]
    async fn test_panel_and_state() {
        let mut session = session_with(Arc::new(MemoryStorage::new()));
        assert_eq!(session.state(), SessionState::default());

        assert!(session.toggle_panel());
        assert!(session.is_panel_open());
        assert!(session.state().is_panel_open);
        assert!(!session.toggle_panel());
        assert!(!session.status().await.is_open);
    }

    #[tokio::test]
    async fn test_set_api_url() {
        let mut echo = session_with(Arc::new(MemoryStorage::new()));
        assert!(!echo.set_api_url("http://elsewhere/api/chat"));
        assert_eq!(echo.config().api_url, ChatConfig::new().api_url);

        let mut http = ChatSession::new(
            ChatConfig::new(),
            Arc::new(MemoryStorage::new()),
            Arc::new(HttpChatBackend::new("http://localhost:5000/api/chat", Duration::from_secs(1))),
            FallbackResponses::default(),
            EventSink::disabled(),
        );
        assert!(http.set_api_url("http://elsewhere/api/chat"));
        assert_eq!(http.config().api_url, "http://elsewhere/api/chat");
    }

    #[tokio::test]
    async fn test_export_json() {
        let session = session_with(Arc::new(MemoryStorage::new()));
        session.initialize().await;

        let exported = session.export_json().await.unwrap();
        let parsed: Vec<ChatMessage> = serde_json::from_str(&exported).unwrap();
        assert_eq!(parsed, session.history().await);
    }
}
