//! Change notifications for presentation adapters
//!
//! The core never draws anything. It pushes `ChatEvent`s into an unbounded
//! channel and whatever owns the receiver decides how to render them.

use tokio::sync::mpsc;

use crate::state::{ChatMessage, ConversationId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    MessageAppended(ChatMessage),
    TypingStarted,
    TypingStopped,
    HistoryCleared { conversation_id: ConversationId },
}

/// Cloneable sending half shared by the store and the dispatcher
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ChatEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is rendering any more
            let _ = tx.send(event);
        }
    }
}
