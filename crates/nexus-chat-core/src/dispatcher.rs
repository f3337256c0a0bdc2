//! Message Dispatcher
//!
//! Runs one send/receive cycle at a time. A `send` that arrives while a reply
//! is pending is dropped, not queued. Every accepted `send` makes exactly one
//! request and always ends with a bot message in the log, either the service's
//! reply or a locally chosen fallback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::{ChatBackend, ChatRequest};
use crate::events::{ChatEvent, EventSink};
use crate::fallback::FallbackResponses;
use crate::state::ChatMessage;
use crate::store::ConversationStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Input was empty or whitespace only
    Empty,
    /// Another reply is still pending
    Busy,
    /// The service answered; carries the appended bot message
    Replied(ChatMessage),
    /// The request failed and a fallback line was appended instead
    FellBack(ChatMessage),
}

impl SendOutcome {
    pub fn bot_message(&self) -> Option<&ChatMessage> {
        match self {
            SendOutcome::Replied(msg) | SendOutcome::FellBack(msg) => Some(msg),
            SendOutcome::Empty | SendOutcome::Busy => None,
        }
    }
}

/// Clears the awaiting flag on every exit path
struct AwaitingGuard {
    flag: Arc<AtomicBool>,
}

impl AwaitingGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for AwaitingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// An accepted send that already holds the single-flight slot.
///
/// Created by [`MessageDispatcher::begin`]; the slot is released when the
/// exchange finishes or the value is dropped unrun.
pub struct PendingSend {
    dispatcher: Arc<MessageDispatcher>,
    text: String,
    guard: AwaitingGuard,
}

impl PendingSend {
    pub async fn run(self) -> SendOutcome {
        let PendingSend { dispatcher, text, guard } = self;
        dispatcher.exchange(&text, guard).await
    }
}

pub struct MessageDispatcher {
    store: Arc<Mutex<ConversationStore>>,
    backend: Arc<dyn ChatBackend>,
    fallback: FallbackResponses,
    error_message: String,
    events: EventSink,
    awaiting_reply: Arc<AtomicBool>,
}

impl MessageDispatcher {
    pub fn new(
        store: Arc<Mutex<ConversationStore>>,
        backend: Arc<dyn ChatBackend>,
        fallback: FallbackResponses,
        error_message: impl Into<String>,
        events: EventSink,
    ) -> Self {
        Self {
            store,
            backend,
            fallback,
            error_message: error_message.into(),
            events,
            awaiting_reply: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply.load(Ordering::Acquire)
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    pub async fn send(&self, text: &str) -> SendOutcome {
        match self.admit(text) {
            Ok(guard) => self.exchange(text, guard).await,
            Err(outcome) => outcome,
        }
    }

    /// Claim the single-flight slot now and run the exchange later,
    /// typically on a spawned task
    pub fn begin(self: &Arc<Self>, text: &str) -> Result<PendingSend, SendOutcome> {
        let guard = self.admit(text)?;
        Ok(PendingSend {
            dispatcher: self.clone(),
            text: text.to_string(),
            guard,
        })
    }

    fn admit(&self, text: &str) -> Result<AwaitingGuard, SendOutcome> {
        if text.trim().is_empty() {
            return Err(SendOutcome::Empty);
        }

        AwaitingGuard::acquire(&self.awaiting_reply).ok_or_else(|| {
            debug!("reply pending, dropping send");
            SendOutcome::Busy
        })
    }

    async fn exchange(&self, text: &str, _guard: AwaitingGuard) -> SendOutcome {
        let request = {
            let mut store = self.store.lock().await;
            if let Err(e) = store.append(ChatMessage::user(text)) {
                warn!("Continuing without persistence: {}", e);
            }
            ChatRequest::new(text, store.conversation_id())
        };

        self.events.emit(ChatEvent::TypingStarted);

        let (bot_message, answered) = match self.backend.ask(&request).await {
            Ok(reply) => {
                let text = reply.reply.unwrap_or_else(|| self.error_message.clone());
                (ChatMessage::bot(text), true)
            }
            Err(e) => {
                warn!("Chat endpoint failed, using fallback: {}", e);
                (ChatMessage::bot(self.fallback.pick()), false)
            }
        };

        self.events.emit(ChatEvent::TypingStopped);

        {
            let mut store = self.store.lock().await;
            if let Err(e) = store.append(bot_message.clone()) {
                warn!("Continuing without persistence: {}", e);
            }
        }

        if answered {
            SendOutcome::Replied(bot_message)
        } else {
            SendOutcome::FellBack(bot_message)
        }
    }
}
