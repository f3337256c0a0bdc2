pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod fallback;
pub mod session;
pub mod state;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use backend::{BackendError, ChatBackend, ChatReply, ChatRequest, HttpChatBackend};
pub use config::{ChatConfig, ChatMessages};
pub use dispatcher::{MessageDispatcher, PendingSend, SendOutcome};
pub use events::{ChatEvent, EventSink};
pub use fallback::FallbackResponses;
pub use session::ChatSession;
pub use state::{ChatMessage, ChatRole, ChatStatus, ConversationId, SessionState};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use store::{ConversationStore, StoreError};
