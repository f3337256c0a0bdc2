use std::path::PathBuf;

use anyhow::{anyhow, Result};
use nexus_chat_core::{ChatEvent, ChatMessage, ChatSession, SendOutcome};
use tracing::{info, warn};

/// Whether the chat endpoint answered the startup health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Unknown,
    Online,
    Offline,
}

pub struct App {
    pub should_quit: bool,
    pub session: ChatSession,

    // Rendered snapshot of the conversation log
    pub messages: Vec<ChatMessage>,
    pub typing: bool,
    pub backend_status: BackendStatus,

    // Input state
    pub input: String,
    pub cursor: usize, // cursor position in chars, not bytes

    // Chat area
    pub scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub follow_latest: bool,

    pub confirm_clear: bool,
    pub notice: Option<String>,
    pub animation_frame: u8, // 0-2 for typing ellipsis
}

impl App {
    pub async fn new(session: ChatSession) -> Self {
        let messages = session.history().await;

        Self {
            should_quit: false,
            session,
            messages,
            typing: false,
            backend_status: BackendStatus::Unknown,
            input: String::new(),
            cursor: 0,
            scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_latest: true,
            confirm_clear: false,
            notice: None,
            animation_frame: 0,
        }
    }

    pub fn is_panel_open(&self) -> bool {
        self.session.is_panel_open()
    }

    pub fn toggle_panel(&mut self) {
        let open = self.session.toggle_panel();
        if open {
            self.scroll_to_bottom();
        } else {
            self.confirm_clear = false;
        }
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.session.state().is_awaiting_reply
    }

    /// Apply a change notification from the core
    pub async fn on_chat_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::MessageAppended(_) | ChatEvent::HistoryCleared { .. } => {
                self.messages = self.session.history().await;
                self.scroll_to_bottom();
            }
            ChatEvent::TypingStarted => {
                self.typing = true;
                self.animation_frame = 0;
                self.scroll_to_bottom();
            }
            ChatEvent::TypingStopped => {
                self.typing = false;
            }
        }
    }

    /// Hand the current input to the dispatcher on a background task.
    ///
    /// The single-flight slot is claimed before the task is spawned, so a
    /// draft is only cleared once the dispatcher has accepted it.
    pub fn submit_input(&mut self) {
        let text = self.input.trim().to_string();

        let pending = match self.session.dispatcher().begin(&text) {
            Ok(pending) => pending,
            Err(SendOutcome::Busy) => {
                self.notice = Some("Still waiting for the last reply...".to_string());
                return;
            }
            Err(_) => return,
        };

        self.input.clear();
        self.cursor = 0;
        self.notice = None;

        tokio::spawn(pending.run());
    }

    pub fn request_clear(&mut self) {
        self.confirm_clear = true;
    }

    pub async fn answer_clear(&mut self, confirmed: bool) {
        self.confirm_clear = false;
        if self.session.clear_history(confirmed).await {
            self.notice = Some("Chat history cleared".to_string());
        }
    }

    /// Write the conversation as pretty JSON into the exports directory
    pub async fn export_conversation(&mut self) -> Result<PathBuf> {
        let json = self.session.export_json().await?;
        let status = self.session.status().await;

        let export_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join("nexus-chat")
            .join("exports");
        std::fs::create_dir_all(&export_dir)?;

        let path = export_dir.join(format!("{}.json", status.conversation_id));
        std::fs::write(&path, json)?;
        info!(path = %path.display(), "conversation exported");
        Ok(path)
    }

    pub async fn export_and_report(&mut self) {
        match self.export_conversation().await {
            Ok(path) => self.notice = Some(format!("Exported to {}", path.display())),
            Err(e) => {
                warn!("Export failed: {}", e);
                self.notice = Some(format!("Export failed: {}", e));
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.typing {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_latest = false;
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.scroll = self.scroll.saturating_add(lines).min(max);
        self.follow_latest = self.scroll >= max;
    }

    /// Scroll chat to bottom so the newest bubble is visible
    pub fn scroll_to_bottom(&mut self) {
        self.follow_latest = true;
        self.scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.total_chat_lines().saturating_sub(visible_height)
    }

    /// Wrapped line count of the rendered conversation, clamped to `u16::MAX`
    pub fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 40 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 40 };

        let mut total_lines: usize = 0;
        for msg in &self.messages {
            total_lines += 1; // Sender + time line
            for line in msg.text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines += char_count.div_ceil(wrap_width).max(1);
            }
            total_lines += 1; // Blank line after message
        }

        if self.typing {
            total_lines += 2; // Sender line + typing placeholder
        }

        u16::try_from(total_lines).unwrap_or(u16::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_chat_core::{
        BackendError, ChatBackend, ChatConfig, ChatReply, ChatRequest, EventSink,
        FallbackResponses, MemoryStorage,
    };
    use std::sync::Arc;

    struct SilentBackend;

    #[async_trait::async_trait]
    impl ChatBackend for SilentBackend {
        async fn ask(&self, _request: &ChatRequest) -> Result<ChatReply, BackendError> {
            Err(BackendError::Timeout)
        }
    }

    async fn app() -> App {
        let session = ChatSession::new(
            ChatConfig::new(),
            Arc::new(MemoryStorage::new()),
            Arc::new(SilentBackend),
            FallbackResponses::fixed(Vec::new(), 0),
            EventSink::disabled(),
        );
        session.initialize().await;
        App::new(session).await
    }

    #[tokio::test]
    async fn test_starts_with_welcome_snapshot() {
        let app = app().await;
        assert_eq!(app.messages.len(), 1);
        assert!(app.messages[0].is_welcome);
        assert!(!app.is_panel_open());
    }

    #[tokio::test]
    async fn test_blank_input_is_not_submitted() {
        let mut app = app().await;
        app.input = "   ".to_string();
        app.cursor = 3;

        app.submit_input();

        assert_eq!(app.input, "   ");
        assert!(!app.is_awaiting_reply());
    }

    #[tokio::test]
    async fn test_events_refresh_snapshot() {
        let mut app = app().await;

        app.session.submit("ping").await;
        app.on_chat_event(ChatEvent::TypingStarted).await;
        assert!(app.typing);
        app.on_chat_event(ChatEvent::TypingStopped).await;
        app.on_chat_event(ChatEvent::MessageAppended(ChatMessage::bot("ignored"))).await;

        assert!(!app.typing);
        assert_eq!(app.messages.len(), 3);
        assert_eq!(app.messages[1].text, "ping");
    }

    #[tokio::test]
    async fn test_clear_needs_confirmation() {
        let mut app = app().await;
        app.session.submit("ping").await;

        app.request_clear();
        assert!(app.confirm_clear);
        app.answer_clear(false).await;
        assert!(!app.confirm_clear);
        assert_eq!(app.session.history().await.len(), 3);

        app.request_clear();
        app.answer_clear(true).await;
        assert_eq!(app.session.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_while_pending_keeps_draft() {
        let mut app = app().await;

        app.input = "first".to_string();
        app.cursor = 5;
        app.submit_input();
        assert!(app.input.is_empty());
        assert!(app.is_awaiting_reply());

        // The spawned send has not run yet; the second draft must survive
        app.input = "second".to_string();
        app.cursor = 6;
        app.submit_input();

        assert_eq!(app.input, "second");
        assert_eq!(app.cursor, 6);
        assert!(app.notice.is_some());
    }

    #[tokio::test]
    async fn test_line_count_saturates_on_long_history() {
        let mut app = app().await;
        app.chat_width = 10;
        app.messages = (0..22_000).map(|i| ChatMessage::user(format!("message {}", i))).collect();

        assert_eq!(app.total_chat_lines(), u16::MAX);
        assert_eq!(app.max_scroll(), u16::MAX - 20);
    }

    #[tokio::test]
    async fn test_line_count_wraps_by_chars() {
        let mut app = app().await;
        app.chat_width = 10;
        app.messages = vec![ChatMessage::user("ééééééééééé")]; // 11 chars

        // header + 2 wrapped lines + blank
        assert_eq!(app.total_chat_lines(), 4);

        app.typing = true;
        assert_eq!(app.total_chat_lines(), 6);
    }
}
