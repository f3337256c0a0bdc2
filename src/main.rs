use std::sync::Arc;

use anyhow::Result;
use nexus_chat_core::{
    ChatConfig, ChatSession, EventSink, FallbackResponses, FileStorage, HttpChatBackend,
    KeyValueStorage, MemoryStorage,
};
use tracing::{info, warn};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::{App, BackendStatus};
use tui::{AppEvent, EventHandler};

fn file_storage(config: &ChatConfig) -> Result<FileStorage> {
    let dir = match &config.storage_dir {
        Some(dir) => dir.clone(),
        None => FileStorage::default_dir()?,
    };
    Ok(FileStorage::open(dir)?)
}

fn open_storage(config: &ChatConfig) -> Arc<dyn KeyValueStorage> {
    match file_storage(config) {
        Ok(storage) => {
            info!(dir = %storage.dir().display(), "using file storage");
            Arc::new(storage)
        }
        Err(e) => {
            warn!("Storage unavailable, history will not survive restart: {}", e);
            Arc::new(MemoryStorage::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ChatConfig::load()?;

    // Logging is best effort; a read-only cache dir must not stop the widget
    if let Ok(path) = logging::init() {
        info!(log = %path.display(), version = env!("CARGO_PKG_VERSION"), "nexus-chat starting");
    }

    let storage = open_storage(&config);
    let backend = Arc::new(HttpChatBackend::new(&config.api_url, config.timeout()));

    let (sink, chat_rx) = EventSink::channel();
    let fallback = FallbackResponses::random(config.fallback_responses.clone());
    let session = ChatSession::new(config, storage, backend.clone(), fallback, sink);
    session.initialize().await;

    let mut app = App::new(session).await;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(chat_rx);

    // Check the endpoint once so the header can show online/offline
    let status_tx = events.sender();
    tokio::spawn(async move {
        let status = match backend.health().await {
            Ok(_) => BackendStatus::Online,
            Err(e) => {
                warn!("Health check failed: {}", e);
                BackendStatus::Offline
            }
        };
        let _ = status_tx.send(AppEvent::Backend(status));
    });

    let result = run(&mut app, &mut terminal, &mut events).await;

    tui::restore()?;
    info!("nexus-chat stopped");
    result
}

async fn run(app: &mut App, terminal: &mut tui::Tui, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
