use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "nexus_chat=info,nexus_chat_core=info";

fn log_path() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .ok_or_else(|| anyhow!("Could not determine cache directory"))?
        .join("nexus-chat");
    fs::create_dir_all(&dir)?;
    Ok(dir.join("nexus-chat.log"))
}

/// Route tracing output to a log file; the terminal belongs to the UI.
/// `RUST_LOG` overrides the default filter.
pub fn init() -> Result<PathBuf> {
    let path = log_path()?;
    let file: File = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    Ok(path)
}
