use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

use crate::fallback::DEFAULT_FALLBACK_RESPONSES;

pub const API_URL_ENV: &str = "NEXUS_CHAT_API_URL";
pub const TIMEOUT_ENV: &str = "NEXUS_CHAT_TIMEOUT_MS";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub api_url: String,
    pub timeout_ms: u64,
    pub bot_name: String,
    pub placeholder: String,
    pub messages: ChatMessages,
    pub fallback_responses: Vec<String>,
    pub storage_dir: Option<PathBuf>,
}

/// Fixed strings the widget shows on its own
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChatMessages {
    pub welcome: String,
    pub typing: String,
    pub error: String,
    pub offline: String,
}

impl Default for ChatMessages {
    fn default() -> Self {
        Self {
            welcome: "Hi! 👋 What can I help you with today?".to_string(),
            typing: "Typing...".to_string(),
            error: "Sorry, something went wrong. Please try again.".to_string(),
            offline: "The chatbot is offline. Please try again later.".to_string(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatConfig {
    pub fn new() -> Self {
        Self {
            api_url: "http://localhost:5000/api/chat".to_string(),
            timeout_ms: 30_000,
            bot_name: "Nexus Assistant".to_string(),
            placeholder: "Ask about our products...".to_string(),
            messages: ChatMessages::default(),
            fallback_responses: DEFAULT_FALLBACK_RESPONSES.iter().map(|s| s.to_string()).collect(),
            storage_dir: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load from the user config dir, then apply env overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: ChatConfig = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {:?}: {}", path, e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            // A zero timeout would fail every request immediately
            self.timeout_ms = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| anyhow!("{} must be a positive number of milliseconds, got {:?}", TIMEOUT_ENV, raw))?;
        }

        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("nexus-chat").join("config.json"))
    }
}
