//! Engine configuration
//!
//! All knobs the dispatcher and scheduler need, with sensible defaults.
//! Applications typically embed this as a `[sync]` table in their settings
//! file and load it with [`EngineConfig::from_toml`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the synchronization engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Conversation-list silent poll interval, in milliseconds
    pub list_poll_ms: u64,
    /// Active-thread silent poll interval, in milliseconds
    pub thread_poll_ms: u64,
    /// Conversations fetched per list page
    pub page_size: usize,
    /// Trailing messages kept in a freshly opened window (high-water mark)
    pub window_limit: usize,
    /// Messages fetched per `loadOlder` call
    pub older_batch: usize,
    /// Analysis is re-triggered every `analysis_batch` messages
    pub analysis_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            list_poll_ms: 15_000,
            thread_poll_ms: 5_000,
            page_size: 25,
            window_limit: 30,
            older_batch: 30,
            analysis_batch: 3,
        }
    }
}

impl EngineConfig {
    /// Parse a config from a TOML document, falling back to defaults for
    /// missing fields. Unknown fields are ignored.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load a config from a TOML file on disk.
    pub fn load_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        Ok(Self::from_toml(&content)?)
    }

    pub fn list_poll_interval(&self) -> Duration {
        Duration::from_millis(self.list_poll_ms)
    }

    pub fn thread_poll_interval(&self) -> Duration {
        Duration::from_millis(self.thread_poll_ms)
    }
}
