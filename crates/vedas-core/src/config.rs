use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VedasError};

/// Top-level configuration for the Vedas chat client.
///
/// Loaded from `~/.vedas/config.toml` by default. Every section falls back to
/// its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VedasConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl VedasConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VedasConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VedasError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Path of the SQLite file backing local session storage.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.general.data_dir).join(&self.storage.database_file)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the local session database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.vedas/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Remote service endpoints. Each operation has a primary URL (usually the
/// dev-server proxy) and a fully-qualified fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub upload_primary: String,
    pub upload_fallback: String,
    pub chat_primary: String,
    pub chat_fallback: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            upload_primary: "http://localhost:5173/vedas-api/upload_pdf/".to_string(),
            upload_fallback: "https://vedas-chat-1.onrender.com/upload_pdf/".to_string(),
            chat_primary: "http://localhost:5173/vedas-api/chat/".to_string(),
            chat_fallback: "https://vedas-chat-1.onrender.com/chat/".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Conversation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Delay between revealed characters, in milliseconds.
    pub typing_interval_ms: u64,
    /// Longest accepted user message, in characters.
    pub max_message_length: usize,
    /// Include prior turns in the `query` request shape.
    pub send_history: bool,
    /// Request shapes tried in order: "query", "message", "question".
    pub payload_shapes: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            typing_interval_ms: 20,
            max_message_length: 2000,
            send_history: true,
            payload_shapes: vec![
                "query".to_string(),
                "message".to_string(),
                "question".to_string(),
            ],
        }
    }
}

/// Local session storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file name inside `general.data_dir`.
    pub database_file: String,
    /// Prefix of the per-user storage key.
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "vedas.db".to_string(),
            key_prefix: "vedas_chat_sessions".to_string(),
        }
    }
}
