//! CLI argument definitions for the Vedas chat client.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vedas_core::config::VedasConfig;
use vedas_core::identity::UserIdentity;

/// Vedas: chat with your uploaded study documents.
#[derive(Parser, Debug)]
#[command(name = "vedas", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the local session database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Signed-in user id. Sessions are stored separately per user.
    #[arg(short = 'u', long = "user", global = true)]
    pub user: Option<String>,

    /// Email of the signed-in user, for display.
    #[arg(long = "email", global = true)]
    pub email: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Upload a PDF and start a new chat session about it.
    Upload {
        /// PDF file to upload.
        file: PathBuf,
    },
    /// Ask one question in a saved session.
    Ask {
        /// Session to ask in.
        #[arg(short = 's', long = "session")]
        session: String,
        /// The question.
        text: String,
    },
    /// Interactive chat (the default).
    Chat {
        /// Session to reopen.
        #[arg(short = 's', long = "session")]
        session: Option<String>,
    },
    /// List saved sessions, most recent first.
    List,
    /// Print a saved session's conversation.
    Show {
        session: String,
    },
    /// Delete a saved session.
    Delete {
        session: String,
    },
}

impl CliArgs {
    /// The subcommand to run, defaulting to an interactive chat.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Chat { session: None })
    }

    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > VEDAS_CONFIG env var > platform default (~/.vedas/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("VEDAS_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory path.
    ///
    /// Priority: --data-dir flag > config file value.
    /// Returns `None` if not overridden (use config default).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    /// Returns `None` if not overridden.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }

    /// Resolve who is signed in.
    ///
    /// Priority: --user flag > VEDAS_USER env var > anonymous.
    pub fn resolve_user(&self) -> UserIdentity {
        let uid = self
            .user
            .clone()
            .or_else(|| std::env::var("VEDAS_USER").ok())
            .filter(|uid| !uid.trim().is_empty());
        let identity = match uid {
            Some(uid) => UserIdentity::new(uid),
            None => UserIdentity::anonymous(),
        };
        match self.email.clone() {
            Some(email) => identity.with_email(email),
            None => identity,
        }
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut VedasConfig) {
        if let Some(data_dir) = self.resolve_data_dir() {
            config.general.data_dir = data_dir;
        }
        if let Some(level) = self.resolve_log_level() {
            config.general.log_level = level;
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".vedas").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".vedas").join("config.toml");
    }
    PathBuf::from("config.toml")
}
