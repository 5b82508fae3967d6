//! Vedas application binary - composition root.
//!
//! Ties the Vedas crates into a single command-line client:
//! 1. Load configuration from TOML and apply command-line overrides
//! 2. Open local session storage (SQLite)
//! 3. Build the HTTP backend for the document-chat service
//! 4. Drive the session controller from the chosen subcommand

mod cli;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use vedas_chat::{ChatError, SendOutcome, SessionController};
use vedas_client::HttpChatBackend;
use vedas_core::config::VedasConfig;
use vedas_core::types::{ChatSession, Role, Timestamp};
use vedas_storage::{Database, LocalSessionStore};

use cli::{CliArgs, Command};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

const REPL_HELP: &str = "\
Commands:
  /upload <file>   upload a PDF and start a new session
  /new             start a new chat
  /list            list saved sessions
  /load <id>       reopen a saved session
  /delete <id>     delete a saved session
  /more <id>       ask the assistant to elaborate on one of its messages
  /help            show this help
  /quit            exit";

/// Install the tracing subscriber.
///
/// RUST_LOG wins, otherwise the configured level.
fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn format_time(ts: &Timestamp) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn print_session(session: &ChatSession) {
    println!("{} ({})", session.title, session.session_id);
    println!(
        "  {} · {} · uploaded {}",
        session.document_meta.name,
        session.document_meta.size_label(),
        format_time(&session.document_meta.upload_timestamp)
    );
    for message in &session.messages {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "vedas",
        };
        println!("\n[{}] {} {}:", message.id, format_time(&message.timestamp), who);
        println!("{}", message.text);
    }
}

fn print_sessions(controller: &SessionController) -> AppResult<()> {
    let sessions = controller.list_sessions()?;
    if sessions.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }
    for summary in sessions {
        println!(
            "{}  {:<32}  {:>3} messages  {}",
            summary.session_id,
            summary.title,
            summary.message_count,
            format_time(&summary.last_updated_at)
        );
    }
    Ok(())
}

/// Print a reply as it is revealed, then whatever of it is left.
async fn print_reveal(controller: &SessionController, message_id: u64) {
    let mut rx = controller.subscribe();
    let mut printed = 0usize;
    let mut stdout = std::io::stdout();

    loop {
        let frame = rx.borrow_and_update().typing_text.clone();
        let Some(frame) = frame else {
            break;
        };
        if let Some(rest) = frame.get(printed..) {
            print!("{}", rest);
            let _ = stdout.flush();
            printed = frame.len();
        }
        if rx.changed().await.is_err() {
            break;
        }
    }

    let text = controller
        .active_session()
        .and_then(|session| session.message(message_id).map(|m| m.text.clone()));
    if let Some(rest) = text.as_deref().and_then(|t| t.get(printed..)) {
        print!("{}", rest);
    }
    println!();
}

async fn ask(controller: &SessionController, text: &str) {
    match controller.send_message(text).await {
        SendOutcome::Replied { message_id } => {
            print_reveal(controller, message_id).await;
            controller.wait_for_reveal().await;
        }
        SendOutcome::Failed { message_id, error } => {
            tracing::debug!(error = %error, "Chat turn failed");
            let text = controller
                .active_session()
                .and_then(|s| s.message(message_id).map(|m| m.text.clone()))
                .unwrap_or_default();
            println!("{}", text);
        }
        SendOutcome::Ignored(reason) => {
            tracing::debug!(?reason, "Message not sent");
        }
        SendOutcome::Superseded => {}
    }
}

async fn upload(controller: &SessionController, path: &Path) -> Result<ChatSession, ChatError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ChatError::Storage(format!("cannot read {}: {}", path.display(), e)))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    println!("Uploading {} ...", file_name);
    let session = controller
        .upload_document(&file_name, &mime_type, bytes)
        .await?;
    println!(
        "Session {} created for {} ({})\n",
        session.session_id,
        session.document_meta.name,
        session.document_meta.size_label()
    );
    if let Some(welcome) = session.messages.first() {
        println!("{}", welcome.text);
    }
    Ok(session)
}

/// Interactive loop: plain lines are chat messages, `/` lines are commands.
async fn repl(controller: &SessionController) -> AppResult<()> {
    println!(
        "Signed in as {}. Type /help for commands.",
        controller.user().display_name()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", REPL_HELP),
            "/new" => {
                controller.start_new_chat();
                println!("Upload a PDF with /upload <file> to begin.");
            }
            "/list" => print_sessions(controller)?,
            "/upload" if !rest.is_empty() => {
                if let Err(e) = upload(controller, Path::new(rest)).await {
                    eprintln!("{}", e.user_message());
                }
            }
            "/load" if !rest.is_empty() => match controller.load_session(rest) {
                Ok(session) => print_session(&session),
                Err(e) => eprintln!("{}", e),
            },
            "/delete" if !rest.is_empty() => {
                if controller.delete_session(rest) {
                    println!("Deleted {}.", rest);
                } else {
                    println!("No session {}.", rest);
                }
            }
            "/more" => {
                let prompt = rest
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| controller.follow_up_prompt(id));
                match prompt {
                    Some(prompt) => {
                        println!("{}", prompt);
                        ask(controller, &prompt).await;
                    }
                    None => eprintln!("Give the id of an assistant message, e.g. /more 3"),
                }
            }
            _ if command.starts_with('/') => eprintln!("Unknown command. {}", REPL_HELP),
            _ => {
                if !controller.phase().has_session() {
                    eprintln!("No open session. Upload a PDF with /upload <file> first.");
                    continue;
                }
                ask(controller, line).await;
            }
        }
    }

    controller.complete_reveal();
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    // Config first, so its log level can seed the subscriber.
    let config_file = args.resolve_config_path();
    let (mut config, config_error) = if config_file.exists() {
        match VedasConfig::load(&config_file) {
            Ok(config) => (config, None),
            Err(e) => (VedasConfig::default(), Some(e)),
        }
    } else {
        (VedasConfig::default(), None)
    };
    args.apply_overrides(&mut config);

    // Tracing.
    init_tracing(&config.general.log_level);
    tracing::info!("Starting Vedas v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        );
    }

    // Storage.
    let db_path = config.database_path();
    let db = match Database::new(&db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(path = %db_path.display(), error = %e, "Failed to open session database");
            return Err(e.into());
        }
    };
    tracing::info!(path = %db_path.display(), "Session database opened");
    let store = Arc::new(LocalSessionStore::new(db, config.storage.key_prefix.clone()));

    // Remote service.
    let backend = Arc::new(HttpChatBackend::from_config(&config.endpoints, &config.chat)?);

    let user = args.resolve_user();
    tracing::debug!(user = %user.display_name(), "Resolved user");
    let controller = SessionController::new(store, backend, user, config.chat.clone());

    match args.command() {
        Command::Upload { file } => {
            if let Err(e) = upload(&controller, &file).await {
                tracing::error!(file = %file.display(), error = %e, "Upload failed");
                eprintln!("{}", e.user_message());
                return Err(e.into());
            }
        }
        Command::Ask { session, text } => {
            controller.load_session(&session)?;
            ask(&controller, &text).await;
        }
        Command::Chat { session } => {
            if let Some(session) = session {
                let session = controller.load_session(&session)?;
                print_session(&session);
            }
            repl(&controller).await?;
        }
        Command::List => print_sessions(&controller)?,
        Command::Show { session } => {
            let session = controller.load_session(&session)?;
            print_session(&session);
        }
        Command::Delete { session } => {
            if controller.delete_session(&session) {
                println!("Deleted {}.", session);
            } else {
                println!("No session {}.", session);
            }
        }
    }

    Ok(())
}
