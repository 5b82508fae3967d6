use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shared timestamp type.
pub type Timestamp = DateTime<Utc>;

// =============================================================================
// Enums
// =============================================================================

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Whether a message is fully shown or still being typed out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    #[default]
    Complete,
    /// Only assistant messages are ever revealed incrementally.
    Revealing,
}

// =============================================================================
// Document
// =============================================================================

/// Metadata of the uploaded document a session is about. Never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub name: String,
    pub byte_size: u64,
    pub mime_type: String,
    pub upload_timestamp: Timestamp,
}

impl DocumentMeta {
    /// Size in megabytes with two decimals, e.g. `"1.25 MB"`.
    pub fn size_label(&self) -> String {
        format!("{:.2} MB", self.byte_size as f64 / 1024.0 / 1024.0)
    }
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique within the owning session, increasing in conversation order.
    pub id: u64,
    pub role: Role,
    pub text: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub render_state: RenderState,
}

impl Message {
    pub fn user(id: u64, text: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id,
            role: Role::User,
            text: text.into(),
            timestamp,
            render_state: RenderState::Complete,
        }
    }

    pub fn assistant(id: u64, text: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id,
            role: Role::Assistant,
            text: text.into(),
            timestamp,
            render_state: RenderState::Complete,
        }
    }

    /// Assistant message whose text will be revealed incrementally.
    pub fn revealing(id: u64, text: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            render_state: RenderState::Revealing,
            ..Self::assistant(id, text, timestamp)
        }
    }

    pub fn is_revealing(&self) -> bool {
        self.render_state == RenderState::Revealing
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// One uploaded document plus its conversation.
///
/// `messages` is append-only: the only in-place mutation allowed is flipping
/// the most recent assistant message from `Revealing` to `Complete`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub session_id: String,
    pub title: String,
    pub document_meta: DocumentMeta,
    pub messages: Vec<Message>,
    pub created_at: Timestamp,
    pub last_updated_at: Timestamp,
}

impl ChatSession {
    /// Create a session for a freshly uploaded document, seeded with its welcome message.
    pub fn new(
        session_id: impl Into<String>,
        document_meta: DocumentMeta,
        welcome_text: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            title: document_meta.name.clone(),
            document_meta,
            messages: vec![Message::assistant(1, welcome_text, now)],
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Next message id (one past the largest id in the conversation).
    pub fn next_message_id(&self) -> u64 {
        self.messages.iter().map(|m| m.id).max().unwrap_or(0) + 1
    }

    /// Append a message, refreshing `last_updated_at`.
    ///
    /// A new revealing message completes any previous one so that at most one
    /// message is ever `Revealing`.
    pub fn append(&mut self, message: Message) {
        if message.is_revealing() {
            self.complete_reveal();
        }
        self.last_updated_at = message.timestamp.max(self.last_updated_at);
        self.messages.push(message);
    }

    /// Mark the revealing message complete. Returns its id if one was revealing.
    pub fn complete_reveal(&mut self) -> Option<u64> {
        let message = self.messages.iter_mut().rev().find(|m| m.is_revealing())?;
        message.render_state = RenderState::Complete;
        Some(message.id)
    }

    pub fn message(&self, id: u64) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            title: self.title.clone(),
            message_count: self.messages.len(),
            last_updated_at: self.last_updated_at,
        }
    }
}

/// Lightweight listing entry for the session sidebar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
    pub message_count: usize,
    pub last_updated_at: Timestamp,
}
