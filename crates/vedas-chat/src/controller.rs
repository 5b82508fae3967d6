//! Session controller: owns the open conversation and drives uploads, chat
//! turns, reveals and persistence.
//!
//! All mutable state lives behind one mutex that is never held across an
//! `.await`. Work that outlives a single call (a pending chat reply, a running
//! reveal) carries a [`Tag`] of the session id and generation it started
//! under, and is dropped if the controller has since moved on.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vedas_client::{ChatBackend, ChatQuery, ClientError, UploadRequest};
use vedas_core::config::ChatConfig;
use vedas_core::identity::UserIdentity;
use vedas_core::types::{ChatSession, DocumentMeta, Message, Role, SessionSummary};
use vedas_storage::SessionRepository;

use crate::error::ChatError;
use crate::presenter::TypingPresenter;
use crate::state::{ChatEvent, ChatPhase};

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Appended as the assistant's reply when the service rejected a turn.
pub const CHAT_FAILURE_TEXT: &str =
    "Sorry, I encountered an error while processing your request. Please try again.";

/// Appended as the assistant's reply when neither endpoint could be reached.
pub const NETWORK_FAILURE_TEXT: &str =
    "Unable to connect to the chat service. Please check your connection and try again.";

const SESSION_SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SESSION_SUFFIX_LEN: usize = 9;
const FOLLOW_UP_EXCERPT_CHARS: usize = 50;

// =============================================================================
// Public surface
// =============================================================================

/// Read-only view of the controller, republished after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerSnapshot {
    pub phase: ChatPhase,
    pub active_session: Option<ChatSession>,
    /// The part of the newest reply revealed so far, while a reveal runs.
    pub typing_text: Option<String>,
    pub is_uploading: bool,
    pub is_chat_loading: bool,
    pub last_error: Option<String>,
}

/// What became of a `send_message` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Nothing was sent.
    Ignored(IgnoreReason),
    /// The reply was appended and its reveal started.
    Replied { message_id: u64 },
    /// The turn failed; an assistant message explaining so was appended.
    Failed { message_id: u64, error: ClientError },
    /// The controller moved to another session before the reply arrived.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    TooLong,
    NoSession,
    /// A reply is still pending.
    Busy,
}

/// Identifies the session and generation a piece of deferred work belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Tag {
    session_id: String,
    generation: u64,
}

#[derive(Debug, Default)]
struct Inner {
    phase: ChatPhase,
    active: Option<ChatSession>,
    typing_text: Option<String>,
    is_uploading: bool,
    is_chat_loading: bool,
    last_error: Option<String>,
    generation: u64,
    reveal: Option<JoinHandle<()>>,
}

impl Inner {
    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            phase: self.phase,
            active_session: self.active.clone(),
            typing_text: self.typing_text.clone(),
            is_uploading: self.is_uploading,
            is_chat_loading: self.is_chat_loading,
            last_error: self.last_error.clone(),
        }
    }

    fn tag(&self) -> Option<Tag> {
        self.active.as_ref().map(|session| Tag {
            session_id: session.session_id.clone(),
            generation: self.generation,
        })
    }

    fn is_current(&self, tag: &Tag) -> bool {
        self.generation == tag.generation
            && self
                .active
                .as_ref()
                .is_some_and(|session| session.session_id == tag.session_id)
    }
}

/// Coordinates one user's chat sessions.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Mutex<Inner>>,
    repository: Arc<dyn SessionRepository>,
    backend: Arc<dyn ChatBackend>,
    user: UserIdentity,
    config: ChatConfig,
    presenter: TypingPresenter,
    snapshots: Arc<watch::Sender<ControllerSnapshot>>,
}

impl SessionController {
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        backend: Arc<dyn ChatBackend>,
        user: UserIdentity,
        config: ChatConfig,
    ) -> Self {
        let (snapshots, _) = watch::channel(ControllerSnapshot::default());
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            repository,
            backend,
            user,
            presenter: TypingPresenter::from_config(&config),
            config,
            snapshots: Arc::new(snapshots),
        }
    }

    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    /// Receive a snapshot after every state change and reveal frame.
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.lock().snapshot()
    }

    pub fn phase(&self) -> ChatPhase {
        self.lock().phase
    }

    pub fn active_session(&self) -> Option<ChatSession> {
        self.lock().active.clone()
    }

    pub fn is_chat_loading(&self) -> bool {
        self.lock().is_chat_loading
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Close the open session and wait for a new document.
    ///
    /// Persisted history is kept.
    pub fn start_new_chat(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if let Some(session) = &inner.active {
            debug!(session_id = %session.session_id, "Closing session for a new chat");
        }
        self.reset_for_new_chat(inner);
        self.publish(inner);
    }

    /// Upload a PDF and open a new session for it.
    ///
    /// Starts a new chat first when called outside `AwaitingUpload`. If the
    /// controller moves on while the upload is in flight, the session is still
    /// saved but not opened.
    pub async fn upload_document(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<ChatSession, ChatError> {
        if !is_pdf(mime_type) {
            warn!(file = %file_name, mime_type = %mime_type, "Rejected non-PDF document");
            let err = ChatError::UnsupportedDocument {
                mime_type: mime_type.to_string(),
            };
            let mut guard = self.lock();
            guard.last_error = Some(err.user_message());
            self.publish(&guard);
            return Err(err);
        }

        let (request, generation) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if inner.is_uploading {
                return Err(ChatError::UploadInProgress);
            }
            if inner.phase != ChatPhase::AwaitingUpload {
                self.reset_for_new_chat(inner);
            }
            inner.is_uploading = true;
            inner.last_error = None;
            self.publish(inner);

            let request = UploadRequest {
                session_id: generate_session_id(),
                file_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
                bytes,
            };
            (request, inner.generation)
        };

        debug!(session_id = %request.session_id, file = %file_name, "Uploading document");
        let result = self.backend.upload(request).await;

        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.is_uploading = false;

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(file = %file_name, status = ?e.status(), error = %e, "Upload failed");
                inner.phase.apply(ChatEvent::UploadFailed);
                let err = ChatError::Upload(e);
                inner.last_error = Some(err.user_message());
                self.publish(inner);
                return Err(err);
            }
        };

        let now = Utc::now();
        let meta = DocumentMeta {
            name: receipt.file_name.clone(),
            byte_size: receipt.byte_size,
            mime_type: receipt.mime_type.clone(),
            upload_timestamp: now,
        };
        let session = ChatSession::new(
            receipt.session_id,
            meta,
            welcome_message(&receipt.file_name),
            now,
        );
        self.persist(&session);
        info!(
            session_id = %session.session_id,
            user = %self.user.display_name(),
            file = %session.document_meta.name,
            size = %session.document_meta.size_label(),
            "Session created"
        );

        if inner.generation == generation && inner.phase == ChatPhase::AwaitingUpload {
            inner.phase.apply(ChatEvent::UploadSucceeded);
            inner.active = Some(session.clone());
        } else {
            warn!(
                session_id = %session.session_id,
                "Controller moved on during upload, session saved but not opened"
            );
        }
        self.publish(inner);
        Ok(session)
    }

    /// Send a message in the open session and start revealing the reply.
    ///
    /// Chat failures never escape: they are appended to the conversation as
    /// an assistant message and reported in the outcome.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Ignored(IgnoreReason::Empty);
        }
        let chars = text.chars().count();
        if chars > self.config.max_message_length {
            warn!(
                chars,
                max = self.config.max_message_length,
                "Message too long, ignoring"
            );
            return SendOutcome::Ignored(IgnoreReason::TooLong);
        }

        let (query, tag) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            match inner.phase {
                ChatPhase::SessionActive => {}
                ChatPhase::AwaitingReply => {
                    debug!("Reply still pending, ignoring message");
                    return SendOutcome::Ignored(IgnoreReason::Busy);
                }
                _ => return SendOutcome::Ignored(IgnoreReason::NoSession),
            }

            self.settle_reveal(inner);
            let generation = inner.generation;
            let Some(session) = inner.active.as_mut() else {
                return SendOutcome::Ignored(IgnoreReason::NoSession);
            };

            let query = ChatQuery::new(session.session_id.clone(), text)
                .with_filename(session.document_meta.name.clone())
                .with_history(&session.messages);
            let id = session.next_message_id();
            session.append(Message::user(id, text, Utc::now()));
            self.persist(session);

            let tag = Tag {
                session_id: session.session_id.clone(),
                generation,
            };
            inner.phase.apply(ChatEvent::SendMessage);
            inner.is_chat_loading = true;
            inner.last_error = None;
            self.publish(inner);
            (query, tag)
        };

        debug!(session_id = %tag.session_id, chars, "Sending chat message");
        let result = self.backend.chat(query).await;

        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.is_current(&tag) {
            warn!(
                session_id = %tag.session_id,
                generation = tag.generation,
                "Discarding reply for a superseded request"
            );
            return SendOutcome::Superseded;
        }
        inner.is_chat_loading = false;

        match result {
            Ok(reply) => {
                self.settle_reveal(inner);
                let Some(session) = inner.active.as_mut() else {
                    return SendOutcome::Superseded;
                };
                let id = session.next_message_id();
                session.append(Message::revealing(id, reply.text.clone(), Utc::now()));
                debug!(
                    session_id = %session.session_id,
                    message_id = id,
                    shape = %reply.shape,
                    placeholder = reply.placeholder,
                    "Reply received"
                );
                inner.phase.apply(ChatEvent::ReplyArrived);
                self.start_reveal(inner, reply.text);
                self.publish(inner);
                SendOutcome::Replied { message_id: id }
            }
            Err(error) => {
                let Some(session) = inner.active.as_mut() else {
                    return SendOutcome::Superseded;
                };
                let id = session.next_message_id();
                session.append(Message::assistant(id, failure_text(&error), Utc::now()));
                self.persist(session);
                warn!(
                    session_id = %session.session_id,
                    status = ?error.status(),
                    error = %error,
                    "Chat request failed"
                );
                inner.phase.apply(ChatEvent::ReplyFailed);
                inner.last_error = Some(error.to_string());
                self.publish(inner);
                SendOutcome::Failed {
                    message_id: id,
                    error,
                }
            }
        }
    }

    /// Open a persisted session, replacing whatever is open.
    pub fn load_session(&self, session_id: &str) -> Result<ChatSession, ChatError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        // Settle first so a reply still being revealed in this session is saved.
        self.settle_reveal(inner);

        let session = self
            .repository
            .find(&self.user, session_id)?
            .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))?;

        inner.generation += 1;
        inner.active = Some(session.clone());
        inner.typing_text = None;
        inner.is_chat_loading = false;
        inner.last_error = None;
        inner.phase.apply(ChatEvent::LoadSession);
        info!(
            session_id = %session.session_id,
            messages = session.messages.len(),
            "Session loaded"
        );
        self.publish(inner);
        Ok(session)
    }

    /// Delete a persisted session. Returns whether it was removed from storage.
    ///
    /// Deleting the open session closes it, even when storage refuses the
    /// delete; deleting any other session leaves in-memory state untouched.
    pub fn delete_session(&self, session_id: &str) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let existed = match self.repository.delete(&self.user, session_id) {
            Ok(existed) => {
                info!(
                    session_id = %session_id,
                    user = %self.user.display_name(),
                    existed,
                    "Session deleted"
                );
                existed
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    user = %self.user.display_name(),
                    error = %e,
                    "Failed to delete session from storage"
                );
                false
            }
        };

        let was_active = inner
            .active
            .as_ref()
            .is_some_and(|session| session.session_id == session_id);
        if was_active {
            if let Some(handle) = inner.reveal.take() {
                handle.abort();
            }
            inner.generation += 1;
            inner.active = None;
            inner.typing_text = None;
            inner.is_chat_loading = false;
            inner.last_error = None;
            inner.phase.apply(ChatEvent::DeleteActiveSession);
            self.publish(inner);
        }
        existed
    }

    /// Summaries of the user's saved sessions, most recently updated first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, ChatError> {
        let mut sessions = self.repository.get(&self.user)?;
        sessions.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(sessions.iter().map(ChatSession::summary).collect())
    }

    /// Prompt asking the assistant to expand on one of its messages.
    pub fn follow_up_prompt(&self, message_id: u64) -> Option<String> {
        let inner = self.lock();
        let message = inner.active.as_ref()?.message(message_id)?;
        (message.role == Role::Assistant).then(|| elaborate_prompt(&message.text))
    }

    /// Finish the running reveal immediately. Returns the completed message id.
    pub fn complete_reveal(&self) -> Option<u64> {
        let mut guard = self.lock();
        let completed = self.settle_reveal(&mut guard);
        self.publish(&guard);
        completed
    }

    /// Wait until the running reveal, if any, has finished or been stopped.
    pub async fn wait_for_reveal(&self) {
        let handle = self.lock().reveal.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Reveal task failed");
                }
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.snapshots.send_replace(inner.snapshot());
    }

    /// Save a session, logging instead of failing when storage is unavailable.
    fn persist(&self, session: &ChatSession) {
        if let Err(e) = self.repository.save(&self.user, session) {
            warn!(
                session_id = %session.session_id,
                user = %self.user.display_name(),
                error = %e,
                "Failed to persist session, continuing in memory"
            );
        }
    }

    fn reset_for_new_chat(&self, inner: &mut Inner) {
        self.settle_reveal(inner);
        if let Some(session) = &inner.active {
            self.persist(session);
        }
        inner.generation += 1;
        inner.active = None;
        inner.typing_text = None;
        inner.is_chat_loading = false;
        inner.last_error = None;
        inner.phase.apply(ChatEvent::StartNewChat);
    }

    /// Stop the reveal timer and mark the revealing message complete.
    ///
    /// Bumps the generation only when a reveal was actually running, so a
    /// pending chat reply is not invalidated by a no-op.
    fn settle_reveal(&self, inner: &mut Inner) -> Option<u64> {
        let handle = inner.reveal.take();
        let completed = inner.active.as_mut().and_then(|session| {
            let id = session.complete_reveal()?;
            self.persist(session);
            Some(id)
        });

        if handle.is_some() || completed.is_some() {
            if let Some(handle) = handle {
                handle.abort();
            }
            inner.generation += 1;
            inner.typing_text = None;
            debug!(message_id = ?completed, "Reveal settled early");
        }
        completed
    }

    fn start_reveal(&self, inner: &mut Inner, text: String) {
        let Some(tag) = inner.tag() else {
            return;
        };
        debug!(session_id = %tag.session_id, chars = text.chars().count(), "Reveal started");
        inner.typing_text = Some(String::new());

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let finished = this
                .presenter
                .reveal(&text, |frame| this.on_reveal_frame(&tag, frame))
                .await;
            if finished {
                this.finish_reveal(&tag);
            } else {
                debug!(session_id = %tag.session_id, "Reveal superseded");
            }
        });
        inner.reveal = Some(handle);
    }

    fn on_reveal_frame(&self, tag: &Tag, frame: &str) -> bool {
        let mut guard = self.lock();
        if !guard.is_current(tag) {
            return false;
        }
        guard.typing_text = Some(frame.to_string());
        self.publish(&guard);
        true
    }

    fn finish_reveal(&self, tag: &Tag) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.is_current(tag) {
            return;
        }
        inner.reveal = None;
        inner.typing_text = None;
        if let Some(session) = inner.active.as_mut() {
            if let Some(id) = session.complete_reveal() {
                debug!(session_id = %session.session_id, message_id = id, "Reveal finished");
                self.persist(session);
            }
        }
        self.publish(inner);
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// `session_{unix millis}_{9 chars of [0-9a-z]}`.
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SESSION_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.random_range(0..SESSION_SUFFIX_ALPHABET.len());
            SESSION_SUFFIX_ALPHABET[idx] as char
        })
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// First message of every session.
pub fn welcome_message(file_name: &str) -> String {
    format!(
        "🎉 Welcome! I've successfully uploaded \"{}\".\n\n\
         The document has been processed and vectorized, and I'm ready to help you explore its contents.\n\n\
         Here are some things you can ask me:\n\
         • Summarize the main topics\n\
         • Explain specific concepts\n\
         • Find information about particular subjects\n\
         • Answer questions about the content\n\n\
         What would you like to know about this document?",
        file_name
    )
}

/// `Can you elaborate on: "<first 50 chars>..."`
pub fn elaborate_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(FOLLOW_UP_EXCERPT_CHARS).collect();
    format!("Can you elaborate on: \"{}...\"", excerpt)
}

fn failure_text(error: &ClientError) -> &'static str {
    if error.is_network() {
        NETWORK_FAILURE_TEXT
    } else {
        CHAT_FAILURE_TEXT
    }
}

fn is_pdf(mime_type: &str) -> bool {
    mime_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PDF_MIME_TYPE))
}
