//! Session controller scenarios, driven by a scripted backend and an
//! in-memory session store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use vedas_chat::{
    ChatError, ChatPhase, IgnoreReason, SendOutcome, SessionController, TypingPresenter,
    CHAT_FAILURE_TEXT, NETWORK_FAILURE_TEXT,
};
use vedas_client::{
    ChatBackend, ChatQuery, ChatReply, ClientError, PayloadShape, UploadReceipt, UploadRequest,
    Url,
};
use vedas_core::config::ChatConfig;
use vedas_core::error::VedasError;
use vedas_core::identity::UserIdentity;
use vedas_core::types::{ChatSession, DocumentMeta, Message, RenderState, Role};
use vedas_storage::{MemorySessionStore, SessionRepository};

// =============================================================================
// Helpers
// =============================================================================

/// Backend that answers from a script and records what it was asked.
#[derive(Default)]
struct ScriptedBackend {
    upload_failures: Mutex<VecDeque<ClientError>>,
    replies: Mutex<VecDeque<Result<String, ClientError>>>,
    queries: Mutex<Vec<ChatQuery>>,
    /// When set, chat calls wait for a permit before answering.
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl ScriptedBackend {
    fn with_replies(replies: Vec<Result<&str, ClientError>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn fail_next_upload(&self, error: ClientError) {
        self.upload_failures.lock().unwrap().push_back(error);
    }

    fn queries(&self) -> Vec<ChatQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, ClientError> {
        if let Some(error) = self.upload_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(UploadReceipt {
            session_id: request.session_id,
            file_name: request.file_name,
            byte_size: request.bytes.len() as u64,
            mime_type: request.mime_type,
            endpoint: Url::parse("http://backend.test/upload_pdf/").unwrap(),
            body: None,
        })
    }

    async fn chat(&self, query: ChatQuery) -> Result<ChatReply, ClientError> {
        self.queries.lock().unwrap().push(query.clone());
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("default reply".to_string()));
        next.map(|text| ChatReply {
            session_id: query.session_id,
            text,
            shape: PayloadShape::Query,
            endpoint: Url::parse("http://backend.test/chat/").unwrap(),
            placeholder: false,
        })
    }
}

/// Repository whose writes always fail.
struct FailingRepository;

impl SessionRepository for FailingRepository {
    fn get(&self, _user: &UserIdentity) -> Result<Vec<ChatSession>, VedasError> {
        Ok(Vec::new())
    }

    fn save(&self, _user: &UserIdentity, _session: &ChatSession) -> Result<(), VedasError> {
        Err(VedasError::Storage("quota exceeded".to_string()))
    }

    fn delete(&self, _user: &UserIdentity, _session_id: &str) -> Result<bool, VedasError> {
        Err(VedasError::Storage("quota exceeded".to_string()))
    }
}

fn instant_config() -> ChatConfig {
    ChatConfig {
        typing_interval_ms: 0,
        ..ChatConfig::default()
    }
}

fn user() -> UserIdentity {
    UserIdentity::new("u1")
}

fn setup(
    backend: ScriptedBackend,
    config: ChatConfig,
) -> (SessionController, Arc<MemorySessionStore>, Arc<ScriptedBackend>) {
    let store = Arc::new(MemorySessionStore::in_memory());
    let backend = Arc::new(backend);
    let controller = SessionController::new(store.clone(), backend.clone(), user(), config);
    (controller, store, backend)
}

async fn upload_notes(controller: &SessionController) -> ChatSession {
    controller
        .upload_document("notes.pdf", "application/pdf", b"%PDF-1.4 notes".to_vec())
        .await
        .unwrap()
}

fn stored(store: &MemorySessionStore, session_id: &str) -> ChatSession {
    store.find(&user(), session_id).unwrap().unwrap()
}

fn seeded_session(id: &str, total_messages: usize) -> ChatSession {
    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let meta = DocumentMeta {
        name: format!("{}.pdf", id),
        byte_size: 4096,
        mime_type: "application/pdf".to_string(),
        upload_timestamp: now,
    };
    let mut session = ChatSession::new(id, meta, "Welcome", now);
    for i in 1..total_messages {
        let next = session.next_message_id();
        session.append(Message::user(next, format!("question {}", i), now));
    }
    session
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_creates_session_with_welcome_message() {
    let (controller, store, _) = setup(ScriptedBackend::default(), instant_config());
    assert_eq!(controller.phase(), ChatPhase::NoActiveSession);

    let session = upload_notes(&controller).await;

    assert_eq!(session.document_meta.name, "notes.pdf");
    assert_eq!(session.title, "notes.pdf");
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].role, Role::Assistant);
    assert!(session.messages[0].text.contains("\"notes.pdf\""));
    assert!(session.session_id.starts_with("session_"));

    assert_eq!(controller.phase(), ChatPhase::SessionActive);
    assert_eq!(controller.active_session(), Some(session.clone()));
    assert_eq!(stored(&store, &session.session_id), session);
}

#[tokio::test]
async fn test_non_pdf_is_rejected() {
    let (controller, store, _) = setup(ScriptedBackend::default(), instant_config());

    let result = controller
        .upload_document("photo.png", "image/png", vec![1, 2, 3])
        .await;

    assert!(matches!(result, Err(ChatError::UnsupportedDocument { .. })));
    assert!(store.get(&user()).unwrap().is_empty());
    assert_eq!(
        controller.snapshot().last_error.as_deref(),
        Some("Please upload a PDF file only.")
    );
}

#[tokio::test]
async fn test_upload_failure_stays_awaiting_upload() {
    let (controller, store, backend) = setup(ScriptedBackend::default(), instant_config());
    backend.fail_next_upload(ClientError::UploadFailed { status: 413 });

    controller.start_new_chat();
    let result = controller
        .upload_document("big.pdf", "application/pdf", vec![0; 16])
        .await;

    assert!(matches!(
        result,
        Err(ChatError::Upload(ClientError::UploadFailed { status: 413 }))
    ));
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, ChatPhase::AwaitingUpload);
    assert!(!snapshot.is_uploading);
    assert!(snapshot.last_error.is_some());
    assert!(store.get(&user()).unwrap().is_empty());

    // The same action can simply be retried
    upload_notes(&controller).await;
    assert_eq!(controller.phase(), ChatPhase::SessionActive);
}

// =============================================================================
// Chat turns
// =============================================================================

#[tokio::test]
async fn test_send_appends_user_message_then_reply() {
    let gate = Arc::new(Notify::new());
    let (controller, store, backend) = setup(
        ScriptedBackend::with_replies(vec![Ok("Chapter 1 introduces the Vedas.")])
            .gated(gate.clone()),
        instant_config(),
    );
    let session = upload_notes(&controller).await;

    let entered = backend.entered.clone();
    let sender = controller.clone();
    let turn = tokio::spawn(async move { sender.send_message("Summarize chapter 1").await });
    entered.notified().await;

    // While the request is in flight
    let snapshot = controller.snapshot();
    assert!(snapshot.is_chat_loading);
    assert_eq!(snapshot.phase, ChatPhase::AwaitingReply);
    let active = snapshot.active_session.unwrap();
    assert_eq!(active.messages.len(), 2);
    assert_eq!(active.messages[1].role, Role::User);
    assert_eq!(active.messages[1].text, "Summarize chapter 1");
    assert_eq!(stored(&store, &session.session_id).messages.len(), 2);

    gate.notify_one();
    let outcome = turn.await.unwrap();
    assert_eq!(outcome, SendOutcome::Replied { message_id: 3 });
    assert!(!controller.is_chat_loading());
    assert_eq!(controller.phase(), ChatPhase::SessionActive);

    controller.wait_for_reveal().await;
    let active = controller.active_session().unwrap();
    assert_eq!(active.messages.len(), 3);
    assert_eq!(active.messages[2].role, Role::Assistant);
    assert_eq!(active.messages[2].text, "Chapter 1 introduces the Vedas.");
    assert_eq!(active.messages[2].render_state, RenderState::Complete);
    assert!(controller.snapshot().typing_text.is_none());

    let persisted = stored(&store, &session.session_id);
    assert_eq!(persisted.messages.len(), 3);
    assert_eq!(persisted.messages[2].render_state, RenderState::Complete);
}

#[tokio::test]
async fn test_query_carries_session_file_and_history() {
    let (controller, _, backend) = setup(
        ScriptedBackend::with_replies(vec![Ok("first"), Ok("second")]),
        instant_config(),
    );
    let session = upload_notes(&controller).await;

    controller.send_message("one").await;
    controller.wait_for_reveal().await;
    controller.send_message("two").await;
    controller.wait_for_reveal().await;

    let queries = backend.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].session_id, session.session_id);
    assert_eq!(queries[0].filename, "notes.pdf");
    assert_eq!(queries[0].query, "one");
    // Welcome only, then welcome + one + first
    assert_eq!(queries[0].history.len(), 1);
    assert_eq!(queries[1].history.len(), 3);
    assert_eq!(queries[1].history[2].content, "first");
}

#[tokio::test]
async fn test_chat_500_appends_failure_message() {
    let (controller, store, _) = setup(
        ScriptedBackend::with_replies(vec![Err(ClientError::ChatRequestFailed {
            status: 500,
            body: "Internal Server Error".to_string(),
        })]),
        instant_config(),
    );
    let session = upload_notes(&controller).await;

    let outcome = controller.send_message("Summarize chapter 1").await;

    assert!(matches!(
        outcome,
        SendOutcome::Failed {
            message_id: 3,
            error: ClientError::ChatRequestFailed { status: 500, .. }
        }
    ));
    let snapshot = controller.snapshot();
    assert!(!snapshot.is_chat_loading);
    assert_eq!(snapshot.phase, ChatPhase::SessionActive);
    assert!(snapshot.last_error.is_some());

    let active = snapshot.active_session.unwrap();
    let last = active.messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.text, CHAT_FAILURE_TEXT);
    assert_eq!(stored(&store, &session.session_id), active);

    // The conversation carries on
    let outcome = controller.send_message("Try again").await;
    assert!(matches!(outcome, SendOutcome::Replied { .. }));
}

#[tokio::test]
async fn test_network_failure_uses_connection_text() {
    let (controller, _, _) = setup(
        ScriptedBackend::with_replies(vec![Err(ClientError::NetworkUnavailable {
            detail: "connection refused".to_string(),
        })]),
        instant_config(),
    );
    upload_notes(&controller).await;

    controller.send_message("hello").await;

    let active = controller.active_session().unwrap();
    assert_eq!(active.messages.last().unwrap().text, NETWORK_FAILURE_TEXT);
}

#[tokio::test]
async fn test_send_while_awaiting_reply_is_ignored() {
    let gate = Arc::new(Notify::new());
    let (controller, _, backend) = setup(
        ScriptedBackend::default().gated(gate.clone()),
        instant_config(),
    );
    upload_notes(&controller).await;

    let entered = backend.entered.clone();
    let sender = controller.clone();
    let turn = tokio::spawn(async move { sender.send_message("first").await });
    entered.notified().await;

    let outcome = controller.send_message("second").await;
    assert_eq!(outcome, SendOutcome::Ignored(IgnoreReason::Busy));
    assert_eq!(controller.active_session().unwrap().messages.len(), 2);

    gate.notify_one();
    turn.await.unwrap();
    assert_eq!(backend.queries().len(), 1);
}

#[tokio::test]
async fn test_blank_and_oversized_messages_are_ignored() {
    let config = ChatConfig {
        max_message_length: 10,
        ..instant_config()
    };
    let (controller, _, backend) = setup(ScriptedBackend::default(), config);

    assert_eq!(
        controller.send_message("hello").await,
        SendOutcome::Ignored(IgnoreReason::NoSession)
    );

    upload_notes(&controller).await;
    assert_eq!(
        controller.send_message("   \n").await,
        SendOutcome::Ignored(IgnoreReason::Empty)
    );
    assert_eq!(
        controller.send_message("this is far too long").await,
        SendOutcome::Ignored(IgnoreReason::TooLong)
    );
    assert_eq!(controller.active_session().unwrap().messages.len(), 1);
    assert!(backend.queries().is_empty());
}

#[tokio::test]
async fn test_message_count_never_decreases() {
    let (controller, _, _) = setup(
        ScriptedBackend::with_replies(vec![
            Ok("a"),
            Err(ClientError::MalformedResponse("no fields".to_string())),
            Ok("c"),
        ]),
        instant_config(),
    );
    upload_notes(&controller).await;

    let mut rx = controller.subscribe();
    let mut last_len = controller.active_session().unwrap().messages.len();
    for text in ["one", "two", "three"] {
        controller.send_message(text).await;
        controller.wait_for_reveal().await;
        let len = controller.active_session().unwrap().messages.len();
        assert!(len >= last_len);
        last_len = len;
    }
    assert_eq!(last_len, 7);

    let seen = rx.borrow_and_update().clone();
    assert_eq!(seen.active_session.unwrap().messages.len(), 7);
}

// =============================================================================
// Reveal
// =============================================================================

#[tokio::test]
async fn test_reveal_prefixes_and_final_state() {
    let reply = "Dharma means duty.";
    let (controller, store, _) = setup(
        ScriptedBackend::with_replies(vec![Ok(reply)]),
        ChatConfig {
            typing_interval_ms: 1,
            ..ChatConfig::default()
        },
    );
    let session = upload_notes(&controller).await;

    let frames: Vec<_> = TypingPresenter::prefixes(reply).collect();
    assert_eq!(frames.len(), reply.chars().count());
    assert_eq!(frames.last().copied(), Some(reply));

    controller.send_message("What is dharma?").await;
    assert!(controller.snapshot().typing_text.is_some());
    assert!(controller.active_session().unwrap().messages[2].is_revealing());

    controller.wait_for_reveal().await;
    let persisted = stored(&store, &session.session_id);
    assert_eq!(persisted.messages[2].text, reply);
    assert_eq!(persisted.messages[2].render_state, RenderState::Complete);
}

#[tokio::test]
async fn test_switching_session_completes_running_reveal() {
    let (controller, store, _) = setup(
        ScriptedBackend::with_replies(vec![Ok("a reply that takes a long while to type out")]),
        ChatConfig {
            typing_interval_ms: 200,
            ..ChatConfig::default()
        },
    );
    let first = upload_notes(&controller).await;
    controller.send_message("question").await;
    assert!(controller.active_session().unwrap().messages[2].is_revealing());

    let second = seeded_session("other", 1);
    store.save(&user(), &second).unwrap();
    controller.load_session("other").unwrap();

    let persisted = stored(&store, &first.session_id);
    assert_eq!(persisted.messages.len(), 3);
    assert_eq!(persisted.messages[2].render_state, RenderState::Complete);
    assert_eq!(
        controller.active_session().unwrap().session_id,
        second.session_id
    );
    assert!(controller.snapshot().typing_text.is_none());

    // The stopped timer must not touch the newly opened session
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(controller.active_session().unwrap(), second);
}

#[tokio::test]
async fn test_complete_reveal_skips_animation() {
    let (controller, store, _) = setup(
        ScriptedBackend::with_replies(vec![Ok("slow reply")]),
        ChatConfig {
            typing_interval_ms: 500,
            ..ChatConfig::default()
        },
    );
    let session = upload_notes(&controller).await;
    controller.send_message("go").await;

    assert_eq!(controller.complete_reveal(), Some(3));
    assert_eq!(controller.complete_reveal(), None);
    assert_eq!(
        stored(&store, &session.session_id).messages[2].render_state,
        RenderState::Complete
    );
}

// =============================================================================
// Session management
// =============================================================================

#[tokio::test]
async fn test_start_new_chat_keeps_previous_session() {
    let (controller, store, _) = setup(
        ScriptedBackend::with_replies(vec![Ok("reply")]),
        instant_config(),
    );
    let session = upload_notes(&controller).await;
    controller.send_message("hello").await;
    controller.wait_for_reveal().await;
    let before = stored(&store, &session.session_id);

    controller.start_new_chat();

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, ChatPhase::AwaitingUpload);
    assert!(snapshot.active_session.is_none());
    assert_eq!(stored(&store, &session.session_id), before);
    assert_eq!(before.messages.len(), 3);
}

#[tokio::test]
async fn test_load_then_resave_is_byte_identical() {
    let (controller, store, _) = setup(ScriptedBackend::default(), instant_config());
    store.save(&user(), &seeded_session("A", 1)).unwrap();
    store.save(&user(), &seeded_session("B", 3)).unwrap();
    let before = store.raw_record(&user()).unwrap().unwrap();

    let loaded = controller.load_session("A").unwrap();
    store.save(&user(), &loaded).unwrap();

    assert_eq!(store.raw_record(&user()).unwrap().unwrap(), before);
}

#[tokio::test]
async fn test_load_unknown_session() {
    let (controller, _, _) = setup(ScriptedBackend::default(), instant_config());
    let result = controller.load_session("missing");
    assert!(matches!(result, Err(ChatError::SessionNotFound(id)) if id == "missing"));
    assert_eq!(controller.phase(), ChatPhase::NoActiveSession);
}

#[tokio::test]
async fn test_delete_active_session() {
    let (controller, store, _) = setup(ScriptedBackend::default(), instant_config());
    let session = upload_notes(&controller).await;

    assert!(controller.delete_session(&session.session_id));

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, ChatPhase::NoActiveSession);
    assert!(snapshot.active_session.is_none());
    assert!(store.find(&user(), &session.session_id).unwrap().is_none());
    assert!(!controller.delete_session(&session.session_id));
}

#[tokio::test]
async fn test_delete_other_session_leaves_active_untouched() {
    let (controller, store, _) = setup(ScriptedBackend::default(), instant_config());
    store.save(&user(), &seeded_session("A", 1)).unwrap();
    store.save(&user(), &seeded_session("B", 3)).unwrap();

    controller.load_session("B").unwrap();
    let before = controller.snapshot();

    assert!(controller.delete_session("A"));

    let sessions = store.get(&user()).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "B");
    assert_eq!(sessions[0].messages.len(), 3);
    assert_eq!(controller.snapshot(), before);
    assert_eq!(controller.active_session().unwrap().session_id, "B");
}

#[tokio::test]
async fn test_superseded_reply_is_discarded() {
    let gate = Arc::new(Notify::new());
    let (controller, store, backend) = setup(
        ScriptedBackend::with_replies(vec![Ok("late reply")]).gated(gate.clone()),
        instant_config(),
    );
    let session = upload_notes(&controller).await;

    let entered = backend.entered.clone();
    let sender = controller.clone();
    let turn = tokio::spawn(async move { sender.send_message("question").await });
    entered.notified().await;

    controller.start_new_chat();
    gate.notify_one();

    assert_eq!(turn.await.unwrap(), SendOutcome::Superseded);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, ChatPhase::AwaitingUpload);
    assert!(!snapshot.is_chat_loading);

    let persisted = stored(&store, &session.session_id);
    assert_eq!(persisted.messages.len(), 2);
    assert_eq!(persisted.messages[1].text, "question");
}

#[tokio::test]
async fn test_list_sessions_newest_first() {
    let (controller, store, _) = setup(ScriptedBackend::default(), instant_config());
    let mut old = seeded_session("old", 1);
    old.last_updated_at = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
    store.save(&user(), &old).unwrap();
    let session = upload_notes(&controller).await;

    let summaries = controller.list_sessions().unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].session_id, session.session_id);
    assert_eq!(summaries[0].title, "notes.pdf");
    assert_eq!(summaries[1].session_id, "old");
}

#[tokio::test]
async fn test_follow_up_prompt_for_assistant_messages_only() {
    let (controller, _, _) = setup(
        ScriptedBackend::with_replies(vec![Ok("The Rigveda is the oldest of the four Vedas.")]),
        instant_config(),
    );
    upload_notes(&controller).await;
    controller.send_message("Which Veda is oldest?").await;
    controller.wait_for_reveal().await;

    assert_eq!(
        controller.follow_up_prompt(3).as_deref(),
        Some("Can you elaborate on: \"The Rigveda is the oldest of the four Vedas....\"")
    );
    assert!(controller.follow_up_prompt(2).is_none());
    assert!(controller.follow_up_prompt(99).is_none());
}

#[tokio::test]
async fn test_storage_failure_is_not_surfaced() {
    let backend = Arc::new(ScriptedBackend::with_replies(vec![Ok("still works")]));
    let controller = SessionController::new(
        Arc::new(FailingRepository),
        backend,
        user(),
        instant_config(),
    );

    let session = upload_notes(&controller).await;
    assert_eq!(controller.phase(), ChatPhase::SessionActive);

    let outcome = controller.send_message("hello").await;
    assert!(matches!(outcome, SendOutcome::Replied { .. }));
    controller.wait_for_reveal().await;
    assert_eq!(controller.active_session().unwrap().messages.len(), 3);
    assert_eq!(controller.active_session().unwrap().session_id, session.session_id);
}

#[tokio::test]
async fn test_delete_closes_active_session_when_storage_fails() {
    let controller = SessionController::new(
        Arc::new(FailingRepository),
        Arc::new(ScriptedBackend::default()),
        user(),
        instant_config(),
    );

    let session = upload_notes(&controller).await;
    assert_eq!(controller.phase(), ChatPhase::SessionActive);

    assert!(!controller.delete_session(&session.session_id));
    assert_eq!(controller.phase(), ChatPhase::NoActiveSession);
    assert!(controller.active_session().is_none());
    assert!(controller.snapshot().last_error.is_none());
}

#[tokio::test]
async fn test_subscriber_sees_state_changes() {
    let (controller, _, _) = setup(ScriptedBackend::default(), instant_config());
    let mut rx = controller.subscribe();

    controller.start_new_chat();
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().phase, ChatPhase::AwaitingUpload);

    upload_notes(&controller).await;
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.phase, ChatPhase::SessionActive);
    assert_eq!(
        snapshot.active_session.unwrap().document_meta.name,
        "notes.pdf"
    );
}
