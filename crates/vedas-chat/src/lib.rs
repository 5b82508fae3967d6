//! Chat session orchestration for Vedas.
//!
//! The [`SessionController`] owns the open conversation: it uploads documents,
//! sends chat turns through a [`vedas_client::ChatBackend`], reveals replies
//! through the [`TypingPresenter`] and keeps the session store in step with
//! what is on screen. UIs observe it through [`ControllerSnapshot`]s.

pub mod controller;
pub mod error;
pub mod presenter;
pub mod state;

pub use controller::{
    elaborate_prompt, generate_session_id, welcome_message, ControllerSnapshot, IgnoreReason,
    SendOutcome, SessionController, CHAT_FAILURE_TEXT, NETWORK_FAILURE_TEXT, PDF_MIME_TYPE,
};
pub use error::ChatError;
pub use presenter::TypingPresenter;
pub use state::{ChatEvent, ChatPhase};
