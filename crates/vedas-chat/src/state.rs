//! Session controller phases and the events that move between them.
//!
//! - NoActiveSession -> AwaitingUpload (start new chat)
//! - AwaitingUpload -> SessionActive (upload succeeded)
//! - AwaitingUpload -> AwaitingUpload (upload failed)
//! - SessionActive -> AwaitingReply (message sent)
//! - AwaitingReply -> SessionActive (reply arrived, or reply failed)
//! - any -> SessionActive (session loaded)
//! - any -> NoActiveSession (active session deleted)
//! - any -> AwaitingUpload (start new chat)

use std::fmt;

use serde::Serialize;

/// Where the controller is in the upload / conversation lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    /// Nothing open. Initial phase, and the phase after the open session is deleted.
    #[default]
    NoActiveSession,
    /// Waiting for a document to start a new session.
    AwaitingUpload,
    /// A session is open and ready for the next message.
    SessionActive,
    /// A chat request is in flight. Further sends are ignored.
    AwaitingReply,
}

/// Something that happened to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatEvent {
    StartNewChat,
    UploadSucceeded,
    UploadFailed,
    SendMessage,
    ReplyArrived,
    ReplyFailed,
    LoadSession,
    DeleteActiveSession,
}

impl fmt::Display for ChatPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatPhase::NoActiveSession => write!(f, "NoActiveSession"),
            ChatPhase::AwaitingUpload => write!(f, "AwaitingUpload"),
            ChatPhase::SessionActive => write!(f, "SessionActive"),
            ChatPhase::AwaitingReply => write!(f, "AwaitingReply"),
        }
    }
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ChatPhase {
    /// The phase `event` leads to, or `None` if the event is not valid here.
    pub fn next(&self, event: ChatEvent) -> Option<ChatPhase> {
        use ChatEvent::*;
        use ChatPhase::*;

        match (self, event) {
            (_, StartNewChat) => Some(AwaitingUpload),
            (AwaitingUpload, UploadSucceeded) => Some(SessionActive),
            (AwaitingUpload, UploadFailed) => Some(AwaitingUpload),
            (SessionActive, SendMessage) => Some(AwaitingReply),
            (AwaitingReply, ReplyArrived) | (AwaitingReply, ReplyFailed) => Some(SessionActive),
            (_, LoadSession) => Some(SessionActive),
            (_, DeleteActiveSession) => Some(NoActiveSession),
            _ => None,
        }
    }

    /// Apply `event`, leaving the phase untouched if it is not valid here.
    ///
    /// Returns whether the event was accepted.
    pub fn apply(&mut self, event: ChatEvent) -> bool {
        match self.next(event) {
            Some(target) => {
                tracing::debug!("Chat phase: {} -> {} ({})", *self, target, event);
                *self = target;
                true
            }
            None => {
                tracing::debug!("Ignoring {} in phase {}", event, *self);
                false
            }
        }
    }

    /// Whether a session is open, with or without a reply pending.
    pub fn has_session(&self) -> bool {
        matches!(self, ChatPhase::SessionActive | ChatPhase::AwaitingReply)
    }
}

// =============================================================================
// Tests
// =============================================================================
