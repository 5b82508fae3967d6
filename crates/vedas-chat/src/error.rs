//! Error types for the session controller.

use vedas_client::ClientError;
use vedas_core::error::VedasError;

/// Failures the controller reports to its caller.
///
/// A failed chat turn is not one of them: it is recorded in the conversation
/// as an assistant message instead.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("unsupported document type: {mime_type} (only PDF files are accepted)")]
    UnsupportedDocument { mime_type: String },
    #[error("an upload is already in progress")]
    UploadInProgress,
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("upload failed: {0}")]
    Upload(#[from] ClientError),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<VedasError> for ChatError {
    fn from(err: VedasError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

impl ChatError {
    /// Short text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::UnsupportedDocument { .. } => "Please upload a PDF file only.".to_string(),
            ChatError::Upload(e) if e.is_network() => {
                "Unable to reach the upload service. Please check your connection and try again."
                    .to_string()
            }
            ChatError::Upload(_) => "Failed to upload PDF. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}
