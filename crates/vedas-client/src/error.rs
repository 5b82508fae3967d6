//! Error types for the upload and chat clients.

use vedas_core::error::VedasError;

/// Failures talking to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Every transport attempt (primary and fallback) failed before a response arrived.
    #[error("network unavailable: {detail}")]
    NetworkUnavailable { detail: String },
    /// The service answered the upload with a non-2xx status.
    #[error("upload failed with status: {status}")]
    UploadFailed { status: u16 },
    /// The service answered every chat attempt with a non-2xx status.
    #[error("chat request failed with status {status}: {body}")]
    ChatRequestFailed { status: u16, body: String },
    /// A 2xx reply carried none of the expected fields.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Whether the failure happened before the service was reached.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::NetworkUnavailable { .. })
    }

    /// HTTP status of a rejected request, if the service answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::UploadFailed { status } | ClientError::ChatRequestFailed { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<ClientError> for VedasError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::InvalidEndpoint(msg) => VedasError::Config(msg),
            other => VedasError::Network(other.to_string()),
        }
    }
}
