//! Identity of the signed-in user, as supplied by the authentication layer.
//!
//! Only used to namespace persisted sessions and for display.

use serde::{Deserialize, Serialize};

/// Bucket used when nobody is signed in.
pub const ANONYMOUS_BUCKET: &str = "anonymous";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: Option<String>,
    pub email: Option<String>,
}

impl UserIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            email: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Storage key holding this user's session list, e.g. `vedas_chat_sessions_u1`.
    ///
    /// Blank uids fall into the anonymous bucket.
    pub fn storage_key(&self, prefix: &str) -> String {
        let bucket = self
            .uid
            .as_deref()
            .map(str::trim)
            .filter(|uid| !uid.is_empty())
            .unwrap_or(ANONYMOUS_BUCKET);
        format!("{}_{}", prefix, bucket)
    }

    pub fn display_name(&self) -> &str {
        self.email
            .as_deref()
            .or(self.uid.as_deref())
            .unwrap_or("Guest")
    }
}
