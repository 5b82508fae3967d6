//! Session repository over local key/value storage.
//!
//! Every operation is a read-modify-write of the user's whole session list:
//! read the JSON array stored under the user's key, splice it, write it back.
//! Concurrent writers are not coordinated; the last write wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use vedas_core::error::VedasError;
use vedas_core::identity::UserIdentity;
use vedas_core::types::ChatSession;

use crate::db::Database;

/// Persistence boundary used by the chat controller.
pub trait SessionRepository: Send + Sync {
    /// All sessions stored for `user`, in stored order (newest first).
    fn get(&self, user: &UserIdentity) -> Result<Vec<ChatSession>, VedasError>;

    /// Insert or replace a session, keyed by `session_id`.
    fn save(&self, user: &UserIdentity, session: &ChatSession) -> Result<(), VedasError>;

    /// Remove a session. Returns whether it existed.
    fn delete(&self, user: &UserIdentity, session_id: &str) -> Result<bool, VedasError>;

    fn find(
        &self,
        user: &UserIdentity,
        session_id: &str,
    ) -> Result<Option<ChatSession>, VedasError> {
        Ok(self
            .get(user)?
            .into_iter()
            .find(|s| s.session_id == session_id))
    }
}

/// Raw string storage addressed by key.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, VedasError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), VedasError>;
    fn remove_item(&self, key: &str) -> Result<bool, VedasError>;
}

impl KeyValueStore for Database {
    fn get_item(&self, key: &str) -> Result<Option<String>, VedasError> {
        Database::get_item(self, key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), VedasError> {
        Database::set_item(self, key, value)
    }

    fn remove_item(&self, key: &str) -> Result<bool, VedasError> {
        Database::remove_item(self, key)
    }
}

/// Process-local key/value storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    fn items(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, VedasError> {
        self.items
            .lock()
            .map_err(|e| VedasError::Storage(format!("storage lock poisoned: {}", e)))
    }
}

impl KeyValueStore for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, VedasError> {
        Ok(self.items()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), VedasError> {
        self.items()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<bool, VedasError> {
        Ok(self.items()?.remove(key).is_some())
    }
}

/// Session lists serialized as JSON text, one record per user.
pub struct SessionStore<S> {
    storage: Arc<S>,
    key_prefix: String,
}

/// Durable store backed by the SQLite `local_storage` table.
pub type LocalSessionStore = SessionStore<Database>;

/// Ephemeral store, used by tests and throwaway runs.
pub type MemorySessionStore = SessionStore<MemoryStorage>;

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(storage: Arc<S>, key_prefix: impl Into<String>) -> Self {
        Self {
            storage,
            key_prefix: key_prefix.into(),
        }
    }

    /// The JSON text stored for `user`, exactly as persisted.
    pub fn raw_record(&self, user: &UserIdentity) -> Result<Option<String>, VedasError> {
        self.storage.get_item(&user.storage_key(&self.key_prefix))
    }

    fn read(&self, key: &str) -> Result<Vec<ChatSession>, VedasError> {
        match self.storage.get_item(key)? {
            Some(text) if !text.trim().is_empty() => serde_json::from_str(&text).map_err(|e| {
                VedasError::Serialization(format!("corrupt session list under {}: {}", key, e))
            }),
            _ => Ok(Vec::new()),
        }
    }

    fn write(&self, key: &str, sessions: &[ChatSession]) -> Result<(), VedasError> {
        let text = serde_json::to_string(sessions)?;
        self.storage.set_item(key, &text)
    }
}

impl MemorySessionStore {
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::default()), "vedas_chat_sessions")
    }
}

impl<S: KeyValueStore> SessionRepository for SessionStore<S> {
    fn get(&self, user: &UserIdentity) -> Result<Vec<ChatSession>, VedasError> {
        self.read(&user.storage_key(&self.key_prefix))
    }

    fn save(&self, user: &UserIdentity, session: &ChatSession) -> Result<(), VedasError> {
        let key = user.storage_key(&self.key_prefix);
        let mut sessions = self.read(&key)?;
        match sessions
            .iter_mut()
            .find(|s| s.session_id == session.session_id)
        {
            Some(existing) => *existing = session.clone(),
            None => sessions.insert(0, session.clone()),
        }
        self.write(&key, &sessions)?;
        debug!(
            key = %key,
            session_id = %session.session_id,
            messages = session.messages.len(),
            "Session saved"
        );
        Ok(())
    }

    fn delete(&self, user: &UserIdentity, session_id: &str) -> Result<bool, VedasError> {
        let key = user.storage_key(&self.key_prefix);
        let mut sessions = self.read(&key)?;
        let before = sessions.len();
        sessions.retain(|s| s.session_id != session_id);
        if sessions.len() == before {
            return Ok(false);
        }
        self.write(&key, &sessions)?;
        debug!(key = %key, session_id = %session_id, "Session deleted");
        Ok(true)
    }
}
