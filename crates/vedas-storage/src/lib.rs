//! Vedas Storage crate - durable local persistence for chat sessions.
//!
//! Emulates browser-style local storage with a WAL-mode SQLite key/value
//! table, and exposes the session repository the chat controller writes
//! through. Each user's session list lives as JSON text under a key
//! namespaced by the user's identity.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{
    KeyValueStore, LocalSessionStore, MemorySessionStore, MemoryStorage, SessionRepository,
    SessionStore,
};
