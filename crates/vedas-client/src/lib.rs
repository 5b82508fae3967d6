//! HTTP clients for the remote document-chat service.
//!
//! The service exposes two operations, document upload and chat completion,
//! each reachable through a primary URL and a fallback URL. Neither schema is
//! documented, so requests are built by an ordered list of payload shapes and
//! replies are read by an ordered list of field extractors.

pub mod backend;
pub mod chat;
pub mod endpoint;
pub mod error;
pub mod upload;

pub use backend::{ChatBackend, HttpChatBackend};
pub use chat::{ChatClient, ChatQuery, ChatReply, HistoryTurn, PayloadShape, PLACEHOLDER_REPLY};
pub use endpoint::{Delivered, Endpoints};
pub use error::ClientError;
pub use upload::{UploadClient, UploadReceipt, UploadRequest};

pub use reqwest::Url;
