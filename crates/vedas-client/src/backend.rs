//! Seam between the session controller and the remote service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;
use vedas_core::config::{ChatConfig, EndpointConfig};

use crate::chat::{ChatClient, ChatQuery, ChatReply, PayloadShape};
use crate::endpoint::Endpoints;
use crate::error::ClientError;
use crate::upload::{UploadClient, UploadReceipt, UploadRequest};

/// Remote operations the chat controller depends on.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, ClientError>;

    async fn chat(&self, query: ChatQuery) -> Result<ChatReply, ClientError>;
}

/// The real service, reached over HTTP.
pub struct HttpChatBackend {
    upload: UploadClient,
    chat: ChatClient,
}

impl HttpChatBackend {
    pub fn new(upload: UploadClient, chat: ChatClient) -> Self {
        Self { upload, chat }
    }

    /// Build both clients from configuration, sharing one connection pool.
    pub fn from_config(endpoints: &EndpointConfig, chat: &ChatConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(endpoints.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ClientError::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;

        let shapes = chat
            .payload_shapes
            .iter()
            .map(|s| s.parse::<PayloadShape>())
            .collect::<Result<Vec<_>, _>>()?;

        let upload_endpoints = Endpoints::parse(&endpoints.upload_primary, &endpoints.upload_fallback)?;
        let chat_endpoints = Endpoints::parse(&endpoints.chat_primary, &endpoints.chat_fallback)?;

        info!(
            upload = %upload_endpoints.primary,
            chat = %chat_endpoints.primary,
            shapes = shapes.len(),
            "HTTP chat backend configured"
        );

        Ok(Self {
            upload: UploadClient::new(http.clone(), upload_endpoints),
            chat: ChatClient::new(http, chat_endpoints)
                .with_shapes(shapes)
                .with_history(chat.send_history),
        })
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, ClientError> {
        self.upload.upload(&request).await
    }

    async fn chat(&self, query: ChatQuery) -> Result<ChatReply, ClientError> {
        self.chat.send(&query).await
    }
}
