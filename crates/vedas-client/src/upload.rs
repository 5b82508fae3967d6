//! Document upload client.
//!
//! Sends the document as `multipart/form-data` with a `file` part and a
//! `session_id` text part. The service's reply body is not relied upon: any
//! 2xx counts as success.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use tracing::{info, warn};

use crate::endpoint::Endpoints;
use crate::error::ClientError;

/// A document ready to be sent.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub session_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// What the caller needs to build the session after a successful upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub session_id: String,
    pub file_name: String,
    pub byte_size: u64,
    pub mime_type: String,
    pub endpoint: Url,
    /// Parsed reply, when the service sent JSON.
    pub body: Option<serde_json::Value>,
}

pub struct UploadClient {
    http: Client,
    endpoints: Endpoints,
}

impl UploadClient {
    pub fn new(http: Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Upload a document.
    ///
    /// Fails with `UploadFailed` on a non-2xx reply and with
    /// `NetworkUnavailable` when neither endpoint could be reached.
    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, ClientError> {
        let delivered = self
            .endpoints
            .post_with_fallback(&self.http, |builder| Ok(builder.multipart(build_form(request)?)))
            .await?;

        if !delivered.is_success() {
            warn!(
                session_id = %request.session_id,
                status = delivered.status.as_u16(),
                "Upload rejected"
            );
            return Err(ClientError::UploadFailed {
                status: delivered.status.as_u16(),
            });
        }

        let body = match serde_json::from_str::<serde_json::Value>(&delivered.body) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(session_id = %request.session_id, error = %e, "Upload reply was not JSON");
                None
            }
        };

        info!(
            session_id = %request.session_id,
            file = %request.file_name,
            bytes = request.bytes.len(),
            endpoint = %delivered.endpoint,
            "Document uploaded"
        );

        Ok(UploadReceipt {
            session_id: request.session_id.clone(),
            file_name: request.file_name.clone(),
            byte_size: request.bytes.len() as u64,
            mime_type: request.mime_type.clone(),
            endpoint: delivered.endpoint,
            body,
        })
    }
}

fn build_form(request: &UploadRequest) -> Result<Form, ClientError> {
    let part = Part::bytes(request.bytes.clone())
        .file_name(request.file_name.clone())
        .mime_str(&request.mime_type)
        .map_err(|e| ClientError::InvalidRequest(format!("invalid MIME type: {}", e)))?;
    Ok(Form::new()
        .part("file", part)
        .text("session_id", request.session_id.clone()))
}
