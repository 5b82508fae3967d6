//! Primary/fallback endpoint pair.
//!
//! The primary URL is tried first. Only a transport failure (no HTTP response
//! at all) moves on to the fallback; any HTTP status from the primary, good or
//! bad, is final. Each URL is attempted at most once per call.

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use tracing::{debug, warn};

use crate::error::ClientError;

/// Two URLs for the same logical operation, tried in fixed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub primary: Url,
    pub fallback: Url,
}

/// A response that made it back from one of the endpoints.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub endpoint: Url,
    pub status: StatusCode,
    pub body: String,
}

impl Delivered {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl Endpoints {
    pub fn parse(primary: &str, fallback: &str) -> Result<Self, ClientError> {
        Ok(Self {
            primary: parse_url(primary)?,
            fallback: parse_url(fallback)?,
        })
    }

    /// POST to the primary endpoint, then to the fallback if the primary
    /// could not be reached.
    ///
    /// `build` is called once per attempt so that non-cloneable bodies
    /// (multipart forms) can be rebuilt.
    pub async fn post_with_fallback<F>(
        &self,
        client: &Client,
        build: F,
    ) -> Result<Delivered, ClientError>
    where
        F: Fn(RequestBuilder) -> Result<RequestBuilder, ClientError>,
    {
        let primary_err = match send_once(client, &self.primary, &build).await {
            Ok(delivered) => return Ok(delivered),
            Err(TransportFailure::Request(e)) => return Err(e),
            Err(TransportFailure::Transport(detail)) => detail,
        };

        warn!(
            endpoint = %self.primary,
            fallback = %self.fallback,
            error = %primary_err,
            "Primary endpoint unreachable, trying fallback"
        );

        match send_once(client, &self.fallback, &build).await {
            Ok(delivered) => Ok(delivered),
            Err(TransportFailure::Request(e)) => Err(e),
            Err(TransportFailure::Transport(fallback_err)) => {
                warn!(endpoint = %self.fallback, error = %fallback_err, "Fallback endpoint unreachable");
                Err(ClientError::NetworkUnavailable {
                    detail: format!("primary: {}; fallback: {}", primary_err, fallback_err),
                })
            }
        }
    }
}

enum TransportFailure {
    /// The request could not be built; retrying elsewhere would not help.
    Request(ClientError),
    Transport(String),
}

async fn send_once<F>(client: &Client, url: &Url, build: &F) -> Result<Delivered, TransportFailure>
where
    F: Fn(RequestBuilder) -> Result<RequestBuilder, ClientError>,
{
    let request = build(client.post(url.clone())).map_err(TransportFailure::Request)?;
    debug!(endpoint = %url, "Sending request");

    let response = request
        .send()
        .await
        .map_err(|e| TransportFailure::Transport(e.to_string()))?;
    let status = response.status();
    // The endpoint has answered, so a broken body still counts as its reply.
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!(
                endpoint = %url,
                status = status.as_u16(),
                error = %e,
                "Failed to read response body"
            );
            String::new()
        }
    };

    debug!(endpoint = %url, status = status.as_u16(), body_len = body.len(), "Response received");
    Ok(Delivered {
        endpoint: url.clone(),
        status,
        body,
    })
}

fn parse_url(raw: &str) -> Result<Url, ClientError> {
    Url::parse(raw).map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", raw, e)))
}
