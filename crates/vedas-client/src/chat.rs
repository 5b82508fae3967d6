//! Chat completion client.
//!
//! The remote chat endpoint's request schema is not fixed, so a turn is
//! attempted with each configured [`PayloadShape`] in order, moving on only
//! when the service answers with a non-2xx status. The reply text is read by
//! the first [`ReplyField`] extractor that finds a non-empty string.

use std::fmt;
use std::str::FromStr;

use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use vedas_core::types::{Message, Role};

use crate::endpoint::Endpoints;
use crate::error::ClientError;

/// Reply used when a successful response carries no usable text.
pub const PLACEHOLDER_REPLY: &str = "I received your message but couldn't generate a response.";

/// One prior turn sent along for context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryTurn {
    pub role: &'static str,
    pub content: String,
}

impl From<&Message> for HistoryTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.text.clone(),
        }
    }
}

/// A chat turn, tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatQuery {
    pub session_id: String,
    pub query: String,
    pub filename: String,
    /// Prior conversation, oldest first. Sent best-effort.
    pub history: Vec<HistoryTurn>,
}

impl ChatQuery {
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            filename: String::new(),
            history: Vec::new(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_history<'a>(mut self, messages: impl IntoIterator<Item = &'a Message>) -> Self {
        self.history = messages.into_iter().map(HistoryTurn::from).collect();
        self
    }
}

// =============================================================================
// Request encoders
// =============================================================================

/// Request body layouts the service has been seen to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadShape {
    /// `{query, filename, session_id, chat_history}`
    Query,
    /// `{message, filename, session_id}`
    Message,
    /// `{question, filename, session_id}`
    Question,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    filename: &'a str,
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_history: Option<&'a [HistoryTurn]>,
}

#[derive(Serialize)]
struct MessageBody<'a> {
    message: &'a str,
    filename: &'a str,
    session_id: &'a str,
}

#[derive(Serialize)]
struct QuestionBody<'a> {
    question: &'a str,
    filename: &'a str,
    session_id: &'a str,
}

impl PayloadShape {
    pub const ALL: [PayloadShape; 3] = [
        PayloadShape::Query,
        PayloadShape::Message,
        PayloadShape::Question,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadShape::Query => "query",
            PayloadShape::Message => "message",
            PayloadShape::Question => "question",
        }
    }

    /// Encode a turn in this shape.
    pub fn encode(&self, query: &ChatQuery, include_history: bool) -> Value {
        let encoded = match self {
            PayloadShape::Query => serde_json::to_value(QueryBody {
                query: &query.query,
                filename: &query.filename,
                session_id: &query.session_id,
                chat_history: include_history.then_some(query.history.as_slice()),
            }),
            PayloadShape::Message => serde_json::to_value(MessageBody {
                message: &query.query,
                filename: &query.filename,
                session_id: &query.session_id,
            }),
            PayloadShape::Question => serde_json::to_value(QuestionBody {
                question: &query.query,
                filename: &query.filename,
                session_id: &query.session_id,
            }),
        };
        // Plain string fields always serialize.
        encoded.unwrap_or(Value::Null)
    }
}

impl fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadShape {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" => Ok(PayloadShape::Query),
            "message" => Ok(PayloadShape::Message),
            "question" => Ok(PayloadShape::Question),
            other => Err(ClientError::InvalidRequest(format!(
                "unknown payload shape: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Response extractors
// =============================================================================

/// Reads the reply text from one top-level JSON field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyField(pub &'static str);

impl ReplyField {
    /// Returns the field's text when it is a non-blank string.
    pub fn extract(&self, body: &Value) -> Option<String> {
        body.get(self.0)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

/// Extractors in priority order.
pub const REPLY_FIELDS: [ReplyField; 3] = [
    ReplyField("response"),
    ReplyField("message"),
    ReplyField("answer"),
];

/// Pull the reply text out of a 2xx body.
pub fn extract_reply(body: &str) -> Result<String, ClientError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ClientError::MalformedResponse(format!("reply is not JSON: {}", e)))?;
    REPLY_FIELDS
        .iter()
        .find_map(|field| field.extract(&value))
        .ok_or_else(|| ClientError::MalformedResponse("no response, message or answer field".to_string()))
}

// =============================================================================
// Client
// =============================================================================

/// Successful chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub session_id: String,
    pub text: String,
    pub shape: PayloadShape,
    pub endpoint: Url,
    /// True when the placeholder was substituted for a malformed reply.
    pub placeholder: bool,
}

pub struct ChatClient {
    http: Client,
    endpoints: Endpoints,
    shapes: Vec<PayloadShape>,
    send_history: bool,
}

impl ChatClient {
    pub fn new(http: Client, endpoints: Endpoints) -> Self {
        Self {
            http,
            endpoints,
            shapes: PayloadShape::ALL.to_vec(),
            send_history: true,
        }
    }

    pub fn with_shapes(mut self, shapes: Vec<PayloadShape>) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn with_history(mut self, send_history: bool) -> Self {
        self.send_history = send_history;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Send one chat turn.
    ///
    /// Each payload shape gets one attempt per endpoint. The last failure is
    /// returned when every shape is rejected or unreachable.
    pub async fn send(&self, query: &ChatQuery) -> Result<ChatReply, ClientError> {
        let mut last_error = None;

        for (attempt, shape) in self.shapes.iter().enumerate() {
            let body = shape.encode(query, self.send_history);
            debug!(
                session_id = %query.session_id,
                attempt = attempt + 1,
                shape = %shape,
                "Sending chat request"
            );

            let delivered = match self
                .endpoints
                .post_with_fallback(&self.http, |builder| Ok(builder.json(&body)))
                .await
            {
                Ok(delivered) => delivered,
                Err(e) => {
                    warn!(session_id = %query.session_id, shape = %shape, error = %e, "Chat attempt failed");
                    last_error = Some(e);
                    continue;
                }
            };

            if !delivered.is_success() {
                warn!(
                    session_id = %query.session_id,
                    shape = %shape,
                    status = delivered.status.as_u16(),
                    "Chat attempt rejected"
                );
                last_error = Some(ClientError::ChatRequestFailed {
                    status: delivered.status.as_u16(),
                    body: delivered.body,
                });
                continue;
            }

            let (text, placeholder) = match extract_reply(&delivered.body) {
                Ok(text) => (text, false),
                Err(e) => {
                    warn!(session_id = %query.session_id, error = %e, "Using placeholder reply");
                    (PLACEHOLDER_REPLY.to_string(), true)
                }
            };

            return Ok(ChatReply {
                session_id: query.session_id.clone(),
                text,
                shape: *shape,
                endpoint: delivered.endpoint,
                placeholder,
            });
        }

        Err(last_error.unwrap_or_else(|| ClientError::InvalidRequest(
            "no payload shapes configured".to_string(),
        )))
    }
}
