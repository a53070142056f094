//! Blocking HTTP helper for the dashboard server.
use std::fmt;
use std::time::Duration;

use od_base::Snapshot;
use reqwest::blocking::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretBox};
use serde::Serialize;

use super::constants::{AUTH_STATUS_PATH, CHAT_PATH, EVENTS_PATH, STATE_PATH};

/// Timeout for request/response calls (not streams)
const PULL_TIMEOUT_SECS: u64 = 15;

/// Typed error for server calls.
#[derive(Debug)]
pub enum ApiError {
    /// Server rejected the session (401/403). Never retried.
    Unauthorized,
    /// Network-level failure (DNS, connection, timeout)
    Network(String),
    /// Server returned another non-success status
    Api { status: u16, body: String },
    /// Error while reading a streamed body
    StreamRead(String),
    /// Response body was not the expected JSON
    Parse(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Session is no longer authorized"),
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Api { status, body } => write!(f, "API error {}: {}", status, body),
            ApiError::StreamRead(msg) => write!(f, "Stream read error: {}", msg),
            ApiError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => ApiError::Unauthorized,
            _ if e.is_decode() => ApiError::Parse(e.to_string()),
            _ => ApiError::Network(e.to_string()),
        }
    }
}

/// Map a failed response to the error taxonomy. 401/403 always means the
/// session is gone, whatever the endpoint.
fn classify_failure(status: u16, body: String) -> ApiError {
    match status {
        401 | 403 => ApiError::Unauthorized,
        _ => ApiError::Api { status, body },
    }
}

/// Body of a chat turn submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnRequest {
    pub message: String,
    pub attachments: Vec<String>,
}

pub struct ApiClient {
    base_url: String,
    token: Option<SecretBox<String>>,
    client: Client,
    /// No read timeout: push and chat bodies stay open for as long as the server likes.
    stream_client: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<SecretBox<String>>) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(Duration::from_secs(PULL_TIMEOUT_SECS)).build()?;
        let stream_client = Client::builder().timeout(None).build()?;
        Ok(Self { base_url: base_url.into(), token, client, stream_client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn checked(response: Response) -> Result<Response, ApiError> {
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(classify_failure(status, body))
    }

    /// Pull the current snapshot.
    pub fn fetch_snapshot(&self) -> Result<Snapshot, ApiError> {
        let response = Self::checked(self.authorize(self.client.get(self.url(STATE_PATH))).send()?)?;
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Authenticated session check: Ok when the session is still valid.
    pub fn check_session(&self) -> Result<(), ApiError> {
        Self::checked(self.authorize(self.client.get(self.url(AUTH_STATUS_PATH))).send()?).map(|_| ())
    }

    /// Open the server-push stream. The returned body yields `data:` frames.
    pub fn open_events(&self) -> Result<Response, ApiError> {
        let request = self.stream_client.get(self.url(EVENTS_PATH)).header("accept", "text/event-stream");
        Self::checked(self.authorize(request).send()?)
    }

    /// Submit one chat message. The returned body yields turn frames.
    pub fn submit_turn(&self, turn: &TurnRequest) -> Result<Response, ApiError> {
        let request = self.stream_client.post(self.url(CHAT_PATH)).header("accept", "text/event-stream").json(turn);
        Self::checked(self.authorize(request).send()?)
    }
}
