//! Wire contract with the assistant backend.
//!
//! Endpoints, all relative to the configured base URL:
//! - `POST /chat` `{question, history, model}` → `{answer}`
//! - `POST /generate-cv` and `POST /generate-cover-letter`
//!   `{job_description, model}` → document bytes, or `{detail}` on failure
//! - `GET /` → `{status, message}`

pub mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::state::ChatMessage;

pub const CHAT_PATH: &str = "/chat";
pub const HEALTH_PATH: &str = "/";

/// Raw HTTP exchange result, before any interpretation of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode a JSON body, treating any shape mismatch as a transport failure.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Classify a non-success response.
    ///
    /// A body of the form `{"detail": "..."}` becomes a guardrail or domain
    /// error; anything else is reported as a transport failure.
    pub fn into_error(self) -> ClientError {
        match serde_json::from_slice::<ErrorBody>(&self.body) {
            Ok(body) => ClientError::from_detail(body.detail),
            Err(_) => ClientError::Transport(format!("backend returned status {}", self.status)),
        }
    }
}

/// Minimal HTTP surface the clients need. Implemented over reqwest by
/// [`HttpBackend`]; tests substitute scripted fakes.
#[async_trait]
pub trait Backend: Send + Sync {
    /// POST a JSON body to `path` and return the raw response.
    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<RawResponse, ClientError>;

    /// GET `path` and return the raw response.
    async fn get(&self, path: &str) -> Result<RawResponse, ClientError>;
}

#[derive(Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub question: &'a str,
    pub history: &'a [ChatMessage],
    pub model: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponse {
    pub answer: String,
}

#[derive(Serialize)]
pub(crate) struct DocumentRequest<'a> {
    pub job_description: &'a str,
    pub model: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Response of the backend's root health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl HealthStatus {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Ask the backend whether it is up.
pub async fn check_health(backend: &dyn Backend) -> Result<HealthStatus, ClientError> {
    tracing::debug!(path = HEALTH_PATH, "checking backend health");
    let response = backend.get(HEALTH_PATH).await?;
    if !response.is_success() {
        return Err(response.into_error());
    }
    response.json()
}
