use thiserror::Error;

/// Longest upstream detail shown to the user verbatim.
pub const MAX_DETAIL_CHARS: usize = 300;

/// Everything that can go wrong between the client and the assistant backend.
///
/// None of these escape the public chat or generation calls; they are turned
/// into a fallback chat turn or a [`GenerationOutcome`](crate::GenerationOutcome).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// A required input was empty or whitespace.
    #[error("{0} is required")]
    InputRejected(&'static str),

    /// Network failure, non-success status without a usable body, or malformed JSON.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend refused on relevance grounds.
    #[error("rejected by guardrail: {0}")]
    GuardrailRejected(String),

    /// The backend returned a structured error detail.
    #[error("backend error: {0}")]
    Domain(String),
}

impl ClientError {
    /// Text suitable for a chat bubble or an inline banner.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::InputRejected(what) => format!("Please provide a {what} first."),
            ClientError::Transport(_) => {
                "Could not reach the assistant right now. Please try again later.".to_string()
            }
            ClientError::GuardrailRejected(_) => {
                "This role doesn't match the candidate's skillset, so no document was generated."
                    .to_string()
            }
            ClientError::Domain(detail) => truncate_detail(detail),
        }
    }

    /// Classify a structured `detail` returned with a non-success status.
    pub fn from_detail(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if detail.contains("not relevant") || detail.contains("refused") {
            ClientError::GuardrailRejected(detail)
        } else {
            ClientError::Domain(detail)
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Transport(format!("malformed response body: {err}"))
    }
}

fn truncate_detail(detail: &str) -> String {
    match detail.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((cut, _)) => format!("{}…", &detail[..cut]),
        None => detail.to_string(),
    }
}
