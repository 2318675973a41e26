//! Chat client: one backend round trip per visitor question.
//!
//! The user turn is appended before the request goes out and the reply (or
//! the fallback notice) after it resolves. Sends are not queued: two sends in
//! flight at once append their replies in resolution order, which may differ
//! from the order the questions were asked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::backend::{Backend, ChatRequest, ChatResponse, CHAT_PATH};
use crate::config::DEFAULT_MODEL;
use crate::error::ClientError;
use crate::state::{ChatMessage, Conversation};

/// Assistant turn appended when a chat request fails for any reason.
pub const FALLBACK_NOTICE: &str = "I am still being worked on. Coming Up Soon.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending,
}

/// How a single `send` resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank question; nothing was appended or sent.
    Ignored,
    /// The backend's answer was appended.
    Succeeded,
    /// The fallback notice was appended.
    Failed,
}

pub struct ChatSession<B: Backend> {
    backend: B,
    model: String,
    conversation: Mutex<Conversation>,
    in_flight: AtomicUsize,
}

impl<B: Backend> ChatSession<B> {
    pub fn new(backend: B) -> Self {
        Self::with_conversation(backend, Conversation::new())
    }

    pub fn with_conversation(backend: B, conversation: Conversation) -> Self {
        Self {
            backend,
            model: DEFAULT_MODEL.to_string(),
            conversation: Mutex::new(conversation),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Snapshot of the conversation so far.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.conversation().messages().to_vec()
    }

    pub fn state(&self) -> ChatState {
        if self.is_loading() {
            ChatState::Sending
        } else {
            ChatState::Idle
        }
    }

    /// True while at least one question is awaiting its reply.
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Ask the assistant a question.
    ///
    /// Never fails: any error is logged and replaced by [`FALLBACK_NOTICE`].
    pub async fn send(&self, question: &str) -> SendOutcome {
        if question.trim().is_empty() {
            return SendOutcome::Ignored;
        }

        let history = {
            let mut conversation = self.conversation();
            conversation.push(ChatMessage::user(question));
            conversation.messages().to_vec()
        };

        let _sending = InFlight::enter(&self.in_flight);
        let (reply, outcome) = match self.exchange(question, &history).await {
            Ok(answer) => (ChatMessage::assistant(answer), SendOutcome::Succeeded),
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed, using fallback reply");
                (ChatMessage::assistant(FALLBACK_NOTICE), SendOutcome::Failed)
            }
        };

        self.conversation().push(reply);
        outcome
    }

    async fn exchange(&self, question: &str, history: &[ChatMessage]) -> Result<String, ClientError> {
        let body = serde_json::to_value(ChatRequest {
            question,
            history,
            model: &self.model,
        })?;

        tracing::debug!(turns = history.len(), "sending chat request");
        let response = self.backend.post_json(CHAT_PATH, body).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }

        let chat: ChatResponse = response.json()?;
        Ok(chat.answer)
    }

    fn conversation(&self) -> MutexGuard<'_, Conversation> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counts a request as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
