//! Upstream generative model abstraction.
//!
//! `GenerativeModel` is the seam between the generation service and the
//! hosted API: the Gemini client talks HTTP, the mock replays scripted
//! responses in tests.

pub mod gemini;
pub mod mock;
pub mod sse;
pub mod types;

use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

pub use types::{Candidate, Content, GenerateContentResponse, Part, PromptFeedback, SafetyRating};

/// Error type for upstream model calls.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// The upstream rejected the credential.
    #[error("Authentication failed: {0}")]
    Unauthenticated(String),

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

/// Raw upstream responses, one per streamed event, in arrival order.
pub type ResponseStream =
    Pin<Box<dyn Stream<Item = Result<GenerateContentResponse, ProviderError>> + Send>>;

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Name of the model requests are sent to.
    fn model_name(&self) -> &str;

    /// Single-shot generation over the given turns.
    async fn generate_content(
        &self,
        contents: &[Content],
    ) -> Result<GenerateContentResponse, ProviderError>;

    /// Streaming generation over the given turns.
    async fn stream_generate_content(
        &self,
        contents: &[Content],
    ) -> Result<ResponseStream, ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// A conversation seeded with prior turns. Each message is sent as the next
/// user turn after the seeded history; the session itself is not updated,
/// since callers resubmit history on every request.
pub struct ChatSession<'a> {
    model: &'a dyn GenerativeModel,
    history: Vec<Content>,
}

impl<'a> ChatSession<'a> {
    pub fn start(model: &'a dyn GenerativeModel, history: Vec<Content>) -> Self {
        Self { model, history }
    }

    fn turns_with(&self, message: &str) -> Vec<Content> {
        let mut turns = Vec::with_capacity(self.history.len() + 1);
        turns.extend(self.history.iter().cloned());
        turns.push(Content::user(message));
        turns
    }

    pub async fn send_message(
        &self,
        message: &str,
    ) -> Result<GenerateContentResponse, ProviderError> {
        self.model.generate_content(&self.turns_with(message)).await
    }

    pub async fn send_message_stream(&self, message: &str) -> Result<ResponseStream, ProviderError> {
        self.model
            .stream_generate_content(&self.turns_with(message))
            .await
    }
}
