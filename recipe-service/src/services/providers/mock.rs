//! Scripted `GenerativeModel` for tests.

use super::types::{
    Candidate, Content, GenerateContentResponse, Part, PromptFeedback, SafetyRating,
};
use super::{GenerativeModel, ProviderError, ResponseStream};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What the mock does when called.
pub enum Script {
    /// Buffered calls return this response.
    Reply(GenerateContentResponse),
    /// Streaming calls yield these items in order.
    Stream(Vec<StreamStep>),
    /// Every call fails with the error built by this function.
    Fail(fn() -> ProviderError),
}

/// One step of a scripted stream.
pub enum StreamStep {
    Chunk(GenerateContentResponse),
    Error(ProviderError),
}

/// Mock model that replays a script and records what it was sent.
///
/// Clones share the call counter and recorded requests, so a test can
/// keep a handle after moving the mock into application state.
#[derive(Clone)]
pub struct MockModel {
    script: Arc<Script>,
    calls: Arc<AtomicUsize>,
    last_contents: Arc<Mutex<Option<Vec<Content>>>>,
}

impl MockModel {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            calls: Arc::new(AtomicUsize::new(0)),
            last_contents: Arc::new(Mutex::new(None)),
        }
    }

    pub fn replying(response: GenerateContentResponse) -> Self {
        Self::new(Script::Reply(response))
    }

    /// Streams one text chunk per entry, then completes.
    pub fn streaming(chunks: &[&str]) -> Self {
        Self::new(Script::Stream(
            chunks
                .iter()
                .map(|text| StreamStep::Chunk(text_response(&[*text])))
                .collect(),
        ))
    }

    pub fn failing(error: fn() -> ProviderError) -> Self {
        Self::new(Script::Fail(error))
    }

    /// Number of upstream calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Turns sent on the most recent call.
    pub fn last_contents(&self) -> Option<Vec<Content>> {
        self.last_contents.lock().ok().and_then(|guard| guard.clone())
    }

    fn record(&self, contents: &[Content]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_contents.lock() {
            *guard = Some(contents.to_vec());
        }
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn generate_content(
        &self,
        contents: &[Content],
    ) -> Result<GenerateContentResponse, ProviderError> {
        self.record(contents);
        match self.script.as_ref() {
            Script::Reply(response) => Ok(response.clone()),
            Script::Fail(error) => Err(error()),
            Script::Stream(_) => Err(ProviderError::NotConfigured(
                "mock scripted for streaming only".to_string(),
            )),
        }
    }

    async fn stream_generate_content(
        &self,
        contents: &[Content],
    ) -> Result<ResponseStream, ProviderError> {
        self.record(contents);
        match self.script.as_ref() {
            Script::Stream(steps) => {
                let items: Vec<Result<GenerateContentResponse, ProviderError>> = steps
                    .iter()
                    .map(|step| match step {
                        StreamStep::Chunk(response) => Ok(response.clone()),
                        StreamStep::Error(error) => Err(clone_error(error)),
                    })
                    .collect();
                Ok(Box::pin(tokio_stream::iter(items)) as ResponseStream)
            }
            Script::Fail(error) => Err(error()),
            Script::Reply(_) => Err(ProviderError::NotConfigured(
                "mock scripted for buffered replies only".to_string(),
            )),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match self.script.as_ref() {
            Script::Fail(error) => Err(error()),
            _ => Ok(()),
        }
    }
}

fn clone_error(error: &ProviderError) -> ProviderError {
    match error {
        ProviderError::NotConfigured(m) => ProviderError::NotConfigured(m.clone()),
        ProviderError::Unauthenticated(m) => ProviderError::Unauthenticated(m.clone()),
        ProviderError::RateLimited => ProviderError::RateLimited,
        ProviderError::Api { status, message } => ProviderError::Api {
            status: *status,
            message: message.clone(),
        },
        ProviderError::Network(m) => ProviderError::Network(m.clone()),
        ProviderError::InvalidResponse(m) => ProviderError::InvalidResponse(m.clone()),
    }
}

/// A response whose first candidate holds the given text parts.
pub fn text_response(parts: &[&str]) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some("model".to_string()),
                parts: parts.iter().map(|text| Part::text(text)).collect(),
            }),
            finish_reason: Some("STOP".to_string()),
            safety_ratings: Vec::new(),
        }],
        ..Default::default()
    }
}

/// A response with no candidates, blocked by prompt feedback.
pub fn blocked_response(reason: &str, ratings: &[(&str, &str)]) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: Vec::new(),
        prompt_feedback: Some(PromptFeedback {
            block_reason: Some(reason.to_string()),
            safety_ratings: ratings
                .iter()
                .map(|(category, probability)| SafetyRating {
                    category: category.to_string(),
                    probability: probability.to_string(),
                })
                .collect(),
        }),
        usage_metadata: None,
    }
}
