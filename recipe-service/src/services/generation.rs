//! Generation service: turns a prompt plus optional history into text from
//! the upstream model, buffered or as a chunk stream, and classifies every
//! upstream failure into `GenerationError`.

use crate::models::HistoryEntry;
use crate::services::providers::{
    ChatSession, Content, GenerateContentResponse, GenerativeModel, ProviderError,
    ResponseStream,
};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio_stream::Stream;

/// Substring the upstream uses for a rejected key, checked only when no
/// structured signal was available.
const INVALID_KEY_MARKER: &str = "API key not valid";

/// Finish reasons that mean the candidate was withheld for policy reasons.
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The upstream declined to produce content; the message carries the
    /// block reason and is safe to show to the caller.
    #[error("{0}")]
    ContentBlocked(String),

    #[error("Invalid Gemini API key: {0}")]
    UpstreamAuth(String),

    #[error("Gemini API returned no content.")]
    EmptyResponse,

    #[error("{0}")]
    Upstream(String),
}

impl From<ProviderError> for GenerationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unauthenticated(message) => GenerationError::UpstreamAuth(message),
            other => {
                let message = other.to_string();
                if message.contains(INVALID_KEY_MARKER) {
                    GenerationError::UpstreamAuth(message)
                } else {
                    GenerationError::Upstream(message)
                }
            }
        }
    }
}

/// Ordered, single-pass sequence of generated text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

#[derive(Clone)]
pub struct GenerationService {
    model: Arc<dyn GenerativeModel>,
}

impl GenerationService {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Whether the upstream model accepts our credentials.
    pub async fn health_check(&self) -> Result<(), GenerationError> {
        self.model.health_check().await.map_err(GenerationError::from)
    }

    /// Generate a complete response.
    ///
    /// With history the prompt is sent as the next turn of a chat seeded
    /// with it; without, as a single stateless request.
    #[tracing::instrument(skip_all, fields(model = %self.model.model_name(), history_turns = history.len()))]
    pub async fn generate(
        &self,
        prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<String, GenerationError> {
        let result = if history.is_empty() {
            self.model.generate_content(&[Content::user(prompt)]).await
        } else {
            ChatSession::start(self.model.as_ref(), to_contents(history))
                .send_message(prompt)
                .await
        };

        let response = result.map_err(|e| {
            tracing::error!(error = %e, "Error calling Gemini API");
            GenerationError::from(e)
        })?;

        extract_text(&response).map_err(|e| {
            tracing::warn!(error = %e, "Gemini API returned no usable candidate");
            e
        })
    }

    /// Start a streaming generation.
    ///
    /// Upstream request failures surface here, before any chunk exists.
    /// After that the stream yields each chunk's text in upstream order;
    /// a block signal or upstream error ends it with that error.
    #[tracing::instrument(skip_all, fields(model = %self.model.model_name(), history_turns = history.len()))]
    pub async fn generate_stream(
        &self,
        prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<TextStream, GenerationError> {
        let result = if history.is_empty() {
            self.model
                .stream_generate_content(&[Content::user(prompt)])
                .await
        } else {
            ChatSession::start(self.model.as_ref(), to_contents(history))
                .send_message_stream(prompt)
                .await
        };

        let upstream = result.map_err(|e| {
            tracing::error!(error = %e, "Error calling Gemini API (stream)");
            GenerationError::from(e)
        })?;

        Ok(text_chunks(upstream))
    }
}

fn to_contents(history: &[HistoryEntry]) -> Vec<Content> {
    history.iter().map(Content::from).collect()
}

/// What one upstream response contributes to the output.
enum ChunkOutcome {
    Text(String),
    Blocked(String),
    Nothing,
}

fn candidate_text(response: &GenerateContentResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    Some(
        content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect(),
    )
}

/// Block reason from prompt feedback, or from a withheld first candidate.
fn block_reason(response: &GenerateContentResponse) -> Option<&str> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Some(reason);
    }

    response
        .candidates
        .first()
        .filter(|candidate| candidate.content.is_none())
        .and_then(|candidate| candidate.finish_reason.as_deref())
        .filter(|reason| BLOCKING_FINISH_REASONS.contains(reason))
}

fn safety_summary(response: &GenerateContentResponse) -> String {
    let ratings = match &response.prompt_feedback {
        Some(feedback) if !feedback.safety_ratings.is_empty() => &feedback.safety_ratings,
        _ => match response.candidates.first() {
            Some(candidate) => &candidate.safety_ratings,
            None => return String::new(),
        },
    };

    ratings
        .iter()
        .map(|rating| format!("{}: {}", rating.category, rating.probability))
        .collect::<Vec<_>>()
        .join(", ")
}

fn extract_text(response: &GenerateContentResponse) -> Result<String, GenerationError> {
    if let Some(text) = candidate_text(response) {
        return Ok(text);
    }

    if let Some(reason) = block_reason(response) {
        let details = safety_summary(response);
        let message = if details.is_empty() {
            format!("Content generation blocked due to: {}.", reason)
        } else {
            format!(
                "Content generation blocked due to: {}. Details: {}",
                reason, details
            )
        };
        return Err(GenerationError::ContentBlocked(message));
    }

    Err(GenerationError::EmptyResponse)
}

fn chunk_outcome(response: &GenerateContentResponse) -> ChunkOutcome {
    if let Some(text) = candidate_text(response) {
        return ChunkOutcome::Text(text);
    }
    match block_reason(response) {
        Some(reason) => ChunkOutcome::Blocked(format!(
            "Content generation blocked in stream due to: {}.",
            reason
        )),
        None => ChunkOutcome::Nothing,
    }
}

/// Map raw upstream events to text, pulling lazily. The first error is the
/// last item; dropping the result drops the upstream stream with it.
fn text_chunks(upstream: ResponseStream) -> TextStream {
    let chunks = stream::unfold(Some(upstream), |state| async move {
        let mut upstream = state?;
        loop {
            match upstream.next().await? {
                Ok(response) => match chunk_outcome(&response) {
                    ChunkOutcome::Text(text) if text.is_empty() => continue,
                    ChunkOutcome::Text(text) => return Some((Ok(text), Some(upstream))),
                    ChunkOutcome::Blocked(message) => {
                        tracing::warn!(reason = %message, "Gemini stream blocked");
                        return Some((Err(GenerationError::ContentBlocked(message)), None));
                    }
                    ChunkOutcome::Nothing => continue,
                },
                Err(e) => {
                    tracing::error!(error = %e, "Error in Gemini stream");
                    return Some((Err(GenerationError::from(e)), None));
                }
            }
        }
    });

    Box::pin(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::providers::mock::{
        blocked_response, text_response, MockModel, Script, StreamStep,
    };
    use crate::services::providers::Candidate;

    fn service(model: &MockModel) -> GenerationService {
        GenerationService::new(Arc::new(model.clone()))
    }

    async fn collect(stream: TextStream) -> Vec<Result<String, GenerationError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn generate_concatenates_candidate_parts() {
        let model = MockModel::replying(text_response(&["Hello, ", "world!"]));

        let text = service(&model).generate("Say hello", &[]).await.unwrap();

        assert_eq!(text, "Hello, world!");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn generate_without_history_sends_prompt_alone() {
        let model = MockModel::replying(text_response(&["ok"]));

        service(&model).generate("Only the prompt", &[]).await.unwrap();

        assert_eq!(
            model.last_contents().unwrap(),
            vec![Content::user("Only the prompt")]
        );
    }

    #[tokio::test]
    async fn generate_with_history_seeds_chat() {
        let model = MockModel::replying(text_response(&["Spain"]));
        let history = vec![
            HistoryEntry::new(Role::User, &["What is paella?"]),
            HistoryEntry::new(Role::Model, &["A rice dish."]),
        ];

        service(&model)
            .generate("Where is it from?", &history)
            .await
            .unwrap();

        let sent = model.last_contents().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].role.as_deref(), Some("user"));
        assert_eq!(sent[1].role.as_deref(), Some("model"));
        assert_eq!(sent[2], Content::user("Where is it from?"));
    }

    #[tokio::test]
    async fn prompt_feedback_block_reports_reason_and_ratings() {
        let model = MockModel::replying(blocked_response(
            "SAFETY",
            &[
                ("HARM_CATEGORY_HARASSMENT", "HIGH"),
                ("HARM_CATEGORY_HATE_SPEECH", "LOW"),
            ],
        ));

        let err = service(&model).generate("bad", &[]).await.unwrap_err();

        match err {
            GenerationError::ContentBlocked(message) => {
                assert_eq!(
                    message,
                    "Content generation blocked due to: SAFETY. Details: \
                     HARM_CATEGORY_HARASSMENT: HIGH, HARM_CATEGORY_HATE_SPEECH: LOW"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn withheld_candidate_counts_as_blocked() {
        let model = MockModel::replying(GenerateContentResponse {
            candidates: vec![Candidate {
                content: None,
                finish_reason: Some("PROHIBITED_CONTENT".to_string()),
                safety_ratings: Vec::new(),
            }],
            ..Default::default()
        });

        let err = service(&model).generate("bad", &[]).await.unwrap_err();

        assert!(
            matches!(err, GenerationError::ContentBlocked(m) if m.contains("PROHIBITED_CONTENT"))
        );
    }

    #[tokio::test]
    async fn no_candidates_is_empty_response() {
        let model = MockModel::replying(GenerateContentResponse::default());

        let err = service(&model).generate("hi", &[]).await.unwrap_err();

        assert!(matches!(err, GenerationError::EmptyResponse));
    }

    #[tokio::test]
    async fn structured_auth_failure_is_classified() {
        let model = MockModel::failing(|| {
            ProviderError::Unauthenticated("API key not valid. Please pass a valid API key.".into())
        });

        let err = service(&model).generate("hi", &[]).await.unwrap_err();

        assert!(matches!(err, GenerationError::UpstreamAuth(_)));
    }

    #[tokio::test]
    async fn unstructured_auth_failure_falls_back_to_marker() {
        let model = MockModel::failing(|| ProviderError::Api {
            status: 400,
            message: "API key not valid. Please pass a valid API key.".into(),
        });

        let err = service(&model).generate("hi", &[]).await.unwrap_err();

        assert!(matches!(err, GenerationError::UpstreamAuth(_)));
    }

    #[tokio::test]
    async fn other_failures_propagate_description() {
        let model = MockModel::failing(|| ProviderError::Network("connection reset".into()));

        let err = service(&model).generate("hi", &[]).await.unwrap_err();

        assert!(matches!(err, GenerationError::Upstream(m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn stream_yields_chunks_in_order() {
        let model = MockModel::streaming(&["A", "B", "C"]);

        let stream = service(&model).generate_stream("abc", &[]).await.unwrap();
        let chunks: Vec<String> = collect(stream)
            .await
            .into_iter()
            .map(|item| item.unwrap())
            .collect();

        assert_eq!(chunks, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn stream_block_ends_sequence_after_emitted_chunks() {
        let model = MockModel::new(Script::Stream(vec![
            StreamStep::Chunk(text_response(&["A"])),
            StreamStep::Chunk(blocked_response("SAFETY", &[])),
            StreamStep::Chunk(text_response(&["never"])),
        ]));

        let stream = service(&model).generate_stream("a", &[]).await.unwrap();
        let items = collect(stream).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "A");
        match &items[1] {
            Err(GenerationError::ContentBlocked(message)) => {
                assert_eq!(message, "Content generation blocked in stream due to: SAFETY.")
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_skips_events_without_text() {
        let model = MockModel::new(Script::Stream(vec![
            StreamStep::Chunk(text_response(&["A"])),
            StreamStep::Chunk(GenerateContentResponse::default()),
            StreamStep::Chunk(text_response(&[""])),
            StreamStep::Chunk(text_response(&["B"])),
        ]));

        let stream = service(&model).generate_stream("a", &[]).await.unwrap();
        let chunks: Vec<String> = collect(stream)
            .await
            .into_iter()
            .map(|item| item.unwrap())
            .collect();

        assert_eq!(chunks, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn stream_upstream_error_is_terminal() {
        let model = MockModel::new(Script::Stream(vec![
            StreamStep::Chunk(text_response(&["A"])),
            StreamStep::Error(ProviderError::Network("reset".into())),
            StreamStep::Chunk(text_response(&["B"])),
        ]));

        let stream = service(&model).generate_stream("a", &[]).await.unwrap();
        let items = collect(stream).await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(GenerationError::Upstream(_))));
    }

    #[tokio::test]
    async fn stream_request_failure_surfaces_before_chunks() {
        let model = MockModel::failing(|| ProviderError::RateLimited);

        let result = service(&model).generate_stream("a", &[]).await;

        assert!(matches!(result, Err(GenerationError::Upstream(_))));
    }
}
