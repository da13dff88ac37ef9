//! `/api/ai` handlers: buffered and streamed text generation.

use crate::dtos::{GenerateRequest, InvalidRequest, ValidationMode};
use crate::services::metrics::{record_generation, Mode};
use crate::services::{GenerationError, TextStream};
use crate::startup::AppState;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::{
    future,
    stream::{self, Stream, StreamExt},
};
use recipe_core::error::AppError;
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;

const CONFIGURATION_ERROR: &str = "AI service configuration error. Please contact support.";
const GENERATE_FAILED: &str = "Failed to generate content from AI service.";
const STREAM_FAILED: &str = "Failed to generate streaming content.";

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub response: String,
}

/// Unwrap the JSON body. A request without a JSON content type is read as
/// an empty body, so it fails prompt validation like any other empty body.
fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(Value::Null),
        Err(rejection) => Err(AppError::BadRequest(anyhow::anyhow!(rejection.body_text()))),
    }
}

fn parse_request(
    payload: Result<Json<Value>, JsonRejection>,
    mode: Mode,
) -> Result<GenerateRequest, AppError> {
    let validation = match mode {
        Mode::Buffered => ValidationMode::Buffered,
        Mode::Stream => ValidationMode::Streaming,
    };

    json_body(payload)
        .and_then(|body| {
            GenerateRequest::from_value(&body, validation).map_err(|e: InvalidRequest| {
                AppError::BadRequest(anyhow::anyhow!(e.message()))
            })
        })
        .map_err(|e| {
            record_generation(mode, "invalid");
            e
        })
}

/// Map a generation failure to the client-facing error. Upstream detail has
/// already been logged by the service.
fn generation_failure(err: GenerationError, mode: Mode, fallback: &'static str) -> AppError {
    match err {
        GenerationError::ContentBlocked(message) => {
            record_generation(mode, "blocked");
            AppError::BadRequest(anyhow::anyhow!(message))
        }
        GenerationError::UpstreamAuth(_) => {
            record_generation(mode, "auth_error");
            AppError::ServiceError(CONFIGURATION_ERROR.to_string())
        }
        GenerationError::EmptyResponse | GenerationError::Upstream(_) => {
            record_generation(mode, "upstream_error");
            AppError::ServiceError(fallback.to_string())
        }
    }
}

/// `POST /api/ai/generate`
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let request = parse_request(payload, Mode::Buffered)?;

    let response = state
        .generation
        .generate(&request.prompt, &request.history)
        .await
        .map_err(|e| generation_failure(e, Mode::Buffered, GENERATE_FAILED))?;

    record_generation(Mode::Buffered, "success");
    Ok(Json(GenerateResponse { response }))
}

/// Response body for a stream whose first chunk was already taken.
///
/// `record` sees `success` once the upstream sequence is exhausted, or
/// `interrupted` if it fails part way. The body ends at the first error.
fn relay_body<F>(
    first: Option<String>,
    rest: TextStream,
    mut record: F,
) -> impl Stream<Item = Result<String, Infallible>> + Send
where
    F: FnMut(&'static str) + Send + 'static,
{
    stream::iter(first.map(Ok))
        .chain(rest)
        .map(Some)
        .chain(stream::once(future::ready(None)))
        .scan((), move |_, item| {
            future::ready(match item {
                Some(Ok(text)) => Some(Ok(text)),
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Generation stream failed after output started");
                    record("interrupted");
                    None
                }
                None => {
                    record("success");
                    None
                }
            })
        })
}

/// `POST /api/ai/generate-stream`
///
/// The first chunk is awaited before the response starts, so failures that
/// happen before any output still get a status code and JSON body. Later
/// failures can only end the body early.
pub async fn generate_stream(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = parse_request(payload, Mode::Stream)?;

    let mut chunks = state
        .generation
        .generate_stream(&request.prompt, &request.history)
        .await
        .map_err(|e| generation_failure(e, Mode::Stream, STREAM_FAILED))?;

    let first = match chunks.next().await {
        Some(Ok(text)) => Some(text),
        Some(Err(e)) => return Err(generation_failure(e, Mode::Stream, STREAM_FAILED)),
        None => None,
    };

    let body = relay_body(first, chunks, |outcome| record_generation(Mode::Stream, outcome));

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Outcomes = Arc<Mutex<Vec<&'static str>>>;

    fn outcomes() -> (Outcomes, impl FnMut(&'static str) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |outcome| sink.lock().unwrap().push(outcome))
    }

    fn text_stream(items: Vec<Result<String, GenerationError>>) -> TextStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn completed_stream_is_recorded_once_as_success() {
        let (seen, record) = outcomes();
        let rest = text_stream(vec![Ok("b".to_string()), Ok("c".to_string())]);

        let body: Vec<_> = relay_body(Some("a".to_string()), rest, record)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(body, vec!["a", "b", "c"]);
        assert_eq!(*seen.lock().unwrap(), vec!["success"]);
    }

    #[tokio::test]
    async fn failure_after_output_is_recorded_only_as_interrupted() {
        let (seen, record) = outcomes();
        let rest = text_stream(vec![
            Ok("b".to_string()),
            Err(GenerationError::Upstream("connection reset".to_string())),
            Ok("never".to_string()),
        ]);

        let body: Vec<_> = relay_body(Some("a".to_string()), rest, record)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(body, vec!["a", "b"]);
        assert_eq!(*seen.lock().unwrap(), vec!["interrupted"]);
    }

    #[tokio::test]
    async fn empty_stream_still_counts_as_success() {
        let (seen, record) = outcomes();

        let body: Vec<_> = relay_body(None, text_stream(Vec::new()), record).collect().await;

        assert!(body.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["success"]);
    }
}
