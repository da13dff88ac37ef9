//! Gemini REST client.
//!
//! Implements `GenerativeModel` over `generateContent` and
//! `streamGenerateContent?alt=sse`. The API key travels in the
//! `x-goog-api-key` header so it never appears in URLs, logs or
//! `reqwest` error messages.

use super::sse::SseDecoder;
use super::types::{ApiErrorEnvelope, Content, GenerateContentRequest, GenerateContentResponse};
use super::{GenerativeModel, ProviderError, ResponseStream};
use crate::config::GeminiSettings;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// `ErrorInfo.reason` Google returns for a rejected key.
const API_KEY_INVALID_REASON: &str = "API_KEY_INVALID";

/// Events buffered between the reader task and the consumer.
const STREAM_BUFFER: usize = 16;

pub struct GeminiClient {
    client: Client,
    api_key: Secret<String>,
    model: String,
    api_base: String,
}

impl GeminiClient {
    pub fn new(settings: &GeminiSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            api_base: settings.api_base.clone(),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, self.model, method)
    }

    async fn post(&self, url: &str, contents: &[Content]) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&GenerateContentRequest { contents })
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        Ok(response)
    }
}

/// Map a non-success upstream reply to a `ProviderError`.
///
/// Structured signals win: 401/403, or an `ErrorInfo` detail carrying
/// `API_KEY_INVALID` (Gemini answers a bad key with a plain 400). Anything
/// else keeps the upstream message for server-side logging.
pub fn classify_error(status: StatusCode, body: &str) -> ProviderError {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);

    let key_rejected = parsed.as_ref().is_some_and(|error| {
        error
            .details
            .iter()
            .any(|d| d.reason.as_deref() == Some(API_KEY_INVALID_REASON))
    });
    let message = match parsed {
        Some(error) if !error.message.is_empty() => error.message,
        _ => body.trim().to_string(),
    };

    if key_rejected || status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ProviderError::Unauthenticated(message);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::RateLimited;
    }

    ProviderError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Decode one SSE data payload. Error envelopes can arrive mid-stream.
fn parse_stream_event(data: &str) -> Result<GenerateContentResponse, ProviderError> {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(data) {
        let status = envelope
            .error
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Err(classify_error(status, data));
    }

    serde_json::from_str(data)
        .map_err(|e| ProviderError::InvalidResponse(format!("malformed stream event: {}", e)))
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_content(
        &self,
        contents: &[Content],
    ) -> Result<GenerateContentResponse, ProviderError> {
        tracing::debug!(
            model = %self.model,
            turns = contents.len(),
            "Sending request to Gemini API"
        );

        let response = self.post(&self.api_url("generateContent"), contents).await?;

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.without_url().to_string()))
    }

    async fn stream_generate_content(
        &self,
        contents: &[Content],
    ) -> Result<ResponseStream, ProviderError> {
        tracing::debug!(
            model = %self.model,
            turns = contents.len(),
            "Starting streaming request to Gemini API"
        );

        let url = format!("{}?alt=sse", self.api_url("streamGenerateContent"));
        let response = self.post(&url, contents).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        // The reader stops as soon as the consumer goes away; dropping
        // `body` closes the upstream connection.
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        tracing::debug!("Stream consumer dropped, releasing upstream response");
                        return;
                    }
                    next = body.next() => next,
                };

                let bytes = match next {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        let _ = tx
                            .send(Err(ProviderError::Network(e.without_url().to_string())))
                            .await;
                        return;
                    }
                    None => break,
                };

                for data in decoder.push(&bytes) {
                    let event = parse_stream_event(&data);
                    let failed = event.is_err();
                    if tx.send(event).await.is_err() || failed {
                        return;
                    }
                }
            }

            if let Some(data) = decoder.finish() {
                let _ = tx.send(parse_stream_event(&data)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)) as ResponseStream)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.api_base))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.without_url().to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(classify_error(status, &body))
        }
    }
}
