//! Gemini REST client
//!
//! Chat and speech synthesis both go through `streamGenerateContent` with
//! server-sent events; [`GeminiChat`] and [`GeminiSpeech`] adapt the raw
//! response chunks to the call's text and audio streams.

mod chat;
mod speech;
mod sse;
mod types;

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};

pub use chat::{GeminiChat, GeminiConversation};
pub use speech::GeminiSpeech;
pub use sse::SseDecoder;
pub use types::{
    ApiError, Candidate, Content, GenerateRequest, GenerateResponse, GenerationConfig, InlineData,
    Part,
};

use crate::{Error, Result};

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Stream of decoded response chunks
pub type ResponseStream = BoxStream<'static, Result<GenerateResponse>>;

/// Builds the error for a failed request, e.g. `Error::ModelQuery`
pub type FailureKind = fn(String) -> Error;

/// Thin client over the Gemini REST API
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(api_key: SecretString, base_url: impl Into<String>) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config("Gemini API key required".to_string()));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn stream_url(&self, model: &str) -> String {
        format!("{}/models/{model}:streamGenerateContent", self.base_url)
    }

    /// Start a streamed generation
    ///
    /// Transport errors, non-2xx responses, malformed events and in-stream
    /// error objects are all reported through `fail`.
    ///
    /// # Errors
    ///
    /// Returns `fail(..)` if the request cannot be sent or is rejected
    pub async fn stream_generate(
        &self,
        model: &str,
        request: &GenerateRequest,
        fail: FailureKind,
    ) -> Result<ResponseStream> {
        let url = self.stream_url(model);
        tracing::debug!(%model, contents = request.contents.len(), "gemini request");

        let response = self
            .http
            .post(&url)
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %model, "gemini request failed");
                fail(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<GenerateResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .map_or(body, |e| e.to_string());
            tracing::error!(status = %status, %model, body = %detail, "gemini API error");
            return Err(fail(format!("Gemini API error {status}: {detail}")));
        }

        Ok(decode_events(Box::pin(response.bytes_stream()), fail))
    }
}

/// Turn an SSE body into response chunks
fn decode_events<S, B, E>(body: S, fail: FailureKind) -> ResponseStream
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<S> {
        body: S,
        decoder: SseDecoder,
        pending: VecDeque<String>,
        done: bool,
    }

    let state = State {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((parse_event(&event, fail), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.pending.extend(state.decoder.push(chunk.as_ref())),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(fail(format!("stream interrupted: {e}"))), state));
                }
                None => {
                    state.done = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

fn parse_event(event: &str, fail: FailureKind) -> Result<GenerateResponse> {
    let mut response: GenerateResponse = serde_json::from_str(event)
        .map_err(|e| fail(format!("malformed stream event: {e}")))?;

    if let Some(error) = response.error.take() {
        tracing::error!(error = %error, "gemini stream error");
        return Err(fail(error.to_string()));
    }

    Ok(response)
}
