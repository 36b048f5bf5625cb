//! Streaming client for a hosted text-generation endpoint.
//!
//! The endpoint answers `{"inputs", "parameters", "stream": true}` with a
//! `text/event-stream` body whose `data:` lines each carry one generated token.

use crate::config::EndpointConfig;
use crate::error::GenerationError;
use crate::models::GenerationParameters;
use crate::traits::{TextGenerator, TokenStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: RequestParameters,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RequestParameters {
    max_new_tokens: u32,
    top_k: u32,
    top_p: f32,
    temperature: f32,
    repetition_penalty: f32,
    return_full_text: bool,
}

impl From<GenerationParameters> for RequestParameters {
    fn from(value: GenerationParameters) -> Self {
        Self {
            max_new_tokens: value.max_new_tokens,
            top_k: value.top_k,
            top_p: value.top_p,
            temperature: value.temperature,
            repetition_penalty: value.repetition_penalty,
            return_full_text: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    token: Option<StreamToken>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamToken {
    text: String,
    #[serde(default)]
    special: bool,
}

pub struct HuggingFaceEndpointGenerator {
    endpoint: String,
    api_token: String,
    parameters: GenerationParameters,
    client: Client,
}

impl HuggingFaceEndpointGenerator {
    pub fn new(
        config: &EndpointConfig,
        parameters: GenerationParameters,
    ) -> Result<Self, GenerationError> {
        // No overall timeout: a long answer legitimately streams for a while.
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            endpoint: config.llm_endpoint.to_string(),
            api_token: config.api_token.clone(),
            parameters,
            client,
        })
    }
}

#[async_trait]
impl TextGenerator for HuggingFaceEndpointGenerator {
    async fn generate_stream(&self, prompt: String) -> Result<TokenStream, GenerationError> {
        let body = GenerateRequest {
            inputs: &prompt,
            parameters: self.parameters.into(),
            stream: true,
        };

        debug!(endpoint = %self.endpoint, prompt_chars = prompt.len(), "starting generation stream");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::BackendResponse {
                status: status.as_u16(),
                body,
            });
        }

        Ok(decode_token_stream(response.bytes_stream()))
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

struct StreamState {
    bytes: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, GenerationError>>,
    finished: bool,
}

/// Turns a raw SSE byte stream into token texts. The stream ends after the first error.
fn decode_token_stream<S>(bytes: S) -> TokenStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let state = StreamState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    let tokens = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }

            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.push(&chunk);
                    state
                        .pending
                        .extend(payloads.iter().filter_map(|payload| token_from_payload(payload)));
                }
                Some(Err(error)) => state.pending.push_back(Err(error.into())),
                None => {
                    state.finished = true;
                    let payloads = state.decoder.finish();
                    state
                        .pending
                        .extend(payloads.iter().filter_map(|payload| token_from_payload(payload)));
                }
            }
        }
    });

    Box::pin(tokens)
}

/// Maps one `data:` payload to a token, skipping special tokens and keep-alives.
fn token_from_payload(payload: &str) -> Option<Result<String, GenerationError>> {
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamPayload>(payload) {
        Ok(StreamPayload {
            error: Some(message),
            ..
        }) => Some(Err(GenerationError::Endpoint(message))),
        Ok(StreamPayload {
            token: Some(token), ..
        }) if !token.special => Some(Ok(token.text)),
        Ok(_) => None,
        Err(error) => Some(Err(GenerationError::MalformedEvent(format!(
            "{error}: {payload}"
        )))),
    }
}

/// Incremental server-sent-events parser yielding the joined `data` of each event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line = self.buffer.drain(..=newline).collect::<Vec<_>>();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(&['\n', '\r'][..]);
            self.accept_line(line, &mut events);
        }

        events
    }

    /// Flushes whatever is buffered once the byte stream has ended.
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            self.accept_line(line.trim_end_matches('\r'), &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn accept_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        if field == "data" {
            self.data.push(value.to_string());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if !self.data.is_empty() {
            events.push(self.data.join("\n"));
            self.data.clear();
        }
    }
}
