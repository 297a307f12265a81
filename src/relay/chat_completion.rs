//! Streaming translator backed by a chat-completion API (OpenAI or Azure
//! OpenAI dialect).
//!
//! The request asks for `stream: true`; the response body is a server-sent
//! event stream whose `data:` lines carry JSON chunks, terminated by
//! `data: [DONE]`. Each non-empty `choices[0].delta.content` becomes a token.

use crate::config::{TranslationConfig, TranslationProvider};
use crate::error::{RelayError, RelayResult};
use crate::relay::translator::{TokenStream, Translator};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use tracing::debug;

pub struct ChatCompletionTranslator {
    client: reqwest::Client,
    config: TranslationConfig,
}

impl ChatCompletionTranslator {
    pub fn new(client: reqwest::Client, config: TranslationConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match self.config.provider {
            TranslationProvider::OpenAi => format!("{}/chat/completions", base),
            TranslationProvider::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base, self.config.model, self.config.api_version
            ),
        }
    }

    fn request_body(&self, text: &str, source_lang: &str, target_lang: &str) -> Value {
        let mut body = json!({
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "You are a professional real-time translator. \
                         Translate the following {} text to {}. \
                         Provide only the translation, no explanations.",
                        source_lang, target_lang
                    )
                },
                { "role": "user", "content": text }
            ],
            "stream": true,
            "temperature": self.config.temperature,
        });
        if self.config.provider == TranslationProvider::OpenAi {
            body["model"] = json!(self.config.model);
        }
        body
    }
}

#[async_trait]
impl Translator for ChatCompletionTranslator {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> RelayResult<TokenStream> {
        let request = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(text, source_lang, target_lang));
        let request = match self.config.provider {
            TranslationProvider::OpenAi => request.bearer_auth(&self.config.api_key),
            TranslationProvider::Azure => request.header("api-key", &self.config.api_key),
        };

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::TranslationFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::TranslationFailure(format!(
                "translation API returned {}: {}",
                status, body
            )));
        }

        debug!(source_lang, target_lang, "Translation stream opened");
        let bytes = response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed();
        Ok(token_stream(bytes))
    }
}

/// What one `data:` payload of the event stream means.
#[derive(Debug, PartialEq)]
enum Chunk {
    Token(String),
    Done,
    Empty,
}

fn parse_chunk(data: &str) -> RelayResult<Chunk> {
    if data == "[DONE]" {
        return Ok(Chunk::Done);
    }

    let value: Value = serde_json::from_str(data)
        .map_err(|e| RelayError::TranslationFailure(format!("malformed stream chunk: {}", e)))?;

    if let Some(error) = value.get("error") {
        return Err(RelayError::TranslationFailure(format!("translation API error: {}", error)));
    }

    // Some chunks (role announcements, content filter results) carry no text
    match value.pointer("/choices/0/delta/content").and_then(Value::as_str) {
        Some(content) if !content.is_empty() => Ok(Chunk::Token(content.to_string())),
        _ => Ok(Chunk::Empty),
    }
}

/// Incremental server-sent-event line splitter.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, returning the `data:` payloads of every completed line.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);

            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

struct StreamState {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<RelayResult<String>>,
    finished: bool,
}

/// Turn the raw response body into a stream of tokens.
///
/// The stream ends after `[DONE]`, after the first error, or when the body
/// ends, whichever comes first.
fn token_stream(bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> TokenStream {
    let state = StreamState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
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
                    for data in state.decoder.push(&chunk) {
                        match parse_chunk(&data) {
                            Ok(Chunk::Token(token)) => state.pending.push_back(Ok(token)),
                            Ok(Chunk::Empty) => {}
                            Ok(Chunk::Done) => {
                                state.finished = true;
                                break;
                            }
                            Err(err) => {
                                state.pending.push_back(Err(err));
                                break;
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    state.pending.push_back(Err(RelayError::TranslationFailure(err.to_string())));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}
