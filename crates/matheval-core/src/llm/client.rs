//! HTTP backend for solve and judge endpoints
//!
//! [`CompletionBackend`] is the seam the pipeline talks through; the real
//! implementation is [`HttpBackend`] on reqwest. One backend is bound to one
//! resolved model at construction time, so unknown models or missing keys
//! surface before any work unit is scheduled.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::{ModelRegistry, Provider};
use crate::error::{EvalError, EvalResult};
use crate::llm::messages::{LlmMessage, ReasoningEffort, SamplingOptions};
use crate::llm::response::{RawResponse, StreamChunk, parse_openai_usage};

/// One request to a completion endpoint
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<LlmMessage>,
    pub sampling: SamplingOptions,
    /// Ask the endpoint to stream; the backend still returns the collected
    /// chunk sequence as one [`RawResponse::Streamed`].
    pub stream: bool,
}

/// The external collaborator that turns a prompt into a raw response
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> EvalResult<RawResponse>;
}

/// reqwest-backed implementation of [`CompletionBackend`]
pub struct HttpBackend {
    provider: Provider,
    base_url: String,
    api_key: String,
    http: Client,
}

impl HttpBackend {
    /// Build a backend for one model, resolving endpoint and key from the
    /// registry. Fails fast on unknown models or missing keys.
    pub fn for_model(registry: &ModelRegistry, model: &str) -> EvalResult<Self> {
        let entry = registry.resolve(model)?;
        let mut builder = Client::builder();
        if let Some(secs) = registry.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| EvalError::config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            provider: entry.provider,
            base_url: entry.base_url.trim_end_matches('/').to_string(),
            api_key: entry.api_key.clone(),
            http,
        })
    }

    async fn complete_openai(&self, request: &CompletionRequest) -> EvalResult<RawResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
            .collect();
        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "top_p": request.sampling.top_p,
        });
        if request.sampling.reasoning != ReasoningEffort::Minimal {
            body["reasoning_effort"] = json!(request.sampling.reasoning.as_str());
        }
        if let Some(seed) = request.sampling.seed {
            body["seed"] = json!(seed);
        }
        if request.stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({"include_usage": true});
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EvalError::transport(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EvalError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let tail: String = text.chars().take(500).collect();
            return Err(EvalError::transport(format!(
                "endpoint returned status {}: {}",
                status, tail
            )));
        }

        if request.stream {
            let chunks = self.collect_sse_chunks(response).await?;
            Ok(RawResponse::Streamed(chunks))
        } else {
            let body: Value = response
                .json()
                .await
                .map_err(|e| EvalError::transport(format!("invalid response body: {}", e)))?;
            Ok(RawResponse::OpenAi(body))
        }
    }

    /// Read an SSE body line by line, turning each `data:` payload into a
    /// [`StreamChunk`]. Unparsable chunks are skipped with a warning, the
    /// way the stream consumer has always tolerated proxy noise.
    async fn collect_sse_chunks(&self, response: reqwest::Response) -> EvalResult<Vec<StreamChunk>> {
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut chunks = Vec::new();

        'outer: while let Some(piece) = byte_stream.next().await {
            let piece =
                piece.map_err(|e| EvalError::transport(format!("stream read failed: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&piece));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                match parse_sse_line(line.trim()) {
                    SseEvent::Chunk(chunk) => {
                        if let Some(fragment) = &chunk.content {
                            // observer echo for human monitoring only
                            debug!(fragment = %fragment, "stream fragment");
                        }
                        chunks.push(chunk);
                    }
                    SseEvent::Done => break 'outer,
                    SseEvent::Skip => {}
                }
            }
        }
        if let SseEvent::Chunk(chunk) = parse_sse_line(buffer.trim()) {
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    async fn complete_google(&self, request: &CompletionRequest) -> EvalResult<RawResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);

        // Google takes a single user turn; system text is folded in front.
        let mut text = String::new();
        for message in &request.messages {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&message.content);
        }
        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": text}]}]
        });
        if request.sampling.reasoning == ReasoningEffort::Minimal {
            body["generationConfig"] = json!({
                "thinkingConfig": {"includeThoughts": false, "thinkingBudget": 0}
            });
        }

        let response = self
            .http
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EvalError::transport(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EvalError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let tail: String = text.chars().take(500).collect();
            return Err(EvalError::transport(format!(
                "endpoint returned status {}: {}",
                status, tail
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EvalError::transport(format!("invalid response body: {}", e)))?;
        Ok(RawResponse::Google(body))
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn complete(&self, request: &CompletionRequest) -> EvalResult<RawResponse> {
        match self.provider {
            Provider::OpenAi => self.complete_openai(request).await,
            Provider::Google => self.complete_google(request).await,
        }
    }
}

enum SseEvent {
    Chunk(StreamChunk),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data: ") else {
        return SseEvent::Skip;
    };
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "skipping unparsable stream chunk");
            return SseEvent::Skip;
        }
    };

    let mut chunk = StreamChunk::default();
    if let Some(choice) = value["choices"].as_array().and_then(|c| c.first()) {
        if let Some(content) = choice["delta"]["content"].as_str() {
            chunk.content = Some(content.to_string());
        }
        if let Some(reason) = choice["finish_reason"].as_str() {
            chunk.finish_reason = Some(reason.to_string());
        }
    }
    chunk.usage = parse_openai_usage(&value);
    SseEvent::Chunk(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_content_line_parses() {
        let line = r#"data: {"choices":[{"delta":{"content":"42"},"finish_reason":null}]}"#;
        match parse_sse_line(line) {
            SseEvent::Chunk(chunk) => {
                assert_eq!(chunk.content.as_deref(), Some("42"));
                assert!(chunk.finish_reason.is_none());
            }
            _ => panic!("expected chunk"),
        }
    }

    #[test]
    fn sse_final_line_carries_usage_and_finish() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":7,"completion_tokens":3,"total_tokens":10}}"#;
        match parse_sse_line(line) {
            SseEvent::Chunk(chunk) => {
                assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
                let usage = chunk.usage.expect("usage present");
                assert_eq!(usage.prompt_tokens, 7);
                assert_eq!(usage.total_tokens, 10);
            }
            _ => panic!("expected chunk"),
        }
    }

    #[test]
    fn sse_done_and_noise_lines() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseEvent::Done));
        assert!(matches!(parse_sse_line(""), SseEvent::Skip));
        assert!(matches!(parse_sse_line(": keepalive"), SseEvent::Skip));
        assert!(matches!(parse_sse_line("data: {broken"), SseEvent::Skip));
    }
}
