//! Response normalization across provider wire formats
//!
//! Every provider shape (OpenAI-style choices, Google candidates, or a
//! sequence of streamed delta chunks) is dispatched once here into a single
//! [`CanonicalResponse`]. No downstream component ever branches on provider
//! identity again.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EvalError, EvalResult};

/// Token usage for one call. Every field defaults to 0 rather than being
/// absent, so callers never special-case a missing sub-field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Completion tokens as the original record layout defines them:
    /// total minus prompt, saturating.
    pub fn derived_completion_tokens(&self) -> u64 {
        self.total_tokens.saturating_sub(self.prompt_tokens)
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
    Other,
}

impl FinishReason {
    /// Map a provider finish string onto the canonical enum. A missing
    /// signal is treated as a normal stop.
    pub fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            None => FinishReason::Stop,
            Some(r) => match r.to_ascii_lowercase().as_str() {
                "stop" | "end_turn" => FinishReason::Stop,
                "length" | "max_tokens" => FinishReason::Length,
                "error" | "content_filter" | "safety" => FinishReason::Error,
                _ => FinishReason::Other,
            },
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishReason::Stop => write!(f, "stop"),
            FinishReason::Length => write!(f, "length"),
            FinishReason::Error => write!(f, "error"),
            FinishReason::Other => write!(f, "other"),
        }
    }
}

/// One chunk of a streamed completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Incremental content fragment
    pub content: Option<String>,
    /// Finish signal, usually on the last data chunk
    pub finish_reason: Option<String>,
    /// Usage block, carried by the final chunk when requested
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// Create a content-only chunk
    pub fn content(fragment: impl Into<String>) -> Self {
        Self {
            content: Some(fragment.into()),
            ..Self::default()
        }
    }

    /// Create a final chunk carrying the finish signal and usage
    pub fn final_chunk(finish_reason: Option<String>, usage: Option<TokenUsage>) -> Self {
        Self {
            content: None,
            finish_reason,
            usage,
        }
    }
}

/// A provider response exactly as it came off the wire
#[derive(Debug, Clone)]
pub enum RawResponse {
    /// OpenAI-style non-streaming body: `choices[0].message.content` + `usage`
    OpenAi(Value),
    /// Google-style body: `candidates[0].content.parts[].text` + `usageMetadata`
    Google(Value),
    /// Collected streaming chunks in arrival order
    Streamed(Vec<StreamChunk>),
}

/// The one canonical response shape used by the rest of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}

impl RawResponse {
    /// Normalize into the canonical shape.
    ///
    /// Hard failure ([`EvalError::EmptyResponse`]) when the response carried
    /// neither content nor a usage block; such calls are indistinguishable
    /// from a dropped connection and must be retried, not scored.
    pub fn normalize(&self) -> EvalResult<CanonicalResponse> {
        match self {
            RawResponse::OpenAi(body) => normalize_openai(body),
            RawResponse::Google(body) => normalize_google(body),
            RawResponse::Streamed(chunks) => normalize_streamed(chunks),
        }
    }
}

/// Parse an OpenAI-style `usage` object. Returns `None` when the block is
/// absent or null.
pub(crate) fn parse_openai_usage(body: &Value) -> Option<TokenUsage> {
    let usage = body.get("usage")?.as_object()?;
    let prompt_tokens = usage
        .get("prompt_tokens")
        .or_else(|| usage.get("input_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let completion_tokens = usage
        .get("completion_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let total_tokens = usage
        .get("total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(prompt_tokens + completion_tokens);
    let reasoning_tokens = usage
        .get("completion_tokens_details")
        .and_then(|details| details.get("reasoning_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Some(TokenUsage {
        prompt_tokens,
        completion_tokens,
        reasoning_tokens,
        total_tokens,
    })
}

fn normalize_openai(body: &Value) -> EvalResult<CanonicalResponse> {
    let choice = &body["choices"][0];
    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();
    let finish_reason = FinishReason::from_wire(choice["finish_reason"].as_str());

    let usage = parse_openai_usage(body);
    if content.is_empty() && usage.is_none() {
        return Err(EvalError::EmptyResponse);
    }

    Ok(CanonicalResponse {
        content,
        finish_reason,
        usage: usage.unwrap_or_default(),
    })
}

fn normalize_google(body: &Value) -> EvalResult<CanonicalResponse> {
    let candidate = &body["candidates"][0];
    let mut content = String::new();
    if let Some(parts) = candidate["content"]["parts"].as_array() {
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                content.push_str(text);
            }
        }
    }
    let finish_reason = FinishReason::from_wire(candidate["finishReason"].as_str());

    let usage = body["usageMetadata"].as_object().map(|meta| {
        let prompt_tokens = meta
            .get("promptTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let completion_tokens = meta
            .get("candidatesTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        TokenUsage {
            prompt_tokens,
            completion_tokens,
            reasoning_tokens: meta
                .get("thoughtsTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            total_tokens: meta
                .get("totalTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(prompt_tokens + completion_tokens),
        }
    });

    if content.is_empty() && usage.is_none() {
        return Err(EvalError::EmptyResponse);
    }

    Ok(CanonicalResponse {
        content,
        finish_reason,
        usage: usage.unwrap_or_default(),
    })
}

fn normalize_streamed(chunks: &[StreamChunk]) -> EvalResult<CanonicalResponse> {
    let mut content = String::new();
    let mut finish: Option<String> = None;
    let mut usage: Option<TokenUsage> = None;

    for chunk in chunks {
        if let Some(fragment) = &chunk.content {
            content.push_str(fragment);
        }
        if let Some(reason) = &chunk.finish_reason {
            // last non-null finish signal wins
            finish = Some(reason.clone());
        }
        if let Some(chunk_usage) = chunk.usage {
            // usage blocks prior to the last are ignored
            usage = Some(chunk_usage);
        }
    }

    if content.is_empty() && usage.is_none() {
        return Err(EvalError::EmptyResponse);
    }

    Ok(CanonicalResponse {
        content,
        finish_reason: FinishReason::from_wire(finish.as_deref()),
        usage: usage.unwrap_or_default(),
    })
}
