//! LLM wire layer: messages, canonical responses, and the HTTP backend

pub mod client;
pub mod messages;
pub mod response;

pub use client::{CompletionBackend, CompletionRequest, HttpBackend};
pub use messages::{LlmMessage, MessageRole, ReasoningEffort, SamplingOptions};
pub use response::{CanonicalResponse, FinishReason, RawResponse, StreamChunk, TokenUsage};
