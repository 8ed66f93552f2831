//! Message and sampling types shared by the solve and judge endpoints

use serde::{Deserialize, Serialize};

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message (instructions)
    System,
    /// User message (the problem statement)
    User,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// A message sent to a model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Requested reasoning effort for models that support it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// No extended reasoning; the `reasoning_effort` field is omitted from
    /// the request entirely.
    Minimal,
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

impl std::str::FromStr for ReasoningEffort {
    type Err = crate::error::EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(ReasoningEffort::Minimal),
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            other => Err(crate::error::EvalError::invalid_input(format!(
                "unknown reasoning effort '{}'",
                other
            ))),
        }
    }
}

/// Sampling options forwarded on every call
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub top_p: f64,
    pub seed: Option<u64>,
    pub reasoning: ReasoningEffort,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            top_p: 0.95,
            seed: None,
            reasoning: ReasoningEffort::Medium,
        }
    }
}

impl SamplingOptions {
    /// Options for judge calls: deterministic where possible, no extended
    /// reasoning.
    pub fn for_judge(seed: Option<u64>) -> Self {
        Self {
            seed,
            reasoning: ReasoningEffort::Minimal,
            ..Self::default()
        }
    }
}
