//! Matheval Core Library
//!
//! This crate provides the evaluation pipeline for LLM math benchmarks:
//! provider clients and response normalization, structured answer
//! extraction, judge invocation, retrying execution under a concurrency
//! cap, and persistent per-problem results.

pub mod config;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod judge;
pub mod llm;
pub mod prompt;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod store;

// Re-export commonly used types
pub use config::pricing::{ModelPrice, compute_cost};
pub use config::registry::{ModelEntry, ModelRegistry, Provider};
pub use dataset::{ProblemRecord, TaskMode, TaskSpec, WorkUnit, load_work_units, parse_task};
pub use error::{EvalError, EvalResult};
pub use judge::{JUDGE_MODEL, JudgeInvoker};
pub use llm::client::{CompletionBackend, CompletionRequest, HttpBackend};
pub use llm::messages::{LlmMessage, MessageRole, ReasoningEffort, SamplingOptions};
pub use llm::response::{CanonicalResponse, FinishReason, RawResponse, TokenUsage};
pub use retry::{RetryPolicy, run_with_retry};
pub use runner::{Diagnostic, Phase, TaskRunner, UnitFailure, UnitOutcome};
pub use scheduler::{RunReport, Scheduler};
pub use store::{EvaluationRecord, ResultStore, RunSummary};
