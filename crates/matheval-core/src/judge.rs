//! Judge invocation: equivalence scoring of extracted answers
//!
//! The judge is a fixed secondary model, never the model under evaluation.
//! One call per unit, no retry: a malformed judge response will not
//! self-correct on identical input with the same seed.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::dataset::TaskMode;
use crate::error::{EvalError, EvalResult};
use crate::extract::extract_correctness;
use crate::llm::client::{CompletionBackend, CompletionRequest};
use crate::llm::messages::SamplingOptions;
use crate::prompt::judge_prompt;

/// The fixed judge model identity
pub const JUDGE_MODEL: &str = "gpt-4o";

/// Invokes the judge endpoint and parses its verdict
pub struct JudgeInvoker {
    backend: Arc<dyn CompletionBackend>,
    seed: Option<u64>,
}

impl JudgeInvoker {
    pub fn new(backend: Arc<dyn CompletionBackend>, seed: Option<u64>) -> Self {
        Self { backend, seed }
    }

    /// Score each (answer, truth) pair. In synthesised mode only the final
    /// truth entry is authoritative, so the truth is truncated to it before
    /// the comparison prompt is built.
    pub async fn judge(
        &self,
        answers: &[String],
        truths: &[String],
        mode: TaskMode,
    ) -> EvalResult<Vec<bool>> {
        let truncated;
        let truths = if mode == TaskMode::Synthesised {
            truncated = truths.last().cloned().into_iter().collect::<Vec<_>>();
            &truncated
        } else {
            truths
        };

        let request = CompletionRequest {
            model: JUDGE_MODEL.to_string(),
            messages: judge_prompt(answers, truths),
            sampling: SamplingOptions::for_judge(self.seed),
            stream: false,
        };

        let raw = self.backend.complete(&request).await?;
        let canonical = raw.normalize()?;
        debug!(content_len = canonical.content.len(), "judge responded");

        let verdict = extract_correctness(&canonical.content);
        if verdict.is_empty() {
            warn!("judge response carried no parsable correctness array");
            return Err(EvalError::JudgeUndetermined);
        }
        Ok(verdict)
    }
}
