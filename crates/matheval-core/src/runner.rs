//! Per-problem pipeline: solve with retry, judge once, build the record
//!
//! The solve phase retries across transport faults, throttling, empty
//! responses and unusable answers. The judge phase gets exactly one
//! attempt: a deterministic judge will not produce a different verdict
//! for the same input, so a parse failure is terminal for the unit.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};

use crate::config::pricing::{ModelPrice, compute_cost};
use crate::dataset::{TaskMode, WorkUnit};
use crate::error::{EvalError, EvalResult};
use crate::extract::{extract_answers, is_usable};
use crate::judge::JudgeInvoker;
use crate::llm::client::{CompletionBackend, CompletionRequest};
use crate::llm::messages::SamplingOptions;
use crate::llm::response::{CanonicalResponse, FinishReason, TokenUsage};
use crate::prompt::solve_messages;
use crate::retry::{RetryPolicy, run_with_retry};
use crate::store::EvaluationRecord;

/// Pipeline stage a unit failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Solve,
    Judge,
    Persist,
    /// The worker task itself died, e.g. a panic
    Worker,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Solve => write!(f, "solve"),
            Phase::Judge => write!(f, "judge"),
            Phase::Persist => write!(f, "persist"),
            Phase::Worker => write!(f, "worker"),
        }
    }
}

/// Last observed model output before a unit gave up, kept for triage
#[derive(Debug, Clone, Default)]
pub struct Diagnostic {
    pub finish_reason: Option<FinishReason>,
    pub usage: TokenUsage,
    pub content_tail: String,
}

/// A unit that did not produce a record
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub problem_id: u64,
    pub phase: Phase,
    pub reason: String,
    pub diagnostic: Option<Diagnostic>,
}

/// Terminal state of one work unit
#[derive(Debug)]
pub enum UnitOutcome {
    Completed(Box<EvaluationRecord>),
    Failed(UnitFailure),
}

impl UnitOutcome {
    pub fn problem_id(&self) -> u64 {
        match self {
            UnitOutcome::Completed(record) => record.problem_id,
            UnitOutcome::Failed(failure) => failure.problem_id,
        }
    }
}

/// Everything one unit needs besides the unit itself
pub struct TaskRunner {
    solve_backend: Arc<dyn CompletionBackend>,
    judge: JudgeInvoker,
    model: String,
    sampling: SamplingOptions,
    stream: bool,
    policy: RetryPolicy,
    level: String,
    class_name: String,
    price: Option<ModelPrice>,
}

impl TaskRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        solve_backend: Arc<dyn CompletionBackend>,
        judge: JudgeInvoker,
        model: impl Into<String>,
        sampling: SamplingOptions,
        stream: bool,
        policy: RetryPolicy,
        level: impl Into<String>,
        class_name: impl Into<String>,
        price: Option<ModelPrice>,
    ) -> Self {
        Self {
            solve_backend,
            judge,
            model: model.into(),
            sampling,
            stream,
            policy,
            level: level.into(),
            class_name: class_name.into(),
            price,
        }
    }

    /// Output type string, e.g. `L5_MP2_Separated_Evaluation`
    pub fn type_label(&self, mode: TaskMode) -> String {
        format!(
            "{}_{}_{}_Evaluation",
            self.level,
            self.class_name,
            mode.label()
        )
    }

    /// Drive one unit to its terminal state. Never panics on model output;
    /// every failure is reported as a `UnitOutcome::Failed`.
    pub async fn run_unit(&self, unit: &WorkUnit) -> UnitOutcome {
        let problem_id = unit.problem_id;
        let mode = unit.task.mode;

        let (canonical, answers) = match self.solve(unit).await {
            Ok(solved) => solved,
            Err((error, diagnostic)) => {
                warn!(problem_id, error = %error, "solve phase failed");
                return UnitOutcome::Failed(UnitFailure {
                    problem_id,
                    phase: Phase::Solve,
                    reason: error.to_string(),
                    diagnostic,
                });
            }
        };

        let truths = unit.record.effective_truth(mode);
        let correctness = match self.judge.judge(&answers, &truths, mode).await {
            Ok(verdict) => verdict,
            Err(error) => {
                warn!(problem_id, error = %error, "judge phase failed");
                return UnitOutcome::Failed(UnitFailure {
                    problem_id,
                    phase: Phase::Judge,
                    reason: error.to_string(),
                    diagnostic: Some(diagnostic_of(&canonical)),
                });
            }
        };

        let usage = &canonical.usage;
        let completion_tokens = usage.derived_completion_tokens();
        let record = EvaluationRecord {
            timestamp: Utc::now().to_rfc3339(),
            model: self.model.clone(),
            type_label: self.type_label(mode),
            problem_id,
            math_problem: match mode {
                TaskMode::Separated => unit.record.synthesised_by.clone(),
                TaskMode::Synthesised => {
                    serde_json::Value::String(unit.record.math_problem.clone())
                }
            },
            reasoning_content: canonical.content,
            problem_type: unit.record.problem_type.clone(),
            output_answer: answers,
            ground_truth: truths,
            correctness,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens,
            reasoning_tokens: usage.reasoning_tokens,
            cost: compute_cost(self.price.as_ref(), usage.prompt_tokens, completion_tokens),
        };
        info!(
            problem_id,
            correct = record.is_correct(),
            "unit completed"
        );
        UnitOutcome::Completed(Box::new(record))
    }

    /// Solve with the retry policy; an unusable answer consumes an attempt
    /// like any transport failure.
    async fn solve(
        &self,
        unit: &WorkUnit,
    ) -> Result<(CanonicalResponse, Vec<String>), (EvalError, Option<Diagnostic>)> {
        let messages = match solve_messages(unit) {
            Ok(messages) => messages,
            Err(error) => return Err((error, None)),
        };
        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            sampling: self.sampling,
            stream: self.stream,
        };
        let mode = unit.task.mode;

        let last_seen: Mutex<Option<Diagnostic>> = Mutex::new(None);
        let outcome = run_with_retry(&self.policy, |attempt| {
            let request = &request;
            let last_seen = &last_seen;
            async move {
                let raw = self.solve_backend.complete(request).await?;
                let canonical = raw.normalize()?;
                if let Ok(mut slot) = last_seen.lock() {
                    *slot = Some(diagnostic_of(&canonical));
                }
                let answers = extract_answers(&canonical.content, mode);
                if !is_usable(&answers) {
                    warn!(
                        problem_id = unit.problem_id,
                        attempt, "response carried no usable answer"
                    );
                    return Err(EvalError::UnusableAnswer);
                }
                Ok((canonical, answers))
            }
        })
        .await;

        outcome.map_err(|error| {
            let diagnostic = last_seen.lock().ok().and_then(|mut slot| slot.take());
            (error, diagnostic)
        })
    }
}

fn diagnostic_of(canonical: &CanonicalResponse) -> Diagnostic {
    const TAIL: usize = 300;
    let content = &canonical.content;
    let start = content
        .char_indices()
        .rev()
        .nth(TAIL.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    Diagnostic {
        finish_reason: Some(canonical.finish_reason),
        usage: canonical.usage,
        content_tail: content[start..].to_string(),
    }
}
