//! End-to-end pipeline tests with scripted backends: scheduling, retry
//! exhaustion, persistence and restart behavior.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use matheval_core::{
    CompletionBackend, CompletionRequest, EvalError, EvalResult, JudgeInvoker, ModelPrice, Phase,
    RawResponse, ResultStore, RetryPolicy, RunReport, Scheduler, TaskRunner, WorkUnit, parse_task,
};
use matheval_core::llm::messages::SamplingOptions;

fn openai_reply(content: &str) -> RawResponse {
    RawResponse::OpenAi(json!({
        "choices": [{"message": {"content": content}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 10, "total_tokens": 30}
    }))
}

/// Backend that replies per problem content, tracking call and concurrency
/// highs. The reply closure sees the flattened prompt text.
struct ScriptedBackend {
    reply: Box<dyn Fn(&str) -> EvalResult<RawResponse> + Send + Sync>,
    delay: Duration,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    fn new(reply: impl Fn(&str) -> EvalResult<RawResponse> + Send + Sync + 'static) -> Arc<Self> {
        Self::with_delay(reply, Duration::ZERO)
    }

    fn with_delay(
        reply: impl Fn(&str) -> EvalResult<RawResponse> + Send + Sync + 'static,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            delay,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> EvalResult<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let result = (self.reply)(&prompt);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn judge_all_true() -> Arc<ScriptedBackend> {
    ScriptedBackend::new(|_| Ok(openai_reply(r#"{"correctness": [true]}"#)))
}

fn synthesised_units(count: u64) -> Vec<WorkUnit> {
    let task = parse_task("MP3_Synthesised").unwrap();
    (1..=count)
        .map(|id| {
            let record = serde_json::from_value(json!({
                "Problem_ID": id,
                "Math_Problem": format!("problem number {id}"),
                "Ground_Truth": ["first", "final"],
                "Problem_Type": [{"A1": ["Mathematics -> Algebra -> Basics"]}]
            }))
            .unwrap();
            WorkUnit::new(record, task.clone())
        })
        .collect()
}

fn build_runner(
    solve: Arc<ScriptedBackend>,
    judge: Arc<ScriptedBackend>,
    policy: RetryPolicy,
) -> TaskRunner {
    TaskRunner::new(
        solve,
        JudgeInvoker::new(judge, Some(42)),
        "gpt-5",
        SamplingOptions::default(),
        false,
        policy,
        "L5",
        "MP3",
        Some(ModelPrice::new(0.625, 5.0)),
    )
}

async fn run_batch(
    solve: Arc<ScriptedBackend>,
    judge: Arc<ScriptedBackend>,
    policy: RetryPolicy,
    store: Arc<ResultStore>,
    units: Vec<WorkUnit>,
    concurrency: usize,
) -> RunReport {
    let runner = build_runner(solve, judge, policy);
    Scheduler::new(runner, store, concurrency).run(units).await
}

#[tokio::test]
async fn batch_completes_and_persists_every_unit() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ResultStore::open(dir.path()).unwrap());
    let solve = ScriptedBackend::new(|_| Ok(openai_reply(r#"{"answer": "final"}"#)));

    let report = run_batch(
        solve.clone(),
        judge_all_true(),
        RetryPolicy::immediate(3),
        Arc::clone(&store),
        synthesised_units(8),
        4,
    )
    .await;

    assert_eq!(report.completed.len(), 8);
    assert!(report.failed.is_empty());
    assert_eq!(solve.calls(), 8);

    let records = store.load_existing();
    assert_eq!(records.len(), 8);
    let record = &records[&3];
    assert_eq!(record.type_label, "L5_MP3_Synthesised_Evaluation");
    assert_eq!(record.output_answer, vec!["final"]);
    assert_eq!(record.ground_truth, vec!["first", "final"]);
    assert!(record.is_correct());
    assert_eq!(record.completion_tokens, 20);
}

#[tokio::test]
async fn finished_problems_cost_no_calls_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ResultStore::open(dir.path()).unwrap());
    let solve = ScriptedBackend::new(|_| Ok(openai_reply(r#"{"answer": "final"}"#)));

    run_batch(
        solve,
        judge_all_true(),
        RetryPolicy::immediate(3),
        Arc::clone(&store),
        synthesised_units(5),
        2,
    )
    .await;

    // restart: everything persisted is filtered out before scheduling
    let finished: HashSet<u64> = store.completed_ids();
    let mut pending = synthesised_units(5);
    pending.retain(|unit| !finished.contains(&unit.problem_id));
    assert!(pending.is_empty());

    let second_solve = ScriptedBackend::new(|_| Ok(openai_reply(r#"{"answer": "final"}"#)));
    let report = run_batch(
        second_solve.clone(),
        judge_all_true(),
        RetryPolicy::immediate(3),
        Arc::clone(&store),
        pending,
        2,
    )
    .await;
    assert_eq!(report.total(), 0);
    assert_eq!(second_solve.calls(), 0);
    assert_eq!(store.load_existing().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_cap_bounds_in_flight_units() {
    for cap in [1usize, 5, 20] {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::open(dir.path()).unwrap());
        let solve = ScriptedBackend::with_delay(
            |_| Ok(openai_reply(r#"{"answer": "final"}"#)),
            Duration::from_millis(5),
        );

        let report = run_batch(
            solve.clone(),
            judge_all_true(),
            RetryPolicy::immediate(2),
            store,
            synthesised_units(50),
            cap,
        )
        .await;

        assert_eq!(report.completed.len(), 50);
        assert!(
            solve.max_in_flight.load(Ordering::SeqCst) <= cap,
            "cap {cap} exceeded"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn solve_retry_budget_is_twenty_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ResultStore::open(dir.path()).unwrap());
    // replies parse fine but never contain a usable answer
    let solve = ScriptedBackend::new(|_| Ok(openai_reply("prose with no structured block")));

    let report = run_batch(
        solve.clone(),
        judge_all_true(),
        RetryPolicy::solve(),
        Arc::clone(&store),
        synthesised_units(1),
        1,
    )
    .await;

    assert_eq!(solve.calls(), 20);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].phase, Phase::Solve);
    assert!(store.load_existing().is_empty());
}

#[tokio::test]
async fn judge_sees_only_final_truth_in_synthesised_mode() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ResultStore::open(dir.path()).unwrap());
    let solve = ScriptedBackend::new(|_| Ok(openai_reply(r#"{"answer": "final"}"#)));
    let judge = ScriptedBackend::new(|prompt| {
        assert!(prompt.contains(r#""truth":"final""#));
        assert!(!prompt.contains(r#""truth":"first""#));
        Ok(openai_reply(r#"{"correctness": [true]}"#))
    });

    let report = run_batch(
        solve,
        judge,
        RetryPolicy::immediate(2),
        Arc::clone(&store),
        synthesised_units(1),
        1,
    )
    .await;
    assert_eq!(report.completed, vec![1]);
    // the persisted record still carries the full truth list
    assert_eq!(store.load_existing()[&1].ground_truth, vec!["first", "final"]);
}

#[tokio::test]
async fn one_bad_unit_does_not_poison_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ResultStore::open(dir.path()).unwrap());
    let solve = ScriptedBackend::new(|prompt| {
        if prompt.contains("problem number 2") {
            panic!("simulated worker crash");
        }
        Ok(openai_reply(r#"{"answer": "final"}"#))
    });

    let report = run_batch(
        solve,
        judge_all_true(),
        RetryPolicy::immediate(2),
        Arc::clone(&store),
        synthesised_units(3),
        2,
    )
    .await;

    let mut completed = report.completed.clone();
    completed.sort_unstable();
    assert_eq!(completed, vec![1, 3]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].problem_id, 2);
    assert_eq!(report.failed[0].phase, Phase::Worker);
    assert_eq!(store.load_existing().len(), 2);
}

#[tokio::test]
async fn rate_limits_and_faults_are_absorbed_by_retry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ResultStore::open(dir.path()).unwrap());
    let attempts = AtomicU32::new(0);
    let solve = ScriptedBackend::new(move |_| {
        match attempts.fetch_add(1, Ordering::SeqCst) {
            0 => Err(EvalError::RateLimited),
            1 => Err(EvalError::transport("gateway hiccup")),
            _ => Ok(openai_reply(r#"{"answer": "final"}"#)),
        }
    });

    let report = run_batch(
        solve.clone(),
        judge_all_true(),
        RetryPolicy::immediate(5),
        store,
        synthesised_units(1),
        1,
    )
    .await;
    assert_eq!(report.completed, vec![1]);
    assert_eq!(solve.calls(), 3);
}
