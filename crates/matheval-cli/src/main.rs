//! Matheval CLI application
//!
//! Runs one evaluation batch: loads the dataset for a task, solves each
//! problem with the model under evaluation, scores the answers with the
//! judge model, and persists one record per problem.

mod args;

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use matheval_core::llm::client::HttpBackend;
use matheval_core::llm::messages::{ReasoningEffort, SamplingOptions};
use matheval_core::{
    JUDGE_MODEL, JudgeInvoker, ModelRegistry, ResultStore, RetryPolicy, Scheduler, TaskRunner,
    load_work_units, parse_task,
};

use args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let registry = match &cli.config {
        Some(path) => ModelRegistry::from_file(path)
            .with_context(|| format!("loading model registry from {}", path.display()))?,
        None => ModelRegistry::builtin(),
    };

    let task = parse_task(&cli.task)?;
    let reasoning = ReasoningEffort::from_str(&cli.reasoning)?;

    let store = Arc::new(ResultStore::open(&cli.output_dir)?);
    let finished = store.completed_ids();

    let subset: Option<HashSet<u64>> = if cli.ids.is_empty() {
        None
    } else {
        info!(ids = ?cli.ids, "restricting run to specific problem ids");
        Some(cli.ids.iter().copied().collect())
    };

    let mut units = load_work_units(&cli.data_dir, &task, subset.as_ref())?;
    units.retain(|unit| {
        let done = finished.contains(&unit.problem_id);
        if done {
            info!(problem_id = unit.problem_id, "skipping already processed problem");
        }
        !done
    });

    if units.is_empty() {
        info!("no pending problems to process");
    } else {
        let solve_backend = Arc::new(HttpBackend::for_model(&registry, &cli.model)?);
        let judge_backend = Arc::new(HttpBackend::for_model(&registry, JUDGE_MODEL)?);

        let sampling = SamplingOptions {
            seed: cli.seed,
            reasoning,
            ..SamplingOptions::default()
        };
        let runner = TaskRunner::new(
            solve_backend,
            JudgeInvoker::new(judge_backend, cli.seed),
            &cli.model,
            sampling,
            cli.stream,
            RetryPolicy::solve(),
            &cli.level,
            &cli.class_name,
            registry.price(&cli.model),
        );

        let scheduler = Scheduler::new(runner, Arc::clone(&store), cli.concurrency);
        let report = scheduler.run(units).await;
        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            total = report.total(),
            "run finished"
        );
        for failure in &report.failed {
            info!(
                problem_id = failure.problem_id,
                phase = %failure.phase,
                reason = %failure.reason,
                "unresolved problem"
            );
        }
    }

    if cli.summary {
        let type_label = format!(
            "{}_{}_{}_Evaluation",
            cli.level,
            cli.class_name,
            task.mode.label()
        );
        let summary = store.write_summary(&cli.model, &type_label)?;
        let overall = &summary.evaluation_summary.overall_accuracy;
        info!(
            accuracy = overall.value,
            correct = overall.correct_count,
            total = overall.total_count,
            "overall accuracy"
        );
    }

    Ok(())
}
