//! Bounded-concurrency execution of a batch of work units
//!
//! A semaphore caps how many units occupy the pipeline at once; the permit
//! is held across solve, judge and persist, so the cap bounds end-to-end
//! occupancy, not just in-flight requests. A panicking unit costs only its
//! own result.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::dataset::WorkUnit;
use crate::runner::{Phase, TaskRunner, UnitFailure, UnitOutcome};
use crate::store::ResultStore;

/// Batch result: ids that produced a record, failures that did not
#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: Vec<u64>,
    pub failed: Vec<UnitFailure>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// Runs units through one shared runner and store under a concurrency cap
pub struct Scheduler {
    runner: Arc<TaskRunner>,
    store: Arc<ResultStore>,
    concurrency: usize,
}

impl Scheduler {
    pub fn new(runner: TaskRunner, store: Arc<ResultStore>, concurrency: usize) -> Self {
        Self {
            runner: Arc::new(runner),
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Run the whole batch to completion and report per-unit outcomes.
    pub async fn run(&self, units: Vec<WorkUnit>) -> RunReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        info!(
            units = units.len(),
            concurrency = self.concurrency,
            "starting batch"
        );

        let mut handles: Vec<(u64, JoinHandle<UnitOutcome>)> = Vec::with_capacity(units.len());
        for unit in units {
            let problem_id = unit.problem_id;
            let runner = Arc::clone(&self.runner);
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return UnitOutcome::Failed(UnitFailure {
                            problem_id,
                            phase: Phase::Worker,
                            reason: "scheduler shut down".to_string(),
                            diagnostic: None,
                        });
                    }
                };

                let outcome = runner.run_unit(&unit).await;
                match outcome {
                    UnitOutcome::Completed(record) => match store.write_record(&record) {
                        Ok(()) => UnitOutcome::Completed(record),
                        Err(e) => UnitOutcome::Failed(UnitFailure {
                            problem_id,
                            phase: Phase::Persist,
                            reason: e.to_string(),
                            diagnostic: None,
                        }),
                    },
                    failed => failed,
                }
            });
            handles.push((problem_id, handle));
        }

        let mut report = RunReport::default();
        for (problem_id, handle) in handles {
            match handle.await {
                Ok(UnitOutcome::Completed(record)) => report.completed.push(record.problem_id),
                Ok(UnitOutcome::Failed(failure)) => {
                    error!(
                        problem_id = failure.problem_id,
                        phase = %failure.phase,
                        reason = %failure.reason,
                        "unit failed"
                    );
                    report.failed.push(failure);
                }
                Err(join_error) => {
                    error!(problem_id, error = %join_error, "worker task died");
                    report.failed.push(UnitFailure {
                        problem_id,
                        phase: Phase::Worker,
                        reason: join_error.to_string(),
                        diagnostic: None,
                    });
                }
            }
        }
        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        report
    }
}
