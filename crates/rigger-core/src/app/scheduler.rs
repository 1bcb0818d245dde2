//! Worker pool over the admission queue.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Pipeline, RunContext};
use crate::domain::{RunId, TaskId, TaskSpec};
use crate::gate::{Admission, ResourceGate};
use crate::ledger::LedgerSnapshot;
use crate::queue::TaskQueue;
use crate::report::Report;

/// Result of a whole run: the ledger and the report rendered from it.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub ledger: LedgerSnapshot,
    pub report: Report,
}

/// A validated run, ready to start. Built by `RunBuilder`.
pub struct Orchestrator {
    run: Arc<RunContext>,
    pipeline: Arc<Pipeline>,
    gate: Arc<ResourceGate>,
    tasks: Vec<TaskSpec>,
    pool_size: usize,
}

impl Orchestrator {
    pub(crate) fn new(
        run: RunContext,
        pipeline: Pipeline,
        gate: ResourceGate,
        tasks: Vec<TaskSpec>,
        pool_size: usize,
    ) -> Self {
        Self {
            run: Arc::new(run),
            pipeline: Arc::new(pipeline),
            gate: Arc::new(gate),
            tasks,
            pool_size,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run.run_id()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    /// Cancelling this token stops admission, kills in-flight commands and
    /// lets `run` return with whatever was finalized.
    pub fn cancel_token(&self) -> CancellationToken {
        self.run.cancel_token().clone()
    }

    /// Drain every task through the worker pool, then report.
    pub async fn run(self) -> RunOutcome {
        let started_at = Utc::now();
        let clock = Instant::now();
        let scheduled: Vec<TaskId> = self.tasks.iter().map(|task| task.id.clone()).collect();
        let queue = Arc::new(TaskQueue::new(self.tasks, self.pipeline.registry().limits()));

        info!(
            run_id = %self.run.run_id(),
            tasks = scheduled.len(),
            workers = self.pool_size,
            dry_run = self.run.settings().dry_run,
            "run started"
        );

        let joins: Vec<JoinHandle<()>> = (0..self.pool_size)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let run = Arc::clone(&self.run);
                let pipeline = Arc::clone(&self.pipeline);
                let gate = Arc::clone(&self.gate);
                tokio::spawn(async move { worker_loop(worker_id, queue, run, pipeline, gate).await })
            })
            .collect();

        for join in joins {
            if let Err(err) = join.await {
                warn!(error = %err, "worker ended abnormally");
            }
        }

        let ledger = self.pipeline.ledger().snapshot();
        let report = Report::build(
            self.run.run_id(),
            started_at,
            clock.elapsed(),
            &ledger,
            &scheduled,
        );
        info!(
            run_id = %report.run_id,
            finished = ledger.len(),
            not_attempted = report.not_attempted.len(),
            undispatched = queue.pending(),
            elapsed_ms = report.elapsed_ms,
            "run drained"
        );
        RunOutcome { ledger, report }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<TaskQueue>,
    run: Arc<RunContext>,
    pipeline: Arc<Pipeline>,
    gate: Arc<ResourceGate>,
) {
    let cancel = run.cancel_token();
    while let Some(lease) = queue.lease(cancel).await {
        let task = lease.task();

        // Manual tasks and dry runs do no work on the host.
        let gated = task.source_kind.is_automatable() && !run.settings().dry_run;
        if gated && gate.admit(cancel).await == Admission::Cancelled {
            break;
        }
        if cancel.is_cancelled() {
            break;
        }

        debug!(worker_id, task = %task.id, kind = %task.source_kind, "task admitted");
        pipeline.process(task, &run).await;
    }
    debug!(worker_id, "worker stopped");
}
