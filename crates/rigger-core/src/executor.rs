//! Drives the retry state machine against one adapter.
//!
//! A timeout is not a failure until the world says so: after a `TimedOut`
//! attempt the idempotency predicate is re-checked, and a passing check
//! confirms the attempt. After a `Failed` attempt the adapter may repair its
//! dependency state, followed by the same re-check.

use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::app::TaskContext;
use crate::domain::{AttemptId, AttemptOutcome, ExecutionAttempt, TaskSpec};
use crate::ports::{InstallReport, SourceAdapter};
use crate::queue::{AttemptVerdict, RetryMachine, RetryPolicy, RetryState};

/// How a confirmed attempt got confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Clean,
    AfterTimeout,
    AfterRepair,
}

impl Confirmation {
    fn message(self) -> &'static str {
        match self {
            Confirmation::Clean => "installed",
            Confirmation::AfterTimeout => "completed after supervisor timeout (verified installed)",
            Confirmation::AfterRepair => "installed after fixing dependencies",
        }
    }
}

/// Everything the attempts of one task produced.
#[derive(Debug, Clone)]
pub struct RetryRun {
    pub attempts: Vec<ExecutionAttempt>,
    pub state: RetryState,
    pub message: String,
    /// Report of the last attempt that returned one.
    pub last_report: Option<InstallReport>,
}

pub async fn execute(
    adapter: &dyn SourceAdapter,
    task: &TaskSpec,
    ctx: &TaskContext<'_>,
    policy: RetryPolicy,
) -> RetryRun {
    let mut machine = RetryMachine::new(policy);
    let mut attempts: Vec<ExecutionAttempt> = Vec::new();
    let mut last_report = None;
    let mut confirmation = Confirmation::Clean;
    let cancel = ctx.run_context().cancel_token();

    while let Some(number) = machine.begin() {
        let started_at = Utc::now();
        let clock = Instant::now();

        let (outcome, detail) = match adapter.install(task, ctx).await {
            Ok(report) => {
                let outcome = AttemptOutcome::from(report.exit);
                let detail = report.detail.clone();
                last_report = Some(report);
                (outcome, detail)
            }
            Err(err) => (AttemptOutcome::Failed, Some(err.to_string())),
        };

        let mut post_check = None;
        let verdict = match outcome {
            AttemptOutcome::Success => {
                confirmation = Confirmation::Clean;
                AttemptVerdict::Confirmed
            }
            AttemptOutcome::Cancelled => AttemptVerdict::Interrupted,
            _ if ctx.is_cancelled() => AttemptVerdict::Interrupted,
            AttemptOutcome::TimedOut => {
                let satisfied = adapter.is_satisfied(task, ctx).await;
                post_check = Some(satisfied);
                if satisfied {
                    info!(task = %task.id, attempt = number, "timed out but target is installed");
                    confirmation = Confirmation::AfterTimeout;
                    AttemptVerdict::Confirmed
                } else {
                    AttemptVerdict::Unconfirmed
                }
            }
            AttemptOutcome::Failed => {
                if adapter.repair(task, ctx).await {
                    let satisfied = adapter.is_satisfied(task, ctx).await;
                    post_check = Some(satisfied);
                    if satisfied {
                        confirmation = Confirmation::AfterRepair;
                        AttemptVerdict::Confirmed
                    } else {
                        AttemptVerdict::Unconfirmed
                    }
                } else {
                    AttemptVerdict::Unconfirmed
                }
            }
        };

        attempts.push(ExecutionAttempt {
            attempt_id: AttemptId::generate(),
            attempt_number: number,
            started_at,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            outcome,
            post_check,
            detail,
            log_ref: Some(ctx.log_path().to_path_buf()),
        });

        if let RetryState::Retrying { attempt, delay } = machine.record(verdict) {
            warn!(
                task = %task.id,
                attempt,
                outcome = ?outcome,
                delay_secs = delay.as_secs(),
                "attempt unconfirmed, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    machine.cancel();
                }
            }
        }
    }

    let state = machine.state();
    let message = match state {
        RetryState::Succeeded { .. } => confirmation.message().to_string(),
        RetryState::Exhausted { attempts: n } => {
            let reason = attempts
                .last()
                .and_then(|attempt| attempt.detail.clone())
                .unwrap_or_else(|| "target still not installed".to_string());
            format!("failed after {n} attempt(s): {reason}")
        }
        RetryState::Cancelled { attempts: n } => format!("interrupted after {n} attempt(s)"),
        RetryState::Idle | RetryState::Attempting { .. } | RetryState::Retrying { .. } => {
            "not attempted".to_string()
        }
    };

    RetryRun {
        attempts,
        state,
        message,
        last_report,
    }
}
