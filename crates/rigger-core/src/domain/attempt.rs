//! Execution attempts: one try of a task.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::AttemptId;
use crate::ports::ExitClass;

/// Classification of one attempt, as reported by the process supervisor.
///
/// Serialized as SCREAMING_SNAKE_CASE (SUCCESS / TIMED_OUT / ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    Success,
    TimedOut,
    Failed,
    /// Killed by the run-scoped cancellation signal.
    Cancelled,
}

impl From<ExitClass> for AttemptOutcome {
    fn from(exit: ExitClass) -> Self {
        match exit {
            ExitClass::Ok => AttemptOutcome::Success,
            ExitClass::TimedOut => AttemptOutcome::TimedOut,
            ExitClass::Failed { .. } => AttemptOutcome::Failed,
            ExitClass::Cancelled => AttemptOutcome::Cancelled,
        }
    }
}

/// A single recorded attempt. Immutable once pushed into a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub attempt_id: AttemptId,
    /// 1-based.
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,

    /// Result of the idempotency re-check run after a timeout or after a
    /// dependency repair. `None` when no re-check happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_check: Option<bool>,

    /// Short failure explanation (adapter error, failing step, exit code).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Per-task log file holding the captured output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_ref: Option<PathBuf>,
}

impl ExecutionAttempt {
    /// The target was verified satisfied at the end of this attempt, either
    /// by a clean exit or by a passing re-check.
    pub fn confirmed(&self) -> bool {
        self.outcome == AttemptOutcome::Success || self.post_check == Some(true)
    }
}
