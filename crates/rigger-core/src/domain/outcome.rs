//! Terminal outcome of a task: the ledger entry.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attempt::ExecutionAttempt;
use super::ids::TaskId;
use super::spec::SourceKind;
use super::strategy::Strategy;

/// Terminal status of a task.
///
/// - `Success`: verified satisfied after execution.
/// - `Failed`: attempts exhausted, predicate still false.
/// - `Partial`: execution succeeded but a downstream expectation (finding
///   or linking an executable) was not met.
/// - `Skipped`: already satisfied before any attempt.
/// - `Manual`: not automatable; a helper artifact was produced instead.
/// - `Simulated`: dry run.
/// - `Interrupted`: cancelled by the operator while in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Success,
    Failed,
    Partial,
    Skipped,
    Manual,
    Simulated,
    Interrupted,
}

impl LedgerStatus {
    pub const ALL: [LedgerStatus; 7] = [
        LedgerStatus::Success,
        LedgerStatus::Failed,
        LedgerStatus::Partial,
        LedgerStatus::Skipped,
        LedgerStatus::Manual,
        LedgerStatus::Simulated,
        LedgerStatus::Interrupted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LedgerStatus::Success => "success",
            LedgerStatus::Failed => "failed",
            LedgerStatus::Partial => "partial",
            LedgerStatus::Skipped => "skipped",
            LedgerStatus::Manual => "manual",
            LedgerStatus::Simulated => "simulated",
            LedgerStatus::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal record for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub task_id: TaskId,
    pub source_kind: SourceKind,
    pub status: LedgerStatus,
    pub message: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<ExecutionAttempt>,

    pub total_duration_ms: u64,
    pub recorded_at: DateTime<Utc>,

    /// Build strategy selected for source repositories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,

    /// Linked executable, documentation viewer, or manual helper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl LedgerEntry {
    pub fn last_attempt(&self) -> Option<&ExecutionAttempt> {
        self.attempts.last()
    }
}
