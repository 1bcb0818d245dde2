//! End-of-run report, built from a ledger snapshot once all workers drained.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{LedgerStatus, RunId, TaskId};
use crate::ledger::LedgerSnapshot;
use crate::observability::StatusCounts;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualItem {
    pub task_id: TaskId,
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    pub task_id: TaskId,
    pub message: String,
    pub log_ref: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialItem {
    pub task_id: TaskId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Tasks handed to the scheduler.
    pub total_tasks: usize,
    pub counts: StatusCounts,
    pub manual: Vec<ManualItem>,
    pub failed: Vec<FailedItem>,
    pub partial: Vec<PartialItem>,
    pub interrupted: Vec<TaskId>,
    /// Scheduled but never admitted (run cancelled first).
    pub not_attempted: Vec<TaskId>,
}

impl Report {
    pub fn build(
        run_id: RunId,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        snapshot: &LedgerSnapshot,
        scheduled: &[TaskId],
    ) -> Self {
        let manual = snapshot
            .with_status(LedgerStatus::Manual)
            .map(|entry| ManualItem {
                task_id: entry.task_id.clone(),
                artifact: entry.artifact.clone(),
            })
            .collect();
        let failed = snapshot
            .with_status(LedgerStatus::Failed)
            .map(|entry| FailedItem {
                task_id: entry.task_id.clone(),
                message: entry.message.clone(),
                log_ref: entry.last_attempt().and_then(|attempt| attempt.log_ref.clone()),
            })
            .collect();
        let partial = snapshot
            .with_status(LedgerStatus::Partial)
            .map(|entry| PartialItem {
                task_id: entry.task_id.clone(),
                message: entry.message.clone(),
            })
            .collect();
        let interrupted = snapshot
            .with_status(LedgerStatus::Interrupted)
            .map(|entry| entry.task_id.clone())
            .collect();
        let not_attempted = scheduled
            .iter()
            .filter(|id| snapshot.get(id.as_str()).is_none())
            .cloned()
            .collect();

        Self {
            run_id,
            started_at,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            total_tasks: scheduled.len(),
            counts: snapshot.counts(),
            manual,
            failed,
            partial,
            interrupted,
            not_attempted,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

fn human_duration(ms: u64) -> String {
    let secs = ms / 1000;
    match secs {
        0 => format!("{ms}ms"),
        1..60 => format!("{}.{}s", secs, (ms % 1000) / 100),
        60..3600 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter().map(TaskId::as_str).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} finished: {} task(s) in {}",
            self.run_id,
            self.total_tasks,
            human_duration(self.elapsed_ms)
        )?;
        let counts = LedgerStatus::ALL
            .iter()
            .map(|status| format!("{status} {}", self.counts.get(*status)))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(f, "  {counts}")?;

        if !self.manual.is_empty() {
            writeln!(f, "\nManual steps required:")?;
            for item in &self.manual {
                match &item.artifact {
                    Some(path) => writeln!(f, "  - {}: {}", item.task_id, path.display())?,
                    None => writeln!(f, "  - {}: no helper generated", item.task_id)?,
                }
            }
        }

        if !self.failed.is_empty() {
            writeln!(f, "\nFailed:")?;
            for item in &self.failed {
                write!(f, "  - {}: {}", item.task_id, item.message)?;
                if let Some(log) = &item.log_ref {
                    write!(f, " (log: {})", log.display())?;
                }
                writeln!(f)?;
            }
        }

        if !self.partial.is_empty() {
            writeln!(f, "\nPartial:")?;
            for item in &self.partial {
                writeln!(f, "  - {}: {}", item.task_id, item.message)?;
            }
        }

        if !self.interrupted.is_empty() {
            writeln!(f, "\nInterrupted: {}", join_ids(&self.interrupted))?;
        }
        if !self.not_attempted.is_empty() {
            writeln!(f, "Not attempted: {}", join_ids(&self.not_attempted))?;
        }
        Ok(())
    }
}
