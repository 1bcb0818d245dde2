//! Domain model: ids, specs, attempts, ledger entries, strategies.

pub mod attempt;
pub mod ids;
pub mod outcome;
pub mod resource;
pub mod spec;
pub mod strategy;

pub use attempt::{AttemptOutcome, ExecutionAttempt};
pub use ids::{AttemptId, RunId, TaskId};
pub use outcome::{LedgerEntry, LedgerStatus};
pub use resource::{ResourceLimits, ResourceSample};
pub use spec::{RunFile, RunSettings, SourceKind, TaskParams, TaskSpec};
pub use strategy::{Strategy, Toolchain};
