//! rigger-core
//!
//! Installation orchestration engine: a bounded worker pool drains a list of
//! install tasks, each idempotent, retried with backoff and admitted through
//! a host resource gate, with every outcome recorded in a ledger.
//!
//! # Modules
//! - **domain**: task specs, run settings, ids, attempts, ledger entries
//! - **ports**: seams to the outside world (shell, adapters, probe, hooks)
//! - **impls**: concrete ports (apt, pipx, git, `/proc` probe, process shell)
//! - **app**: run wiring (builder, scheduler, per-task pipeline, index barrier)
//! - **queue**: per-kind lanes and the retry state machine
//! - **ledger** / **report**: outcome records and the end-of-run summary

pub mod app;
pub mod detect;
pub mod domain;
pub mod error;
pub mod executor;
pub mod gate;
pub mod impls;
pub mod ledger;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod registry;
pub mod report;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{Orchestrator, RunBuilder, RunOutcome};
pub use domain::{LedgerEntry, LedgerStatus, RunFile, RunSettings, SourceKind, TaskId, TaskSpec};
pub use error::RiggerError;
pub use impls::{AptAdapter, GitAdapter, PipxAdapter};
pub use ledger::LedgerSnapshot;
pub use report::Report;
