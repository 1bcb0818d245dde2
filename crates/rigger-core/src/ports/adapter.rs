//! Package source adapter port.
//!
//! One adapter per `SourceKind`. Adapters own every vendor-specific command;
//! the engine only sees "is it satisfied?", "install it", and a handful of
//! optional hooks (repair, index refresh, update in place).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::shell::{ExitClass, ShellError, ShellOutput};
use crate::app::TaskContext;
use crate::domain::{SourceKind, Strategy, TaskSpec};

/// What an install produced that the orchestrator still has to integrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Installed somewhere the installer manages; nothing to link.
    Installed,
    /// Executable to expose in the shared bin directory as `name`.
    Executable { name: String, path: PathBuf },
    /// The build step succeeded but no executable could be located.
    MissingExecutable,
    /// Only documentation was found; expose a viewer for `readme`.
    Documentation { readme: PathBuf },
    /// Nothing recognisable in the checkout.
    Undetermined,
    /// The fetch completed but a later step did not finish (e.g. killed by
    /// the deadline); only meaningful when a re-check confirms the target.
    Unfinished,
}

/// Result of one `install` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub exit: ExitClass,
    pub detail: Option<String>,
    pub strategy: Option<Strategy>,
    pub delivery: Delivery,
}

impl InstallReport {
    pub fn installed() -> Self {
        Self {
            exit: ExitClass::Ok,
            detail: None,
            strategy: None,
            delivery: Delivery::Installed,
        }
    }

    /// Report for a single command; non-ok exits carry `step` and the exit
    /// class as detail.
    pub fn from_shell(step: &str, output: &ShellOutput) -> Self {
        let detail = (!output.ok()).then(|| format!("{step}: {}", output.exit));
        Self {
            exit: output.exit,
            detail,
            strategy: None,
            delivery: Delivery::Installed,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }
}

/// Adapter-level failure. Aborts the current attempt of the owning task and
/// nothing else.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error("failed to remove conflicting package '{package}': {exit}")]
    ConflictRemoval { package: String, exit: ExitClass },

    #[error("{step}: {exit}")]
    Step { step: String, exit: ExitClass },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl AdapterError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Idempotency predicate: is the task's target already in place?
    /// Probe failures count as "not satisfied".
    async fn is_satisfied(&self, task: &TaskSpec, ctx: &TaskContext<'_>) -> bool;

    /// One install attempt.
    async fn install(
        &self,
        task: &TaskSpec,
        ctx: &TaskContext<'_>,
    ) -> Result<InstallReport, AdapterError>;

    /// Build strategy for a checkout. Only source repositories have one.
    fn detect_strategy(&self, _checkout: &Path) -> Option<Strategy> {
        None
    }

    /// Try to fix broken dependency state after a failed attempt.
    /// Returns whether a repair ran (and a re-check is worthwhile).
    async fn repair(&self, _task: &TaskSpec, _ctx: &TaskContext<'_>) -> bool {
        false
    }

    /// Refresh an already-satisfied target without a full install
    /// (e.g. fast-forward a checkout). The note ends up in the ledger message.
    async fn update_in_place(&self, _task: &TaskSpec, _ctx: &TaskContext<'_>) -> Option<String> {
        None
    }

    /// Cap on concurrent tasks of this kind (`None` = pool-bound only).
    fn max_parallel(&self) -> Option<usize> {
        None
    }

    /// Whether this source has an index that must be fresh before the first
    /// install of a run.
    fn needs_index_refresh(&self) -> bool {
        false
    }

    async fn index_refreshed_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    async fn refresh_index(&self, _ctx: &TaskContext<'_>) -> Result<(), AdapterError> {
        Ok(())
    }
}
