use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{SourceKind, TaskId};

/// Errors surfaced to the caller of the engine. Per-task failures never show
/// up here; they end in the ledger.
#[derive(Debug, Error)]
pub enum RiggerError {
    #[error("duplicate task id '{0}' in run")]
    DuplicateTask(TaskId),

    #[error("duplicate adapter for source kind {0}")]
    DuplicateAdapter(SourceKind),

    #[error("no adapter registered for source kinds: {0:?}")]
    MissingAdapters(Vec<SourceKind>),

    #[error("ledger already holds an entry for '{0}'")]
    LedgerConflict(TaskId),

    #[error("cannot access {path}: {source}")]
    RunFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid run file: {0}")]
    Json(#[from] serde_json::Error),
}
