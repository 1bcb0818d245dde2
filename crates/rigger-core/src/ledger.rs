//! Outcome ledger.
//!
//! The index (which ids exist, in admission order) sits behind one
//! read-mostly lock that is only written on admission. Each entry has its own
//! mutex, so workers updating different tasks never contend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::{
    ExecutionAttempt, LedgerEntry, LedgerStatus, SourceKind, Strategy, TaskId, TaskSpec,
};
use crate::error::RiggerError;
use crate::observability::StatusCounts;

#[derive(Debug)]
struct Draft {
    source_kind: SourceKind,
    attempts: Vec<ExecutionAttempt>,
    strategy: Option<Strategy>,
    artifact: Option<PathBuf>,
}

#[derive(Debug)]
enum Slot {
    Open(Draft),
    Final(LedgerEntry),
}

type SharedSlot = Arc<Mutex<Slot>>;

fn lock(slot: &SharedSlot) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Index {
    order: Vec<TaskId>,
    slots: HashMap<TaskId, SharedSlot>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    index: RwLock<Index>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the entry for a task that is about to execute. The returned
    /// handle is the only writer for that entry.
    pub fn admit(&self, task: &TaskSpec) -> Result<EntryHandle, RiggerError> {
        let slot = Arc::new(Mutex::new(Slot::Open(Draft {
            source_kind: task.source_kind,
            attempts: Vec::new(),
            strategy: None,
            artifact: None,
        })));
        self.insert(&task.id, Arc::clone(&slot))?;
        Ok(EntryHandle {
            task_id: task.id.clone(),
            slot,
            admitted: Instant::now(),
        })
    }

    /// Record a finished entry in one step.
    pub fn record(&self, entry: LedgerEntry) -> Result<(), RiggerError> {
        let id = entry.task_id.clone();
        self.insert(&id, Arc::new(Mutex::new(Slot::Final(entry))))
    }

    fn insert(&self, id: &TaskId, slot: SharedSlot) -> Result<(), RiggerError> {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        if index.slots.contains_key(id) {
            return Err(RiggerError::LedgerConflict(id.clone()));
        }
        index.order.push(id.clone());
        index.slots.insert(id.clone(), slot);
        Ok(())
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        index.slots.contains_key(id)
    }

    /// Immutable copy of every finalized entry, in admission order. Entries
    /// still being worked on are left out.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let slots: Vec<SharedSlot> = {
            let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
            index
                .order
                .iter()
                .filter_map(|id| index.slots.get(id).cloned())
                .collect()
        };
        let entries = slots
            .iter()
            .filter_map(|slot| match &*lock(slot) {
                Slot::Final(entry) => Some(entry.clone()),
                Slot::Open(_) => None,
            })
            .collect();
        LedgerSnapshot { entries }
    }
}

/// Write access to one open ledger entry.
pub struct EntryHandle {
    task_id: TaskId,
    slot: SharedSlot,
    admitted: Instant,
}

impl EntryHandle {
    fn with_draft(&self, update: impl FnOnce(&mut Draft)) {
        if let Slot::Open(draft) = &mut *lock(&self.slot) {
            update(draft);
        }
    }

    pub fn push_attempts(&self, attempts: impl IntoIterator<Item = ExecutionAttempt>) {
        self.with_draft(|draft| draft.attempts.extend(attempts));
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        self.with_draft(|draft| draft.strategy = Some(strategy));
    }

    pub fn set_artifact(&self, artifact: PathBuf) {
        self.with_draft(|draft| draft.artifact = Some(artifact));
    }

    /// Close the entry. Consumes the handle, so it happens exactly once.
    pub fn finalize(self, status: LedgerStatus, message: impl Into<String>) -> LedgerEntry {
        let mut slot = lock(&self.slot);
        let entry = match &mut *slot {
            Slot::Open(draft) => LedgerEntry {
                task_id: self.task_id.clone(),
                source_kind: draft.source_kind,
                status,
                message: message.into(),
                attempts: std::mem::take(&mut draft.attempts),
                total_duration_ms: u64::try_from(self.admitted.elapsed().as_millis())
                    .unwrap_or(u64::MAX),
                recorded_at: Utc::now(),
                strategy: draft.strategy.take(),
                artifact: draft.artifact.take(),
            },
            Slot::Final(entry) => return entry.clone(),
        };
        *slot = Slot::Final(entry.clone());
        entry
    }
}

/// Read-only copy of the ledger, consumed by reporting and JSON export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub entries: Vec<LedgerEntry>,
}

impl LedgerSnapshot {
    pub fn get(&self, id: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|entry| entry.task_id.as_str() == id)
    }

    pub fn with_status(&self, status: LedgerStatus) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |entry| entry.status == status)
    }

    pub fn counts(&self) -> StatusCounts {
        self.entries.iter().map(|entry| entry.status).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
