//! Admission queue: one FIFO lane per source kind.
//!
//! Within a lane tasks are handed out in insertion order. Lanes are visited
//! round-robin, so no kind starves another. A lane with a parallelism limit
//! is skipped while that many of its tasks are leased.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::QueueLease;
use crate::domain::{SourceKind, TaskSpec};

#[derive(Debug, Default)]
struct Lane {
    pending: VecDeque<TaskSpec>,
    in_flight: usize,
    limit: Option<usize>,
}

impl Lane {
    fn has_room(&self) -> bool {
        self.limit.is_none_or(|limit| self.in_flight < limit)
    }
}

#[derive(Debug, Default)]
struct Lanes {
    lanes: [Lane; SourceKind::ALL.len()],
    /// Lane to look at first on the next lease.
    cursor: usize,
}

enum Take {
    Leased(TaskSpec),
    /// Work is pending but every non-empty lane is at its limit.
    Blocked,
    /// Nothing left to hand out.
    Drained,
}

impl Lanes {
    fn take(&mut self) -> Take {
        if self.lanes.iter().all(|lane| lane.pending.is_empty()) {
            return Take::Drained;
        }
        let count = self.lanes.len();
        for offset in 0..count {
            let idx = (self.cursor + offset) % count;
            let lane = &mut self.lanes[idx];
            if !lane.has_room() {
                continue;
            }
            if let Some(task) = lane.pending.pop_front() {
                lane.in_flight += 1;
                self.cursor = (idx + 1) % count;
                return Take::Leased(task);
            }
        }
        Take::Blocked
    }
}

pub struct TaskQueue {
    state: Mutex<Lanes>,
    notify: Notify,
}

impl TaskQueue {
    /// `limits` caps concurrent leases per kind; a limit of 0 is read as 1.
    pub fn new<I>(tasks: impl IntoIterator<Item = TaskSpec>, limits: I) -> Self
    where
        I: IntoIterator<Item = (SourceKind, usize)>,
    {
        let mut state = Lanes::default();
        for (kind, limit) in limits {
            state.lanes[kind.index()].limit = Some(limit.max(1));
        }
        for task in tasks {
            state.lanes[task.source_kind.index()].pending.push_back(task);
        }
        Self {
            state: Mutex::new(state),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lanes> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease the next admissible task.
    ///
    /// Waits while every pending lane is at its limit. Returns `None` once
    /// the queue is drained or the run is cancelled.
    pub async fn lease(self: &Arc<Self>, cancel: &CancellationToken) -> Option<QueueLease> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            // Register interest before looking, so a release between the
            // check and the wait is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.lock().take() {
                Take::Leased(task) => return Some(QueueLease::new(task, Arc::clone(self))),
                Take::Drained => return None,
                Take::Blocked => {}
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    pub(crate) fn release(&self, kind: SourceKind) {
        {
            let mut state = self.lock();
            let lane = &mut state.lanes[kind.index()];
            lane.in_flight = lane.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    /// Tasks not yet handed out.
    pub fn pending(&self) -> usize {
        self.lock().lanes.iter().map(|lane| lane.pending.len()).sum()
    }
}
