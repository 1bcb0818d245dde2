use std::sync::Arc;

use super::TaskQueue;
use crate::domain::TaskSpec;

/// A task handed to one worker. The worker owns the task until the lease is
/// dropped, which frees the slot in the task's lane.
pub struct QueueLease {
    task: TaskSpec,
    queue: Arc<TaskQueue>,
}

impl QueueLease {
    pub(crate) fn new(task: TaskSpec, queue: Arc<TaskQueue>) -> Self {
        Self { task, queue }
    }

    pub fn task(&self) -> &TaskSpec {
        &self.task
    }
}

impl Drop for QueueLease {
    fn drop(&mut self) {
        self.queue.release(self.task.source_kind);
    }
}
