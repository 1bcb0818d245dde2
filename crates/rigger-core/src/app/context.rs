//! Run-scoped state threaded through the scheduler, pipeline and adapters.
//!
//! There is no process-global mutable state: everything a task needs (the
//! settings, the shell, the cancellation signal, its log) comes from here.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::{RunId, RunSettings, TaskSpec};
use crate::ports::{CommandSpec, ShellError, ShellExecutor, ShellOutput, TaskLog};

pub struct RunContext {
    run_id: RunId,
    settings: RunSettings,
    shell: Arc<dyn ShellExecutor>,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(
        settings: RunSettings,
        shell: Arc<dyn ShellExecutor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id: RunId::generate(),
            settings,
            shell,
            cancel,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Context for one task: its own log file and its command deadline.
    pub fn task_context(&self, task: &TaskSpec) -> TaskContext<'_> {
        TaskContext {
            run: self,
            log: TaskLog::for_task(&self.settings.log_dir, &task.id),
            timeout: self.settings.timeout_for(task),
        }
    }

    /// Context for a run-level step that is not a task (e.g. an index
    /// refresh), logging to `<log_dir>/<name>.log`.
    pub fn step_context(&self, name: &str, timeout: Duration) -> TaskContext<'_> {
        TaskContext {
            run: self,
            log: TaskLog::new(self.settings.log_dir.join(format!("{name}.log"))),
            timeout,
        }
    }
}

/// What an adapter sees while working on one task.
pub struct TaskContext<'a> {
    run: &'a RunContext,
    log: TaskLog,
    timeout: Duration,
}

impl<'a> TaskContext<'a> {
    /// Run one command under this context's deadline, log and cancellation.
    pub async fn exec(&self, command: &CommandSpec) -> Result<ShellOutput, ShellError> {
        self.run
            .shell
            .run(command, self.timeout, &self.log, &self.run.cancel)
            .await
    }

    pub fn run_context(&self) -> &'a RunContext {
        self.run
    }

    pub fn settings(&self) -> &'a RunSettings {
        &self.run.settings
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn is_cancelled(&self) -> bool {
        self.run.is_cancelled()
    }
}
