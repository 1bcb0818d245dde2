//! Shell executor port: run one external command under a deadline.
//!
//! Implementations must:
//! - kill the whole process group on timeout or cancellation,
//! - append everything the command printed to the task's log, never
//!   discarding it, and
//! - classify the exit into `ExitClass`.
//!
//! Callers treat `TimedOut` as "unknown", not "failed": some installers
//! finish their side effect after the supervisor gave up, so the idempotency
//! predicate is re-checked before a timeout counts against the task.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::domain::TaskId;

/// A command to run: program, arguments, working directory, environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit classification of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Ok,
    TimedOut,
    /// Non-zero exit; `code` is `None` when killed by a signal.
    Failed { code: Option<i32> },
    Cancelled,
}

impl fmt::Display for ExitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitClass::Ok => f.write_str("ok"),
            ExitClass::TimedOut => f.write_str("timed out"),
            ExitClass::Failed { code: Some(code) } => write!(f, "exit code {code}"),
            ExitClass::Failed { code: None } => f.write_str("killed by signal"),
            ExitClass::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit: ExitClass,
    /// Combined stdout + stderr.
    pub output: String,
}

impl ShellOutput {
    pub fn new(exit: ExitClass, output: impl Into<String>) -> Self {
        Self {
            exit,
            output: output.into(),
        }
    }

    pub fn ok(&self) -> bool {
        self.exit == ExitClass::Ok
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot write task log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Append-only log artifact for one task (or one run-level step such as the
/// index refresh).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLog {
    path: PathBuf,
}

impl TaskLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<log_dir>/<task-id>.log`
    pub fn for_task(log_dir: &Path, task_id: &TaskId) -> Self {
        Self::new(log_dir.join(format!("{task_id}.log")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `text`, creating the file and its directory on first use.
    pub async fn append(&self, text: &str) -> Result<(), ShellError> {
        self.append_inner(text).await.map_err(|source| ShellError::Log {
            path: self.path.clone(),
            source,
        })
    }

    async fn append_inner(&self, text: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }
}

/// Runs a command with a deadline, honouring the run's cancellation signal.
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        log: &TaskLog,
        cancel: &CancellationToken,
    ) -> Result<ShellOutput, ShellError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_display_joins_args() {
        let cmd = CommandSpec::new("apt-get")
            .args(["install", "-y"])
            .arg("nmap")
            .env("DEBIAN_FRONTEND", "noninteractive");
        assert_eq!(cmd.to_string(), "apt-get install -y nmap");
        assert_eq!(cmd.env_vars().len(), 1);
    }

    #[tokio::test]
    async fn task_log_appends_and_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog::for_task(&dir.path().join("logs"), &TaskId::new("nmap"));

        log.append("first\n").await.unwrap();
        log.append("second\n").await.unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text, "first\nsecond\n");
        assert!(log.path().ends_with("logs/nmap.log"));
    }
}
