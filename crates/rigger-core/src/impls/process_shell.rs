//! `ShellExecutor` backed by real child processes.
//!
//! Each command runs in its own process group so a timeout or cancellation
//! takes down everything the installer forked, not just the direct child.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ports::{CommandSpec, ExitClass, ShellError, ShellExecutor, ShellOutput, TaskLog};

/// How long to wait for the output pipes to close after the child is gone.
const READER_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct ProcessShell;

impl ProcessShell {
    pub fn new() -> Self {
        Self
    }
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl ShellExecutor for ProcessShell {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        log: &TaskLog,
        cancel: &CancellationToken,
    ) -> Result<ShellOutput, ShellError> {
        log.append(&format!("$ {command}\n")).await?;

        if cancel.is_cancelled() {
            log.append("[not started: run cancelled]\n").await?;
            return Ok(ShellOutput::new(ExitClass::Cancelled, ""));
        }

        let mut cmd = Command::new(command.program());
        cmd.args(command.arg_list())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = command.working_dir() {
            cmd.current_dir(dir);
        }
        for (key, value) in command.env_vars() {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ShellError::Spawn {
            program: command.program().to_string(),
            source,
        })?;
        let pid = child.id();
        debug!(pid, command = %command, "spawned");

        let readers = [
            child.stdout.take().map(|out| tokio::spawn(drain(out))),
            child.stderr.take().map(|err| tokio::spawn(drain(err))),
        ];

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = tokio::time::sleep(timeout) => Waited::TimedOut,
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        let exit = match waited {
            Waited::Exited(Ok(status)) => classify(status),
            Waited::Exited(Err(err)) => {
                warn!(command = %command, error = %err, "wait on child failed");
                ExitClass::Failed { code: None }
            }
            Waited::TimedOut => {
                kill_tree(&mut child, pid).await;
                ExitClass::TimedOut
            }
            Waited::Cancelled => {
                kill_tree(&mut child, pid).await;
                ExitClass::Cancelled
            }
        };

        let mut output = String::new();
        for reader in readers.into_iter().flatten() {
            let abort = reader.abort_handle();
            match tokio::time::timeout(READER_GRACE, reader).await {
                Ok(Ok(bytes)) => output.push_str(&String::from_utf8_lossy(&bytes)),
                Ok(Err(err)) => debug!(error = %err, "output reader failed"),
                Err(_) => abort.abort(),
            }
        }

        log.append(&output).await?;
        if !output.is_empty() && !output.ends_with('\n') {
            log.append("\n").await?;
        }
        log.append(&format!("[{exit}]\n")).await?;

        Ok(ShellOutput::new(exit, output))
    }
}

fn classify(status: ExitStatus) -> ExitClass {
    if status.success() {
        ExitClass::Ok
    } else {
        ExitClass::Failed {
            code: status.code(),
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(err) = reader.read_to_end(&mut buf).await {
        debug!(error = %err, "output pipe closed with error");
    }
    buf
}

/// SIGKILL the child's process group, then reap the child itself.
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            debug!(pid, error = %err, "killpg failed");
        }
    }
    if let Err(err) = child.kill().await {
        debug!(?pid, error = %err, "kill failed");
    }
}
