//! System package adapter (apt/dpkg).

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::app::TaskContext;
use crate::domain::{SourceKind, TaskSpec};
use crate::ports::{AdapterError, CommandSpec, ExitClass, InstallReport, SourceAdapter};

const INSTALLED_MARKER: &str = "install ok installed";

#[derive(Debug, Clone)]
pub struct AptAdapter {
    /// Directory whose mtime tells when the package index was last refreshed.
    lists_dir: PathBuf,
}

impl Default for AptAdapter {
    fn default() -> Self {
        Self::new("/var/lib/apt/lists")
    }
}

impl AptAdapter {
    pub fn new(lists_dir: impl Into<PathBuf>) -> Self {
        Self {
            lists_dir: lists_dir.into(),
        }
    }

    fn apt_get() -> CommandSpec {
        CommandSpec::new("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
    }

    async fn package_installed(&self, package: &str, ctx: &TaskContext<'_>) -> bool {
        let query = CommandSpec::new("dpkg-query").args(["-W", "-f=${Status}", package]);
        match ctx.exec(&query).await {
            Ok(out) => out.ok() && out.output.contains(INSTALLED_MARKER),
            Err(err) => {
                debug!(package, error = %err, "dpkg-query failed");
                false
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for AptAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::SystemPackage
    }

    async fn is_satisfied(&self, task: &TaskSpec, ctx: &TaskContext<'_>) -> bool {
        self.package_installed(task.package(), ctx).await
    }

    async fn install(
        &self,
        task: &TaskSpec,
        ctx: &TaskContext<'_>,
    ) -> Result<InstallReport, AdapterError> {
        for conflict in &task.params.conflicts {
            if !self.package_installed(conflict, ctx).await {
                continue;
            }
            info!(task = %task.id, package = %conflict, "removing conflicting package");
            let out = ctx
                .exec(&Self::apt_get().args(["remove", "-y"]).arg(conflict))
                .await?;
            match out.exit {
                ExitClass::Ok => {}
                ExitClass::Cancelled => return Ok(InstallReport::from_shell("apt-get remove", &out)),
                exit => {
                    return Err(AdapterError::ConflictRemoval {
                        package: conflict.clone(),
                        exit,
                    });
                }
            }
        }

        let install = Self::apt_get()
            .args(["install", "-y", "--no-install-recommends"])
            .args(task.params.extra_args.iter().cloned())
            .arg(task.package());
        let out = ctx.exec(&install).await?;
        Ok(InstallReport::from_shell("apt-get install", &out))
    }

    async fn repair(&self, task: &TaskSpec, ctx: &TaskContext<'_>) -> bool {
        info!(task = %task.id, "repairing package database");
        let configure = CommandSpec::new("dpkg")
            .args(["--configure", "-a"])
            .env("DEBIAN_FRONTEND", "noninteractive");
        let fix = Self::apt_get().args(["-f", "install", "-y"]);
        for step in [configure, fix] {
            if let Err(err) = ctx.exec(&step).await {
                debug!(task = %task.id, error = %err, "repair step failed");
                return false;
            }
        }
        true
    }

    fn max_parallel(&self) -> Option<usize> {
        // dpkg holds a database-wide lock per install.
        Some(1)
    }

    fn needs_index_refresh(&self) -> bool {
        true
    }

    async fn index_refreshed_at(&self) -> Option<DateTime<Utc>> {
        let meta = tokio::fs::metadata(&self.lists_dir).await.ok()?;
        meta.modified().ok().map(DateTime::<Utc>::from)
    }

    async fn refresh_index(&self, ctx: &TaskContext<'_>) -> Result<(), AdapterError> {
        let out = ctx.exec(&Self::apt_get().arg("update")).await?;
        if out.ok() {
            Ok(())
        } else {
            Err(AdapterError::Step {
                step: "apt-get update".to_string(),
                exit: out.exit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{FakeShell, run_context, settings_in};

    const QUERY: &str = "dpkg-query -W -f=${Status}";

    #[tokio::test]
    async fn satisfied_when_dpkg_reports_installed() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(FakeShell::new().on(
            &format!("{QUERY} nmap"),
            ExitClass::Ok,
            "install ok installed",
        ));
        let run = run_context(settings_in(dir.path()), shell);
        let adapter = AptAdapter::default();

        let nmap = TaskSpec::system_package("nmap");
        let hydra = TaskSpec::system_package("hydra");
        assert!(adapter.is_satisfied(&nmap, &run.task_context(&nmap)).await);
        assert!(!adapter.is_satisfied(&hydra, &run.task_context(&hydra)).await);
    }

    #[tokio::test]
    async fn conflicts_are_removed_before_install() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(
            FakeShell::new()
                .on(&format!("{QUERY} ncat"), ExitClass::Ok, "install ok installed")
                .on(&format!("{QUERY} netcat"), ExitClass::Failed { code: Some(1) }, ""),
        );
        let run = run_context(settings_in(dir.path()), shell.clone());
        let task = TaskSpec::system_package("netcat-openbsd").with_conflicts(["ncat", "netcat"]);

        let report = AptAdapter::default()
            .install(&task, &run.task_context(&task))
            .await
            .unwrap();

        assert_eq!(report.exit, ExitClass::Ok);
        let calls = shell.calls();
        let remove = calls.iter().position(|c| c == "apt-get remove -y ncat").unwrap();
        let install = calls
            .iter()
            .position(|c| c == "apt-get install -y --no-install-recommends netcat-openbsd")
            .unwrap();
        assert!(remove < install);
        assert_eq!(shell.count("apt-get remove -y netcat"), 0);
    }

    #[tokio::test]
    async fn failed_conflict_removal_aborts_the_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(
            FakeShell::new()
                .on(&format!("{QUERY} ncat"), ExitClass::Ok, "install ok installed")
                .on("apt-get remove", ExitClass::Failed { code: Some(100) }, "locked"),
        );
        let run = run_context(settings_in(dir.path()), shell.clone());
        let task = TaskSpec::system_package("netcat-openbsd").with_conflicts(["ncat"]);

        let err = AptAdapter::default()
            .install(&task, &run.task_context(&task))
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::ConflictRemoval { ref package, .. } if package == "ncat"));
        assert_eq!(shell.count("apt-get install"), 0);
    }

    #[tokio::test]
    async fn refresh_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(FakeShell::new().on(
            "apt-get update",
            ExitClass::TimedOut,
            "",
        ));
        let run = run_context(settings_in(dir.path()), shell);
        let ctx = run.step_context("index-refresh", std::time::Duration::from_secs(1));

        assert!(AptAdapter::default().refresh_index(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn index_timestamp_comes_from_lists_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AptAdapter::new(dir.path()).index_refreshed_at().await.is_some());
        assert!(
            AptAdapter::new(dir.path().join("missing"))
                .index_refreshed_at()
                .await
                .is_none()
        );
    }
}
