//! Isolated application adapter (pipx).

use std::ffi::OsString;

use async_trait::async_trait;

use crate::app::TaskContext;
use crate::detect::is_executable;
use crate::domain::{SourceKind, TaskSpec};
use crate::ports::{AdapterError, CommandSpec, InstallReport, SourceAdapter};

#[derive(Debug, Clone, Default)]
pub struct PipxAdapter {
    /// Search path for the executable fallback; `None` reads `PATH`.
    search_path: Option<OsString>,
}

impl PipxAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    fn on_search_path(&self, name: &str) -> bool {
        let Some(paths) = self.search_path.clone().or_else(|| std::env::var_os("PATH")) else {
            return false;
        };
        std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(name)))
    }
}

#[async_trait]
impl SourceAdapter for PipxAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::IsolatedApp
    }

    async fn is_satisfied(&self, task: &TaskSpec, ctx: &TaskContext<'_>) -> bool {
        let list = CommandSpec::new("pipx").args(["list", "--short"]);
        if let Ok(out) = ctx.exec(&list).await
            && out.ok()
            && out
                .output
                .lines()
                .any(|line| line.split_whitespace().next() == Some(task.package()))
        {
            return true;
        }
        self.on_search_path(&task.target)
    }

    async fn install(
        &self,
        task: &TaskSpec,
        ctx: &TaskContext<'_>,
    ) -> Result<InstallReport, AdapterError> {
        let mut install = CommandSpec::new("pipx").arg("install");
        if ctx.settings().force_reinstall {
            install = install.arg("--force");
        }
        let install = install
            .args(task.params.extra_args.iter().cloned())
            .arg(task.package());
        let out = ctx.exec(&install).await?;
        Ok(InstallReport::from_shell("pipx install", &out))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    use super::*;
    use crate::ports::ExitClass;
    use crate::testing::{FakeShell, run_context, settings_in};

    #[tokio::test]
    async fn satisfied_from_managed_list() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(FakeShell::new().on(
            "pipx list --short",
            ExitClass::Ok,
            "impacket 0.12.0\nsqlmap 1.8\n",
        ));
        let run = run_context(settings_in(dir.path()), shell);
        let adapter = PipxAdapter::new().with_search_path(dir.path());

        let sqlmap = TaskSpec::isolated_app("sqlmap");
        let crackmapexec = TaskSpec::isolated_app("crackmapexec");
        assert!(adapter.is_satisfied(&sqlmap, &run.task_context(&sqlmap)).await);
        assert!(
            !adapter
                .is_satisfied(&crackmapexec, &run.task_context(&crackmapexec))
                .await
        );
    }

    #[tokio::test]
    async fn falls_back_to_executable_on_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("path-bin");
        std::fs::create_dir_all(&bin).unwrap();
        let exe = bin.join("nxc");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(bin.join("notes"), "plain file").unwrap();

        let shell = Arc::new(FakeShell::new().on("pipx list", ExitClass::Failed { code: Some(1) }, ""));
        let run = run_context(settings_in(dir.path()), shell);
        let adapter = PipxAdapter::new().with_search_path(&bin);

        let nxc = TaskSpec::isolated_app("nxc");
        let notes = TaskSpec::isolated_app("notes");
        assert!(adapter.is_satisfied(&nxc, &run.task_context(&nxc)).await);
        assert!(!adapter.is_satisfied(&notes, &run.task_context(&notes)).await);
    }

    #[tokio::test]
    async fn install_uses_package_override() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(FakeShell::new());
        let run = run_context(settings_in(dir.path()), shell.clone());
        let mut task = TaskSpec::isolated_app("secretsdump.py");
        task.params.package = Some("impacket".to_string());

        let report = PipxAdapter::new()
            .install(&task, &run.task_context(&task))
            .await
            .unwrap();

        assert_eq!(report.exit, ExitClass::Ok);
        assert_eq!(shell.calls(), vec!["pipx install impacket"]);
    }
}
