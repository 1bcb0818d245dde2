//! Source repository adapter (git checkout + inferred build).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::app::TaskContext;
use crate::detect::{RepoLayout, detect, find_new_executable, snapshot_executables};
use crate::domain::{RunSettings, SourceKind, Strategy, TaskSpec, Toolchain};
use crate::ports::{
    AdapterError, CommandSpec, Delivery, ExitClass, InstallReport, ShellOutput, SourceAdapter,
};

#[derive(Debug, Clone, Default)]
pub struct GitAdapter;

impl GitAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn checkout_dir(settings: &RunSettings, task: &TaskSpec) -> PathBuf {
        settings.checkout_root.join(task.id.as_str())
    }

    fn git_in(dir: &Path) -> CommandSpec {
        CommandSpec::new("git").arg("-C").arg(dir.to_string_lossy())
    }

    async fn fetch(
        &self,
        task: &TaskSpec,
        dir: &Path,
        ctx: &TaskContext<'_>,
    ) -> Result<(&'static str, ShellOutput), AdapterError> {
        if dir.join(".git").is_dir() {
            let out = ctx.exec(&Self::git_in(dir).args(["pull", "--ff-only"])).await?;
            return Ok(("git pull", out));
        }

        if let Some(parent) = dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| AdapterError::io(format!("create {}", parent.display()), err))?;
        }
        let mut clone = CommandSpec::new("git").args(["clone", "--depth", "1"]);
        if let Some(git_ref) = &task.params.git_ref {
            clone = clone.args(["--branch", git_ref.as_str()]);
        }
        let clone = clone
            .args(task.params.extra_args.iter().cloned())
            .arg(task.target.as_str())
            .arg(dir.to_string_lossy());
        Ok(("git clone", ctx.exec(&clone).await?))
    }
}

/// Commands for a strategy, run in order inside the checkout.
fn build_steps(strategy: &Strategy, dir: &Path) -> Vec<(&'static str, CommandSpec)> {
    let pip = || CommandSpec::new("python3").args(["-m", "pip", "install"]).cwd(dir);
    match strategy {
        Strategy::PackagedLibrary { .. } => vec![("pip install", pip().arg("."))],
        Strategy::DependencyManifest { manifest, .. } => {
            vec![("pip install -r", pip().arg("-r").arg(manifest.as_str()))]
        }
        Strategy::CompiledModule {
            toolchain: Toolchain::Go,
        } => vec![("go build", CommandSpec::new("go").args(["build", "."]).cwd(dir))],
        Strategy::CompiledModule {
            toolchain: Toolchain::Cargo,
        } => vec![(
            "cargo build",
            CommandSpec::new("cargo").args(["build", "--release"]).cwd(dir),
        )],
        Strategy::GenericBuild { build_file } if build_file == "CMakeLists.txt" => vec![
            (
                "cmake configure",
                CommandSpec::new("cmake").args(["-S", ".", "-B", "build"]).cwd(dir),
            ),
            (
                "cmake build",
                CommandSpec::new("cmake").args(["--build", "build"]).cwd(dir),
            ),
        ],
        Strategy::GenericBuild { build_file } => vec![(
            "make",
            CommandSpec::new("make").args(["-f", build_file.as_str()]).cwd(dir),
        )],
        Strategy::InstallScript { script } => {
            vec![("install script", CommandSpec::new("sh").arg(script.as_str()).cwd(dir))]
        }
        Strategy::Documentation { .. } => Vec::new(),
    }
}

#[async_trait]
impl SourceAdapter for GitAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::SourceRepo
    }

    async fn is_satisfied(&self, task: &TaskSpec, ctx: &TaskContext<'_>) -> bool {
        let dir = Self::checkout_dir(ctx.settings(), task);
        if !dir.join(".git").exists() {
            return false;
        }
        let check = Self::git_in(&dir).args(["rev-parse", "--is-inside-work-tree"]);
        match ctx.exec(&check).await {
            Ok(out) => out.ok(),
            Err(err) => {
                debug!(task = %task.id, error = %err, "rev-parse failed");
                false
            }
        }
    }

    async fn install(
        &self,
        task: &TaskSpec,
        ctx: &TaskContext<'_>,
    ) -> Result<InstallReport, AdapterError> {
        let dir = Self::checkout_dir(ctx.settings(), task);

        if ctx.settings().force_reinstall && tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            info!(task = %task.id, dir = %dir.display(), "removing checkout for reinstall");
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|err| AdapterError::io(format!("remove {}", dir.display()), err))?;
        }

        let (step, fetched) = self.fetch(task, &dir, ctx).await?;
        if fetched.exit == ExitClass::TimedOut {
            // A killed clone leaves a `.git` behind that would pass the
            // re-check without a single build step having run.
            if step == "git clone"
                && let Err(err) = tokio::fs::remove_dir_all(&dir).await
                && err.kind() != std::io::ErrorKind::NotFound
            {
                warn!(task = %task.id, error = %err, "cannot remove partial clone");
            }
            return Ok(InstallReport::from_shell(step, &fetched).with_delivery(Delivery::Unfinished));
        }
        if !fetched.ok() {
            return Ok(InstallReport::from_shell(step, &fetched));
        }

        let Some(strategy) = self.detect_strategy(&dir) else {
            return Err(AdapterError::io(
                format!("scan {}", dir.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        };
        info!(task = %task.id, strategy = strategy.label(), "build strategy selected");

        let before = snapshot_executables(&dir);
        for (step, command) in build_steps(&strategy, &dir) {
            let out = ctx.exec(&command).await?;
            match out.exit {
                ExitClass::Ok => {}
                // The checkout is in place; only a re-check can tell whether
                // the build finished.
                ExitClass::TimedOut => {
                    return Ok(InstallReport::from_shell(step, &out)
                        .with_strategy(strategy)
                        .with_delivery(Delivery::Unfinished));
                }
                _ => return Ok(InstallReport::from_shell(step, &out).with_strategy(strategy)),
            }
        }

        if let Strategy::DependencyManifest {
            then_package: true, ..
        } = &strategy
        {
            let package = CommandSpec::new("python3")
                .args(["-m", "pip", "install", "."])
                .cwd(&dir);
            let out = ctx.exec(&package).await?;
            if !out.ok() {
                warn!(task = %task.id, exit = %out.exit, "package install after manifest failed");
            }
        }

        let delivery = match &strategy {
            Strategy::Documentation { readme: Some(readme) } => Delivery::Documentation {
                readme: dir.join(readme),
            },
            Strategy::Documentation { readme: None } => Delivery::Undetermined,
            s if s.produces_executable() => {
                match find_new_executable(&dir, task.id.as_str(), &before) {
                    Some(path) => Delivery::Executable {
                        name: task.id.to_string(),
                        path,
                    },
                    None => Delivery::MissingExecutable,
                }
            }
            _ => Delivery::Installed,
        };

        Ok(InstallReport::installed()
            .with_strategy(strategy)
            .with_delivery(delivery))
    }

    fn detect_strategy(&self, checkout: &Path) -> Option<Strategy> {
        match RepoLayout::scan(checkout) {
            Ok(layout) => Some(detect(&layout)),
            Err(err) => {
                debug!(dir = %checkout.display(), error = %err, "cannot scan checkout");
                None
            }
        }
    }

    async fn update_in_place(&self, task: &TaskSpec, ctx: &TaskContext<'_>) -> Option<String> {
        let dir = Self::checkout_dir(ctx.settings(), task);
        let pull = Self::git_in(&dir).args(["pull", "--ff-only"]);
        match ctx.exec(&pull).await {
            Ok(out) if out.ok() => Some("checkout updated".to_string()),
            Ok(out) if out.exit == ExitClass::Cancelled => None,
            Ok(out) => Some(format!("update skipped ({})", out.exit)),
            Err(err) => Some(format!("update skipped ({err})")),
        }
    }
}
