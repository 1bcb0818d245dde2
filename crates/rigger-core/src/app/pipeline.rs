//! Per-task pipeline, run by a worker for each admitted task:
//!
//! 1. open the ledger entry
//! 2. dry run -> `Simulated`; manual -> helper artifact, `Manual`
//! 3. idempotency pre-check -> `Skipped` (plus an in-place update note)
//! 4. index barrier, then attempts under the retry policy
//! 5. integrate what the install delivered and finalize the entry

use std::sync::Arc;

use tracing::{info, warn};

use super::RunContext;
use super::barrier::IndexBarrier;
use super::integrate::{link_executable, write_doc_viewer};
use crate::domain::{LedgerEntry, LedgerStatus, Strategy, TaskSpec};
use crate::executor::{self, RetryRun};
use crate::ledger::{EntryHandle, Ledger};
use crate::ports::{Delivery, IntegrationHook, ManualHelper};
use crate::queue::{RetryPolicy, RetryState};
use crate::registry::AdapterRegistry;

pub struct Pipeline {
    registry: AdapterRegistry,
    ledger: Arc<Ledger>,
    barrier: IndexBarrier,
    manual: Arc<dyn ManualHelper>,
    hook: Arc<dyn IntegrationHook>,
    policy: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        registry: AdapterRegistry,
        manual: Arc<dyn ManualHelper>,
        hook: Arc<dyn IntegrationHook>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            ledger: Arc::new(Ledger::new()),
            barrier: IndexBarrier::new(),
            manual,
            hook,
            policy,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Run one task to its ledger entry. `None` only when the task could not
    /// be admitted into the ledger (its id is already there).
    pub async fn process(&self, task: &TaskSpec, run: &RunContext) -> Option<LedgerEntry> {
        let handle = match self.ledger.admit(task) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(task = %task.id, error = %err, "task not admitted");
                return None;
            }
        };

        let (status, message) = self.outcome(task, run, &handle).await;
        let entry = handle.finalize(status, message);
        info!(
            task = %entry.task_id,
            kind = %entry.source_kind,
            status = %entry.status,
            attempts = entry.attempts.len(),
            message = %entry.message,
            "task finished"
        );
        Some(entry)
    }

    async fn outcome(
        &self,
        task: &TaskSpec,
        run: &RunContext,
        handle: &EntryHandle,
    ) -> (LedgerStatus, String) {
        let settings = run.settings();

        if settings.dry_run {
            return (
                LedgerStatus::Simulated,
                format!("would install '{}' as {}", task.target, task.source_kind),
            );
        }

        if !task.source_kind.is_automatable() {
            return match self.manual.materialize(task, run).await {
                Ok(path) => {
                    let message = format!("manual installation required, see {}", path.display());
                    handle.set_artifact(path);
                    (LedgerStatus::Manual, message)
                }
                Err(err) => (
                    LedgerStatus::Manual,
                    format!("manual installation required, helper not written: {err}"),
                ),
            };
        }

        let Some(adapter) = self.registry.get(task.source_kind) else {
            return (
                LedgerStatus::Failed,
                format!("no adapter registered for {}", task.source_kind),
            );
        };
        let ctx = run.task_context(task);

        if !settings.force_reinstall && adapter.is_satisfied(task, &ctx).await {
            let message = match adapter.update_in_place(task, &ctx).await {
                Some(note) => format!("already installed; {note}"),
                None => "already installed".to_string(),
            };
            return (LedgerStatus::Skipped, message);
        }

        self.barrier.ensure(adapter.as_ref(), run).await;

        let RetryRun {
            attempts,
            state,
            message,
            last_report,
        } = executor::execute(adapter.as_ref(), task, &ctx, self.policy.clone()).await;
        handle.push_attempts(attempts);

        let strategy = last_report.as_ref().and_then(|report| report.strategy.clone());
        if let Some(strategy) = &strategy {
            handle.set_strategy(strategy.clone());
        }

        match state {
            RetryState::Succeeded { .. } => {
                let delivery = last_report
                    .map(|report| report.delivery)
                    .unwrap_or(Delivery::Installed);
                self.integrate(task, run, handle, delivery, strategy.as_ref(), message)
                    .await
            }
            RetryState::Cancelled { .. } => (LedgerStatus::Interrupted, message),
            _ => (LedgerStatus::Failed, message),
        }
    }

    async fn integrate(
        &self,
        task: &TaskSpec,
        run: &RunContext,
        handle: &EntryHandle,
        delivery: Delivery,
        strategy: Option<&Strategy>,
        message: String,
    ) -> (LedgerStatus, String) {
        let bin_dir = &run.settings().bin_dir;
        let label = strategy.map_or("source", Strategy::label);

        match delivery {
            Delivery::Installed => (LedgerStatus::Success, message),
            Delivery::Executable { name, path } => {
                match link_executable(bin_dir, &name, &path).await {
                    Ok(link) => {
                        let hook = Arc::clone(&self.hook);
                        let (hook_name, hook_path) = (name.clone(), link.clone());
                        tokio::spawn(async move { hook.on_linked(&hook_name, &hook_path).await });
                        let message = format!("{message}; linked {}", link.display());
                        handle.set_artifact(link);
                        (LedgerStatus::Success, message)
                    }
                    Err(err) => (
                        LedgerStatus::Partial,
                        format!("{label} built but could not be linked: {err}"),
                    ),
                }
            }
            Delivery::MissingExecutable => (
                LedgerStatus::Partial,
                format!("{label} built but no executable found"),
            ),
            Delivery::Documentation { readme } => {
                match write_doc_viewer(bin_dir, task.id.as_str(), &readme).await {
                    Ok(viewer) => {
                        let message =
                            format!("no install method found; documentation viewer at {}", viewer.display());
                        handle.set_artifact(viewer);
                        (LedgerStatus::Partial, message)
                    }
                    Err(err) => (
                        LedgerStatus::Partial,
                        format!("no install method found; documentation viewer not written: {err}"),
                    ),
                }
            }
            Delivery::Undetermined => (
                LedgerStatus::Partial,
                "could not determine installation method".to_string(),
            ),
            Delivery::Unfinished => (
                LedgerStatus::Partial,
                format!("{label} did not finish before the timeout; checkout is in place"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::domain::{AttemptOutcome, RunSettings, SourceKind};
    use crate::impls::{AptAdapter, GitAdapter, ScriptManualHelper};
    use crate::ports::{ExitClass, ShellExecutor, SourceAdapter};
    use crate::testing::{FakeShell, RecordingHook, ScriptedAdapter, run_context, settings_in};

    fn pipeline(adapters: Vec<Arc<dyn SourceAdapter>>, hook: Arc<RecordingHook>) -> Pipeline {
        let mut registry = AdapterRegistry::new();
        for adapter in adapters {
            registry.register(adapter).unwrap();
        }
        Pipeline::new(
            registry,
            Arc::new(ScriptManualHelper::new()),
            hook,
            RetryPolicy::default(),
        )
    }

    async fn process_one(
        adapter: Arc<dyn SourceAdapter>,
        settings: RunSettings,
        shell: Arc<dyn ShellExecutor>,
        task: TaskSpec,
    ) -> LedgerEntry {
        let pipeline = pipeline(vec![adapter], Arc::new(RecordingHook::default()));
        let run = run_context(settings, shell);
        pipeline.process(&task, &run).await.unwrap()
    }

    #[tokio::test]
    async fn satisfied_task_is_skipped_without_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(ScriptedAdapter::new(SourceKind::SystemPackage).satisfied(&[], true));

        let entry = process_one(
            adapter.clone(),
            settings_in(dir.path()),
            Arc::new(FakeShell::new()),
            TaskSpec::system_package("toolA"),
        )
        .await;

        assert_eq!(entry.status, LedgerStatus::Skipped);
        assert_eq!(entry.message, "already installed");
        assert!(entry.attempts.is_empty());
        assert_eq!(ScriptedAdapter::calls(&adapter.install_calls), 0);
    }

    #[tokio::test]
    async fn force_reinstall_bypasses_the_pre_check() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(ScriptedAdapter::new(SourceKind::SystemPackage).satisfied(&[], true));
        let settings = RunSettings {
            force_reinstall: true,
            ..settings_in(dir.path())
        };

        let entry = process_one(
            adapter.clone(),
            settings,
            Arc::new(FakeShell::new()),
            TaskSpec::system_package("toolA"),
        )
        .await;

        assert_eq!(entry.status, LedgerStatus::Success);
        assert_eq!(entry.attempts.len(), 1);
        assert_eq!(ScriptedAdapter::calls(&adapter.satisfied_calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_confirmed_on_second_attempt_succeed() {
        let dir = tempfile::tempdir().unwrap();
        // pre-check, post-check 1, post-check 2
        let adapter = Arc::new(
            ScriptedAdapter::new(SourceKind::SystemPackage)
                .installs(&[], ExitClass::TimedOut)
                .satisfied(&[false, false, true], false),
        );

        let entry = process_one(
            adapter,
            settings_in(dir.path()),
            Arc::new(FakeShell::new()),
            TaskSpec::system_package("toolB"),
        )
        .await;

        assert_eq!(entry.status, LedgerStatus::Success);
        assert_eq!(entry.attempts.len(), 2);
        let last = entry.last_attempt().unwrap();
        assert_eq!(last.outcome, AttemptOutcome::TimedOut);
        assert_eq!(last.post_check, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_task_fails_with_every_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(
            ScriptedAdapter::new(SourceKind::IsolatedApp)
                .installs(&[], ExitClass::Failed { code: Some(1) }),
        );

        let entry = process_one(
            adapter,
            settings_in(dir.path()),
            Arc::new(FakeShell::new()),
            TaskSpec::isolated_app("sqlmap"),
        )
        .await;

        assert_eq!(entry.status, LedgerStatus::Failed);
        assert_eq!(entry.attempts.len(), RunSettings::default().max_attempts as usize);
        assert!(entry.message.starts_with("failed after 3 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_conflict_removal_fails_only_that_task() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(
            FakeShell::new()
                .on("dpkg-query -W -f=${Status} ncat", ExitClass::Ok, "install ok installed")
                .on("apt-get remove", ExitClass::Failed { code: Some(100) }, ""),
        );
        let task = TaskSpec::system_package("netcat-openbsd").with_conflicts(["ncat"]);

        let entry = process_one(
            Arc::new(AptAdapter::new(dir.path().join("lists"))),
            settings_in(dir.path()),
            shell.clone(),
            task,
        )
        .await;

        assert_eq!(entry.status, LedgerStatus::Failed);
        assert_eq!(entry.attempts.len(), 3);
        assert!(entry.message.contains("failed to remove conflicting package 'ncat'"));
        assert_eq!(shell.count("apt-get install"), 0);
    }

    #[tokio::test]
    async fn readme_only_repository_is_partial_with_documentation() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(FakeShell::new().effect("git clone", |cmd| {
            let dest = PathBuf::from(cmd.arg_list().last().unwrap());
            std::fs::create_dir_all(dest.join(".git")).unwrap();
            std::fs::write(dest.join("README.md"), "# how to use").unwrap();
        }));
        let settings = settings_in(dir.path());
        let bin_dir = settings.bin_dir.clone();

        let entry = process_one(
            Arc::new(GitAdapter::new()),
            settings,
            shell,
            TaskSpec::repo("https://github.com/example/cheatsheets.git"),
        )
        .await;

        assert_eq!(entry.status, LedgerStatus::Partial);
        assert!(entry.message.contains("documentation"));
        assert_eq!(entry.artifact, Some(bin_dir.join("cheatsheets-docs")));
        assert!(bin_dir.join("cheatsheets-docs").exists());
        assert_eq!(entry.strategy.unwrap().label(), "documentation");
    }

    #[tokio::test]
    async fn timed_out_clone_is_not_a_success() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(
            FakeShell::new()
                .effect("git clone", |cmd| {
                    let dest = PathBuf::from(cmd.arg_list().last().unwrap());
                    std::fs::create_dir_all(dest.join(".git")).unwrap();
                    std::fs::write(dest.join("Makefile"), "all:").unwrap();
                })
                .on("git clone", ExitClass::TimedOut, ""),
        );
        let settings = RunSettings {
            max_attempts: 1,
            ..settings_in(dir.path())
        };

        let entry = process_one(
            Arc::new(GitAdapter::new()),
            settings,
            shell.clone(),
            TaskSpec::repo("https://github.com/example/scanner.git"),
        )
        .await;

        assert_eq!(entry.status, LedgerStatus::Failed);
        assert_eq!(entry.attempts[0].outcome, AttemptOutcome::TimedOut);
        assert_eq!(entry.attempts[0].post_check, Some(false));
        assert_eq!(shell.count("make"), 0);
    }

    #[tokio::test]
    async fn built_executable_is_linked_and_hooked() {
        let dir = tempfile::tempdir().unwrap();
        let built = dir.path().join("out/tool");
        std::fs::create_dir_all(built.parent().unwrap()).unwrap();
        std::fs::write(&built, "bin").unwrap();
        let adapter = Arc::new(ScriptedAdapter::new(SourceKind::SourceRepo).delivering(
            Delivery::Executable {
                name: "tool".to_string(),
                path: built.clone(),
            },
        ));
        let hook = Arc::new(RecordingHook::default());
        let pipeline = pipeline(vec![adapter as Arc<dyn SourceAdapter>], hook.clone());
        let settings = settings_in(dir.path());
        let link = settings.bin_dir.join("tool");
        let run = run_context(settings, Arc::new(FakeShell::new()));

        let entry = pipeline
            .process(&TaskSpec::new("tool", SourceKind::SourceRepo, "https://x/tool"), &run)
            .await
            .unwrap();
        for _ in 0..100 {
            if !hook.linked().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(entry.status, LedgerStatus::Success);
        assert_eq!(entry.artifact, Some(link.clone()));
        assert_eq!(hook.linked(), vec![("tool".to_string(), link)]);
    }

    #[tokio::test]
    async fn missing_executable_is_partial_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(
            ScriptedAdapter::new(SourceKind::SourceRepo).delivering(Delivery::MissingExecutable),
        );

        let entry = process_one(
            adapter,
            settings_in(dir.path()),
            Arc::new(FakeShell::new()),
            TaskSpec::new("tool", SourceKind::SourceRepo, "https://x/tool"),
        )
        .await;

        assert_eq!(entry.status, LedgerStatus::Partial);
        assert_eq!(entry.message, "source built but no executable found");
    }

    #[tokio::test]
    async fn manual_task_yields_helper_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let helper = settings.helper_dir.join("burp-instructions.sh");

        let entry = process_one(
            Arc::new(ScriptedAdapter::new(SourceKind::SystemPackage)),
            settings,
            Arc::new(FakeShell::new()),
            TaskSpec::manual("burp"),
        )
        .await;

        assert_eq!(entry.status, LedgerStatus::Manual);
        assert_eq!(entry.artifact, Some(helper.clone()));
        assert!(helper.exists());
        assert!(entry.attempts.is_empty());
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(ScriptedAdapter::new(SourceKind::SystemPackage));
        let settings = RunSettings {
            dry_run: true,
            ..settings_in(dir.path())
        };

        let entry = process_one(
            adapter.clone(),
            settings,
            Arc::new(FakeShell::new()),
            TaskSpec::system_package("nmap"),
        )
        .await;

        assert_eq!(entry.status, LedgerStatus::Simulated);
        assert_eq!(ScriptedAdapter::calls(&adapter.satisfied_calls), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
