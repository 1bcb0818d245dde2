//! RunBuilder: wiring and fail-fast validation of a run.
//!
//! Everything that can be checked before the first task starts is checked
//! in `build()`: duplicate task ids, and source kinds with no adapter.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{Orchestrator, Pipeline, RunContext};
use crate::domain::{RunSettings, SourceKind, TaskSpec};
use crate::error::RiggerError;
use crate::gate::ResourceGate;
use crate::impls::{ProcProbe, ProcessShell, ScriptManualHelper, TracingHook};
use crate::ports::{IntegrationHook, ManualHelper, ResourceProbe, ShellExecutor, SourceAdapter};
use crate::queue::RetryPolicy;
use crate::registry::AdapterRegistry;

/// # Example
/// ```ignore
/// let orchestrator = RunBuilder::new(file.settings)
///     .tasks(file.tasks)
///     .adapter(AptAdapter::default())?
///     .adapter(PipxAdapter::new())?
///     .adapter(GitAdapter::new())?
///     .build()?;
/// let outcome = orchestrator.run().await;
/// ```
pub struct RunBuilder {
    settings: RunSettings,
    tasks: Vec<TaskSpec>,
    registry: AdapterRegistry,
    shell: Option<Arc<dyn ShellExecutor>>,
    probe: Option<Arc<dyn ResourceProbe>>,
    manual: Option<Arc<dyn ManualHelper>>,
    hook: Option<Arc<dyn IntegrationHook>>,
    cancel: Option<CancellationToken>,
    host_parallelism: Option<usize>,
}

impl RunBuilder {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            tasks: Vec::new(),
            registry: AdapterRegistry::new(),
            shell: None,
            probe: None,
            manual: None,
            hook: None,
            cancel: None,
            host_parallelism: None,
        }
    }

    pub fn tasks(mut self, tasks: impl IntoIterator<Item = TaskSpec>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    /// Register an adapter for its source kind.
    pub fn adapter(self, adapter: impl SourceAdapter + 'static) -> Result<Self, RiggerError> {
        self.shared_adapter(Arc::new(adapter))
    }

    pub fn shared_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Result<Self, RiggerError> {
        self.registry.register(adapter)?;
        Ok(self)
    }

    pub fn shell(mut self, shell: Arc<dyn ShellExecutor>) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn manual_helper(mut self, manual: Arc<dyn ManualHelper>) -> Self {
        self.manual = Some(manual);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn IntegrationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Override the detected CPU count used to size the pool.
    pub fn host_parallelism(mut self, cpus: usize) -> Self {
        self.host_parallelism = Some(cpus);
        self
    }

    pub fn build(self) -> Result<Orchestrator, RiggerError> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(&task.id) {
                return Err(RiggerError::DuplicateTask(task.id.clone()));
            }
        }

        let tasks: Vec<TaskSpec> = self.tasks.into_iter().filter(|task| task.selected).collect();

        let missing: Vec<SourceKind> = tasks
            .iter()
            .map(|task| task.source_kind)
            .filter(|kind| kind.is_automatable() && !self.registry.contains(*kind))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !missing.is_empty() {
            return Err(RiggerError::MissingAdapters(missing));
        }

        let cpus = self.host_parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let pool_size = cpus.min(self.settings.pool_size).max(1);

        let shell = self.shell.unwrap_or_else(|| Arc::new(ProcessShell::new()));
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(ProcProbe::default()));
        let manual = self
            .manual
            .unwrap_or_else(|| Arc::new(ScriptManualHelper::new()));
        let hook = self.hook.unwrap_or_else(|| Arc::new(TracingHook));

        let gate = ResourceGate::from_settings(probe, &self.settings);
        let policy = RetryPolicy::from_settings(&self.settings);
        let pipeline = Pipeline::new(self.registry, manual, hook, policy);
        let run = RunContext::new(
            self.settings,
            shell,
            self.cancel.unwrap_or_default(),
        );

        Ok(Orchestrator::new(run, pipeline, gate, tasks, pool_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAdapter;

    fn builder() -> RunBuilder {
        RunBuilder::new(RunSettings::default())
            .adapter(ScriptedAdapter::new(SourceKind::SystemPackage))
            .unwrap()
    }

    #[test]
    fn build_success() {
        let orchestrator = builder()
            .task(TaskSpec::system_package("nmap"))
            .task(TaskSpec::manual("burp"))
            .host_parallelism(16)
            .build()
            .unwrap();
        assert_eq!(orchestrator.tasks().len(), 2);
        assert_eq!(orchestrator.pool_size(), 4);
    }

    #[test]
    fn duplicate_task_ids_are_rejected() {
        let result = builder()
            .task(TaskSpec::system_package("nmap"))
            .task(TaskSpec::system_package("nmap"))
            .build();
        assert!(matches!(result, Err(RiggerError::DuplicateTask(id)) if id.as_str() == "nmap"));
    }

    #[test]
    fn missing_adapters_are_listed() {
        let result = builder()
            .task(TaskSpec::repo("https://github.com/org/tool.git"))
            .task(TaskSpec::isolated_app("sqlmap"))
            .task(TaskSpec::repo("https://github.com/org/other.git"))
            .build();
        assert!(matches!(
            result,
            Err(RiggerError::MissingAdapters(kinds))
                if kinds == vec![SourceKind::IsolatedApp, SourceKind::SourceRepo]
        ));
    }

    #[test]
    fn unselected_tasks_are_dropped() {
        let mut hidden = TaskSpec::isolated_app("sqlmap");
        hidden.selected = false;
        let orchestrator = builder()
            .task(TaskSpec::system_package("nmap"))
            .task(hidden)
            .build()
            .unwrap();
        assert_eq!(orchestrator.tasks().len(), 1);
    }

    #[test]
    fn pool_is_bounded_by_host_cpus() {
        let settings = RunSettings {
            pool_size: 8,
            ..RunSettings::default()
        };
        let orchestrator = RunBuilder::new(settings).host_parallelism(2).build().unwrap();
        assert_eq!(orchestrator.pool_size(), 2);

        let zero = RunBuilder::new(RunSettings {
            pool_size: 0,
            ..RunSettings::default()
        })
        .build()
        .unwrap();
        assert_eq!(zero.pool_size(), 1);
    }
}
