//! Scripted fakes for the ports, used by unit tests across the crate.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::app::{RunContext, TaskContext};
use crate::domain::{ResourceSample, RunSettings, SourceKind, TaskSpec};
use crate::ports::{
    AdapterError, CommandSpec, Delivery, ExitClass, InstallReport, IntegrationHook, ResourceProbe,
    ShellError, ShellExecutor, ShellOutput, SourceAdapter, TaskLog,
};

/// Settings rooted in a temp dir, with short delays.
pub(crate) fn settings_in(root: &Path) -> RunSettings {
    RunSettings {
        log_dir: root.join("logs"),
        bin_dir: root.join("bin"),
        checkout_root: root.join("src"),
        helper_dir: root.join("manual"),
        poll_interval_secs: 1,
        task_timeout_secs: 5,
        ..RunSettings::default()
    }
}

pub(crate) fn run_context(settings: RunSettings, shell: Arc<dyn ShellExecutor>) -> RunContext {
    RunContext::new(settings, shell, CancellationToken::new())
}

type Effect = Box<dyn Fn(&CommandSpec) + Send + Sync>;

struct Rule {
    prefix: String,
    once: VecDeque<ShellOutput>,
    sticky: Option<ShellOutput>,
    effect: Option<Effect>,
}

/// Answers commands by prefix match on their rendered form
/// (`program arg arg ...`). Unmatched commands succeed with no output.
#[derive(Default)]
pub(crate) struct FakeShell {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl FakeShell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn rule(&self, prefix: &str, update: impl FnOnce(&mut Rule)) {
        let mut rules = self.rules.lock().unwrap();
        if let Some(rule) = rules.iter_mut().find(|rule| rule.prefix == prefix) {
            update(rule);
            return;
        }
        let mut rule = Rule {
            prefix: prefix.to_string(),
            once: VecDeque::new(),
            sticky: None,
            effect: None,
        };
        update(&mut rule);
        rules.push(rule);
    }

    /// Every matching command yields `exit` / `output`.
    pub(crate) fn on(self, prefix: &str, exit: ExitClass, output: &str) -> Self {
        self.rule(prefix, |rule| rule.sticky = Some(ShellOutput::new(exit, output)));
        self
    }

    /// The next matching command yields `exit` / `output`, once.
    pub(crate) fn once(self, prefix: &str, exit: ExitClass, output: &str) -> Self {
        self.rule(prefix, |rule| rule.once.push_back(ShellOutput::new(exit, output)));
        self
    }

    /// Run `effect` whenever a matching command runs (e.g. populate a
    /// checkout on `git clone`).
    pub(crate) fn effect(
        self,
        prefix: &str,
        effect: impl Fn(&CommandSpec) + Send + Sync + 'static,
    ) -> Self {
        self.rule(prefix, |rule| rule.effect = Some(Box::new(effect)));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|call| call.starts_with(prefix)).count()
    }
}

#[async_trait]
impl ShellExecutor for FakeShell {
    async fn run(
        &self,
        command: &CommandSpec,
        _timeout: Duration,
        log: &TaskLog,
        cancel: &CancellationToken,
    ) -> Result<ShellOutput, ShellError> {
        let rendered = command.to_string();
        self.calls.lock().unwrap().push(rendered.clone());
        log.append(&format!("$ {rendered}\n")).await?;

        if cancel.is_cancelled() {
            return Ok(ShellOutput::new(ExitClass::Cancelled, ""));
        }

        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules
            .iter_mut()
            .filter(|rule| rendered.starts_with(&rule.prefix))
            .max_by_key(|rule| rule.prefix.len())
        else {
            return Ok(ShellOutput::new(ExitClass::Ok, ""));
        };
        if let Some(effect) = &rule.effect {
            effect(command);
        }
        let output = rule
            .once
            .pop_front()
            .or_else(|| rule.sticky.clone())
            .unwrap_or_else(|| ShellOutput::new(ExitClass::Ok, ""));
        Ok(output)
    }
}

/// Adapter whose answers are scripted up front.
pub(crate) struct ScriptedAdapter {
    kind: SourceKind,
    satisfied: Mutex<VecDeque<bool>>,
    satisfied_default: bool,
    installs: Mutex<VecDeque<ExitClass>>,
    install_default: ExitClass,
    delivery: Delivery,
    repair_fixes: bool,
    hold_until_cancel: bool,
    limit: Option<usize>,
    refresh: bool,
    refreshed_at: Option<DateTime<Utc>>,

    pub(crate) satisfied_calls: AtomicUsize,
    pub(crate) install_calls: AtomicUsize,
    pub(crate) repair_calls: AtomicUsize,
    pub(crate) refresh_calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedAdapter {
    pub(crate) fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            satisfied: Mutex::new(VecDeque::new()),
            satisfied_default: false,
            installs: Mutex::new(VecDeque::new()),
            install_default: ExitClass::Ok,
            delivery: Delivery::Installed,
            repair_fixes: false,
            hold_until_cancel: false,
            limit: None,
            refresh: false,
            refreshed_at: None,
            satisfied_calls: AtomicUsize::new(0),
            install_calls: AtomicUsize::new(0),
            repair_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Answers to `is_satisfied`, in call order; afterwards `default`.
    pub(crate) fn satisfied(mut self, answers: &[bool], default: bool) -> Self {
        self.satisfied = Mutex::new(answers.iter().copied().collect());
        self.satisfied_default = default;
        self
    }

    /// Exit classes for `install`, in call order; afterwards `default`.
    pub(crate) fn installs(mut self, exits: &[ExitClass], default: ExitClass) -> Self {
        self.installs = Mutex::new(exits.iter().copied().collect());
        self.install_default = default;
        self
    }

    pub(crate) fn delivering(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// `repair` reports that it ran.
    pub(crate) fn repairing(mut self) -> Self {
        self.repair_fixes = true;
        self
    }

    /// `install` blocks until the run is cancelled.
    pub(crate) fn holding(mut self) -> Self {
        self.hold_until_cancel = true;
        self
    }

    pub(crate) fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn with_index(mut self, refreshed_at: Option<DateTime<Utc>>) -> Self {
        self.refresh = true;
        self.refreshed_at = refreshed_at;
        self
    }

    pub(crate) fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn is_satisfied(&self, _task: &TaskSpec, _ctx: &TaskContext<'_>) -> bool {
        self.satisfied_calls.fetch_add(1, Ordering::SeqCst);
        self.satisfied
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.satisfied_default)
    }

    async fn install(
        &self,
        _task: &TaskSpec,
        ctx: &TaskContext<'_>,
    ) -> Result<InstallReport, AdapterError> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let exit = if self.hold_until_cancel {
            ctx.run_context().cancel_token().cancelled().await;
            ExitClass::Cancelled
        } else {
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.installs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.install_default)
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        let detail = (exit != ExitClass::Ok).then(|| format!("install: {exit}"));
        Ok(InstallReport {
            exit,
            detail,
            strategy: None,
            delivery: self.delivery.clone(),
        })
    }

    async fn repair(&self, _task: &TaskSpec, _ctx: &TaskContext<'_>) -> bool {
        self.repair_calls.fetch_add(1, Ordering::SeqCst);
        self.repair_fixes
    }

    fn max_parallel(&self) -> Option<usize> {
        self.limit
    }

    fn needs_index_refresh(&self) -> bool {
        self.refresh
    }

    async fn index_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    async fn refresh_index(&self, _ctx: &TaskContext<'_>) -> Result<(), AdapterError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Returns the scripted samples in order, then repeats the last one.
pub(crate) struct FixedProbe {
    samples: Mutex<VecDeque<ResourceSample>>,
    last: Mutex<ResourceSample>,
    pub(crate) calls: AtomicUsize,
}

impl FixedProbe {
    pub(crate) fn new(samples: &[ResourceSample]) -> Self {
        Self {
            samples: Mutex::new(samples.iter().copied().collect()),
            last: Mutex::new(ResourceSample::default()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn idle() -> Self {
        Self::new(&[])
    }
}

#[async_trait]
impl ResourceProbe for FixedProbe {
    async fn sample(&self) -> ResourceSample {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.samples.lock().unwrap().pop_front() {
            *last = next;
        }
        *last
    }
}

#[derive(Default)]
pub(crate) struct RecordingHook {
    linked: Mutex<Vec<(String, PathBuf)>>,
}

impl RecordingHook {
    pub(crate) fn linked(&self) -> Vec<(String, PathBuf)> {
        self.linked.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntegrationHook for RecordingHook {
    async fn on_linked(&self, name: &str, path: &Path) {
        self.linked
            .lock()
            .unwrap()
            .push((name.to_string(), path.to_path_buf()));
    }
}
