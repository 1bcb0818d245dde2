//! Input specs: tasks and run settings.
//!
//! A run file is already-parsed data (JSON). Every settings field has a
//! default so a run file may carry only a task list.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use crate::error::RiggerError;

/// Where a task installs from. Determines the adapter and the idempotency
/// predicate that apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// OS package manager (apt/dpkg).
    SystemPackage,
    /// Per-package isolated installer (pipx).
    IsolatedApp,
    /// Version-controlled repository; build steps are inferred.
    SourceRepo,
    /// Not automatable; yields operator instructions.
    Manual,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::SystemPackage,
        SourceKind::IsolatedApp,
        SourceKind::SourceRepo,
        SourceKind::Manual,
    ];

    /// Dense index, used for per-kind lanes.
    pub fn index(self) -> usize {
        match self {
            SourceKind::SystemPackage => 0,
            SourceKind::IsolatedApp => 1,
            SourceKind::SourceRepo => 2,
            SourceKind::Manual => 3,
        }
    }

    pub fn is_automatable(self) -> bool {
        !matches!(self, SourceKind::Manual)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::SystemPackage => "system_package",
            SourceKind::IsolatedApp => "isolated_app",
            SourceKind::SourceRepo => "source_repo",
            SourceKind::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-specific parameters. All optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    /// Packages that must be removed before installing (system packages).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,

    /// Branch or tag to check out (source repositories).
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,

    /// Extra arguments handed to the installer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,

    /// Installer-side package spec when it differs from `target`
    /// (e.g. pipx installs `impacket` but the executable is `secretsdump.py`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    /// Per-task override of `RunSettings::task_timeout_secs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Operator instructions for manual tasks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instructions: Vec<String>,
}

/// Immutable description of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub source_kind: SourceKind,
    /// Package name, app name, repository URL or manual-tool name.
    pub target: String,

    #[serde(default)]
    pub params: TaskParams,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Unselected tasks stay in the run file but are never scheduled.
    #[serde(default = "default_selected")]
    pub selected: bool,
}

fn default_selected() -> bool {
    true
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, source_kind: SourceKind, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_kind,
            target: target.into(),
            params: TaskParams::default(),
            description: None,
            category: None,
            selected: true,
        }
    }

    pub fn system_package(name: &str) -> Self {
        Self::new(name, SourceKind::SystemPackage, name)
    }

    pub fn isolated_app(name: &str) -> Self {
        Self::new(name, SourceKind::IsolatedApp, name)
    }

    /// Source repository task; the id is derived from the URL.
    pub fn repo(url: &str) -> Self {
        Self::new(TaskId::from_repo_url(url), SourceKind::SourceRepo, url)
    }

    pub fn manual(name: &str) -> Self {
        Self::new(name, SourceKind::Manual, name)
    }

    pub fn with_conflicts<I, S>(mut self, conflicts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.conflicts = conflicts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Name the installer should receive.
    pub fn package(&self) -> &str {
        self.params.package.as_deref().unwrap_or(&self.target)
    }
}

/// Scalar settings for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Admission is held while the 1-minute load average exceeds this.
    pub max_load: f64,
    /// Admission is held while memory use (percent) exceeds this.
    pub max_mem_percent: f64,
    /// Attempts per task, including the first.
    pub max_attempts: u32,
    /// Worker cap; the pool is `min(host cpus, pool_size)`.
    pub pool_size: usize,
    /// Ignore the idempotency pre-check.
    pub force_reinstall: bool,
    /// Record every task as simulated without touching adapters.
    pub dry_run: bool,

    pub poll_interval_secs: u64,
    pub task_timeout_secs: u64,
    pub index_refresh_timeout_secs: u64,
    /// The package index is not refreshed when it is younger than this.
    pub index_freshness_secs: u64,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,

    pub log_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub checkout_root: PathBuf,
    pub helper_dir: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_load: 4.0,
            max_mem_percent: 80.0,
            max_attempts: 3,
            pool_size: 4,
            force_reinstall: false,
            dry_run: false,
            poll_interval_secs: 4,
            task_timeout_secs: 900,
            index_refresh_timeout_secs: 600,
            index_freshness_secs: 3600,
            backoff_base_secs: 2,
            backoff_cap_secs: 30,
            log_dir: PathBuf::from("rigger-logs"),
            bin_dir: PathBuf::from("bin"),
            checkout_root: PathBuf::from("src"),
            helper_dir: PathBuf::from("manual"),
        }
    }
}

impl RunSettings {
    /// Deadline for one command of `task`.
    pub fn timeout_for(&self, task: &TaskSpec) -> Duration {
        Duration::from_secs(task.params.timeout_secs.unwrap_or(self.task_timeout_secs))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn index_freshness(&self) -> Duration {
        Duration::from_secs(self.index_freshness_secs)
    }

    pub fn index_refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.index_refresh_timeout_secs)
    }
}

/// On-disk run description: a task list plus settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunFile {
    pub tasks: Vec<TaskSpec>,

    #[serde(default)]
    pub settings: RunSettings,
}

impl RunFile {
    pub fn from_json_str(json: &str) -> Result<Self, RiggerError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, RiggerError> {
        let text = std::fs::read_to_string(path).map_err(|source| RiggerError::RunFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Deselect every task outside `category`. Deselected tasks stay in the
    /// file so id validation still sees them.
    pub fn narrow_to_category(&mut self, category: &str) {
        for task in &mut self.tasks {
            if task.category.as_deref() != Some(category) {
                task.selected = false;
            }
        }
    }
}
