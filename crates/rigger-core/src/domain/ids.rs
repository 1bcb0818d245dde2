//! Domain identifiers.
//!
//! Runs and attempts are identified by ULIDs wrapped in the phantom-typed
//! `Id<T>`: sortable by creation time, and a `RunId` can never be passed where
//! an `AttemptId` is expected.
//!
//! Tasks are different: their id is a stable, human-chosen name (a package
//! name, or a repository name derived from its URL) so that repeated runs
//! over the same task list line up in logs and ledgers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for each ULID-backed id type.
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix used by `Display` (e.g. "run-").
    fn prefix() -> &'static str;
}

/// ULID-backed identifier, parameterized by a zero-sized marker.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id stamped with the current time.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attempt {}

impl IdMarker for Attempt {
    fn prefix() -> &'static str {
        "attempt-"
    }
}

/// Identifier of one orchestration run.
pub type RunId = Id<Run>;

/// Identifier of one execution attempt of a task.
pub type AttemptId = Id<Attempt>;

/// Stable identifier of a task, unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Derive an id from a repository URL: the last path segment with any
    /// trailing `.git` removed.
    ///
    /// `https://github.com/org/some-tool.git` -> `some-tool`
    /// `git@host:org/other.git` -> `other`
    pub fn from_repo_url(url: &str) -> Self {
        let trimmed = url.trim().trim_end_matches('/');
        let last = trimmed
            .rsplit(['/', ':'])
            .next()
            .unwrap_or(trimmed);
        let name = last.strip_suffix(".git").unwrap_or(last);
        if name.is_empty() {
            Self(trimmed.to_string())
        } else {
            Self(name.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
