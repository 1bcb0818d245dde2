//! Run-once index refresh, taken lazily by the first task of a kind that
//! needs one.
//!
//! The lock is held across the refresh itself: tasks of the same kind that
//! arrive meanwhile wait for it instead of installing against a stale index.
//! Tasks of other kinds never touch the barrier.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::app::RunContext;
use crate::domain::SourceKind;
use crate::ports::SourceAdapter;

#[derive(Debug, Default)]
pub struct IndexBarrier {
    /// Kinds already handled this run, with the time the check completed.
    passed: Mutex<HashMap<SourceKind, DateTime<Utc>>>,
}

impl IndexBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `adapter`'s index has been handled once this run.
    /// Refresh failures are logged and do not stop the task.
    pub async fn ensure(&self, adapter: &dyn SourceAdapter, run: &RunContext) {
        if !adapter.needs_index_refresh() {
            return;
        }
        let kind = adapter.kind();
        let mut passed = self.passed.lock().await;
        if passed.contains_key(&kind) {
            return;
        }

        let freshness = chrono::Duration::from_std(run.settings().index_freshness())
            .unwrap_or(chrono::Duration::MAX);
        let fresh = adapter
            .index_refreshed_at()
            .await
            .is_some_and(|at| Utc::now().signed_duration_since(at) < freshness);

        if fresh {
            info!(%kind, "package index is fresh, skipping refresh");
        } else if !run.is_cancelled() {
            info!(%kind, "refreshing package index");
            let ctx = run.step_context(
                &format!("{kind}-index-refresh"),
                run.settings().index_refresh_timeout(),
            );
            if let Err(err) = adapter.refresh_index(&ctx).await {
                warn!(%kind, error = %err, log = %ctx.log_path().display(), "index refresh failed, continuing");
            }
        }
        passed.insert(kind, Utc::now());
    }

    pub async fn passed(&self, kind: SourceKind) -> bool {
        self.passed.lock().await.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{FakeShell, ScriptedAdapter, run_context, settings_in};

    #[tokio::test]
    async fn refreshes_once_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_context(settings_in(dir.path()), Arc::new(FakeShell::new()));
        let adapter = ScriptedAdapter::new(SourceKind::SystemPackage).with_index(None);
        let barrier = IndexBarrier::new();

        barrier.ensure(&adapter, &run).await;
        barrier.ensure(&adapter, &run).await;

        assert_eq!(ScriptedAdapter::calls(&adapter.refresh_calls), 1);
        assert!(barrier.passed(SourceKind::SystemPackage).await);
    }

    #[tokio::test]
    async fn fresh_index_is_not_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_context(settings_in(dir.path()), Arc::new(FakeShell::new()));
        let recent = Utc::now() - chrono::Duration::minutes(10);
        let adapter = ScriptedAdapter::new(SourceKind::SystemPackage).with_index(Some(recent));
        let barrier = IndexBarrier::new();

        barrier.ensure(&adapter, &run).await;

        assert_eq!(ScriptedAdapter::calls(&adapter.refresh_calls), 0);
        assert!(barrier.passed(SourceKind::SystemPackage).await);
    }

    #[tokio::test]
    async fn stale_index_is_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_context(settings_in(dir.path()), Arc::new(FakeShell::new()));
        let stale = Utc::now() - chrono::Duration::hours(3);
        let adapter = ScriptedAdapter::new(SourceKind::SystemPackage).with_index(Some(stale));

        IndexBarrier::new().ensure(&adapter, &run).await;

        assert_eq!(ScriptedAdapter::calls(&adapter.refresh_calls), 1);
    }

    #[tokio::test]
    async fn kinds_without_index_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_context(settings_in(dir.path()), Arc::new(FakeShell::new()));
        let adapter = ScriptedAdapter::new(SourceKind::IsolatedApp);
        let barrier = IndexBarrier::new();

        barrier.ensure(&adapter, &run).await;

        assert!(!barrier.passed(SourceKind::IsolatedApp).await);
    }
}
