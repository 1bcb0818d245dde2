//! Post-install integration hook port.

use std::path::Path;

use async_trait::async_trait;

/// Called once per executable linked into the bin directory. Fire and
/// forget: each call runs on its own task and cannot change the task's
/// outcome.
#[async_trait]
pub trait IntegrationHook: Send + Sync {
    async fn on_linked(&self, name: &str, path: &Path);
}
