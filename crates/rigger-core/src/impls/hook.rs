use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::ports::IntegrationHook;

/// Default hook: desktop integration is left to the operator, the link is
/// only logged.
#[derive(Debug, Clone, Default)]
pub struct TracingHook;

#[async_trait]
impl IntegrationHook for TracingHook {
    async fn on_linked(&self, name: &str, path: &Path) {
        info!(name, path = %path.display(), "executable linked");
    }
}
