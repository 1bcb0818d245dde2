//! Manual helper port.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::app::RunContext;
use crate::domain::TaskSpec;

/// Turns a manual task into a standalone runnable artifact holding the
/// operator instructions. The engine only reports where it lives.
#[async_trait]
pub trait ManualHelper: Send + Sync {
    async fn materialize(&self, task: &TaskSpec, run: &RunContext) -> std::io::Result<PathBuf>;
}
