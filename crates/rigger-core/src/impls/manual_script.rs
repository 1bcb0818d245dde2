//! `ManualHelper` writing a self-contained shell script per manual task.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::app::RunContext;
use crate::domain::TaskSpec;
use crate::ports::ManualHelper;

#[derive(Debug, Clone, Default)]
pub struct ScriptManualHelper;

impl ScriptManualHelper {
    pub fn new() -> Self {
        Self
    }
}

fn render(task: &TaskSpec) -> String {
    let mut body = String::from("#!/bin/sh\n");
    body.push_str("cat <<'RIGGER_INSTRUCTIONS'\n");
    body.push_str(&format!("{} requires manual installation.\n", task.target));
    if let Some(description) = &task.description {
        body.push_str(&format!("{description}\n"));
    }
    if !task.params.instructions.is_empty() {
        body.push('\n');
        for (n, step) in task.params.instructions.iter().enumerate() {
            body.push_str(&format!("{}. {step}\n", n + 1));
        }
    }
    body.push_str("RIGGER_INSTRUCTIONS\n");
    body
}

#[async_trait]
impl ManualHelper for ScriptManualHelper {
    async fn materialize(&self, task: &TaskSpec, run: &RunContext) -> io::Result<PathBuf> {
        let dir = &run.settings().helper_dir;
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}-instructions.sh", task.id));
        tokio::fs::write(&path, render(task)).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).await?;
        }
        Ok(path)
    }
}
