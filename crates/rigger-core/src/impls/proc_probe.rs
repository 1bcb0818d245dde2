//! `ResourceProbe` reading Linux `/proc`.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::ResourceSample;
use crate::ports::ResourceProbe;

#[derive(Debug, Clone)]
pub struct ProcProbe {
    loadavg: PathBuf,
    meminfo: PathBuf,
}

impl Default for ProcProbe {
    fn default() -> Self {
        Self::new("/proc/loadavg", "/proc/meminfo")
    }
}

impl ProcProbe {
    pub fn new(loadavg: impl Into<PathBuf>, meminfo: impl Into<PathBuf>) -> Self {
        Self {
            loadavg: loadavg.into(),
            meminfo: meminfo.into(),
        }
    }
}

#[async_trait]
impl ResourceProbe for ProcProbe {
    async fn sample(&self) -> ResourceSample {
        let load = match tokio::fs::read_to_string(&self.loadavg).await {
            Ok(text) => parse_loadavg(&text),
            Err(err) => {
                debug!(path = %self.loadavg.display(), error = %err, "load average unavailable");
                None
            }
        };
        let mem = match tokio::fs::read_to_string(&self.meminfo).await {
            Ok(text) => parse_meminfo(&text),
            Err(err) => {
                debug!(path = %self.meminfo.display(), error = %err, "meminfo unavailable");
                None
            }
        };
        ResourceSample::new(load.unwrap_or(0.0), mem.unwrap_or(0.0))
    }
}

/// 1-minute load average: first field of `/proc/loadavg`.
fn parse_loadavg(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/// Percent of memory in use. Uses `MemAvailable` when the kernel reports
/// it, otherwise `MemFree + Buffers + Cached`.
fn parse_meminfo(text: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        text.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            rest.split_whitespace().next()?.parse().ok()
        })
    };

    let total = field("MemTotal").filter(|total| *total > 0.0)?;
    let available = match field("MemAvailable") {
        Some(available) => available,
        None => field("MemFree")? + field("Buffers").unwrap_or(0.0) + field("Cached").unwrap_or(0.0),
    };
    Some(((total - available) / total * 100.0).clamp(0.0, 100.0))
}
