//! Host resource samples and thresholds.

use serde::{Deserialize, Serialize};

/// Point-in-time host pressure. Only lives as long as a gating decision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceSample {
    /// 1-minute load average.
    pub load_average: f64,
    pub memory_used_percent: f64,
}

impl ResourceSample {
    pub fn new(load_average: f64, memory_used_percent: f64) -> Self {
        Self {
            load_average,
            memory_used_percent,
        }
    }
}

/// Admission thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_load: f64,
    pub max_mem_percent: f64,
}

impl ResourceLimits {
    /// Either dimension over its limit holds admission.
    pub fn exceeded_by(&self, sample: &ResourceSample) -> bool {
        sample.load_average > self.max_load || sample.memory_used_percent > self.max_mem_percent
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_load: 4.0,
            max_mem_percent: 80.0,
        }
    }
}
