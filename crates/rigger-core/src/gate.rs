//! Resource gate: host-wide backpressure before a task starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{ResourceLimits, RunSettings};
use crate::ports::ResourceProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Cancelled,
}

pub struct ResourceGate {
    probe: Arc<dyn ResourceProbe>,
    limits: ResourceLimits,
    poll_interval: Duration,
    /// Set for the duration of a blocking episode, shared by all workers so
    /// an episode warns once no matter how many workers are waiting.
    under_pressure: AtomicBool,
}

impl ResourceGate {
    pub fn new(probe: Arc<dyn ResourceProbe>, limits: ResourceLimits, poll_interval: Duration) -> Self {
        Self {
            probe,
            limits,
            poll_interval,
            under_pressure: AtomicBool::new(false),
        }
    }

    pub fn from_settings(probe: Arc<dyn ResourceProbe>, settings: &RunSettings) -> Self {
        let limits = ResourceLimits {
            max_load: settings.max_load,
            max_mem_percent: settings.max_mem_percent,
        };
        Self::new(probe, limits, settings.poll_interval())
    }

    pub fn under_pressure(&self) -> bool {
        self.under_pressure.load(Ordering::SeqCst)
    }

    /// Block until the host is within limits. Never fails; only the run's
    /// cancellation ends the wait early.
    pub async fn admit(&self, cancel: &CancellationToken) -> Admission {
        let started = Instant::now();
        let mut polls: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Admission::Cancelled;
            }

            let sample = self.probe.sample().await;
            if !self.limits.exceeded_by(&sample) {
                if self.under_pressure.swap(false, Ordering::SeqCst) {
                    info!(
                        polls,
                        waited_secs = started.elapsed().as_secs(),
                        "resource pressure cleared, admitting tasks"
                    );
                }
                return Admission::Admitted;
            }

            polls += 1;
            if !self.under_pressure.swap(true, Ordering::SeqCst) {
                warn!(
                    load = sample.load_average,
                    mem_percent = sample.memory_used_percent,
                    max_load = self.limits.max_load,
                    max_mem_percent = self.limits.max_mem_percent,
                    "host under pressure, holding task admission"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => return Admission::Cancelled,
            }
        }
    }
}
