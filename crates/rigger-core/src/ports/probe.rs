//! Resource probe port: samples host pressure for the resource gate.

use async_trait::async_trait;

use crate::domain::ResourceSample;

/// Never fails: an unreadable source reports zero pressure.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    async fn sample(&self) -> ResourceSample;
}
