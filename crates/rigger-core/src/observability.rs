use serde::{Deserialize, Serialize};

use crate::domain::LedgerStatus;

/// Ledger entries per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub success: usize,
    pub failed: usize,
    pub partial: usize,
    pub skipped: usize,
    pub manual: usize,
    pub simulated: usize,
    pub interrupted: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: LedgerStatus) {
        *self.slot(status) += 1;
    }

    pub fn get(&self, status: LedgerStatus) -> usize {
        match status {
            LedgerStatus::Success => self.success,
            LedgerStatus::Failed => self.failed,
            LedgerStatus::Partial => self.partial,
            LedgerStatus::Skipped => self.skipped,
            LedgerStatus::Manual => self.manual,
            LedgerStatus::Simulated => self.simulated,
            LedgerStatus::Interrupted => self.interrupted,
        }
    }

    fn slot(&mut self, status: LedgerStatus) -> &mut usize {
        match status {
            LedgerStatus::Success => &mut self.success,
            LedgerStatus::Failed => &mut self.failed,
            LedgerStatus::Partial => &mut self.partial,
            LedgerStatus::Skipped => &mut self.skipped,
            LedgerStatus::Manual => &mut self.manual,
            LedgerStatus::Simulated => &mut self.simulated,
            LedgerStatus::Interrupted => &mut self.interrupted,
        }
    }

    pub fn total(&self) -> usize {
        LedgerStatus::ALL.iter().map(|status| self.get(*status)).sum()
    }
}

impl FromIterator<LedgerStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = LedgerStatus>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for status in iter {
            counts.add(status);
        }
        counts
    }
}
