//! Retry state machine for one task.
//!
//! Pure bookkeeping: it never spawns, sleeps or logs. The executor drives it
//! and performs the side effects each state asks for.

use std::time::Duration;

use super::RetryPolicy;

/// State transitions:
/// - Idle -> Attempting(1)
/// - Attempting(n) -> Succeeded(n)      (confirmed, directly or by post-check)
/// - Attempting(n) -> Retrying(n, d)    (unconfirmed, n < max_attempts)
/// - Attempting(n) -> Exhausted(n)      (unconfirmed, n == max_attempts)
/// - Retrying(n, _) -> Attempting(n+1)
/// - any non-terminal -> Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    Retrying { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
    Cancelled { attempts: u32 },
}

impl RetryState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. } | RetryState::Exhausted { .. } | RetryState::Cancelled { .. }
        )
    }

    /// Attempts started so far.
    pub fn attempts(self) -> u32 {
        match self {
            RetryState::Idle => 0,
            RetryState::Attempting { attempt } | RetryState::Retrying { attempt, .. } => attempt,
            RetryState::Succeeded { attempts }
            | RetryState::Exhausted { attempts }
            | RetryState::Cancelled { attempts } => attempts,
        }
    }
}

/// How one attempt ended once the world state has been consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Installed: clean exit, or a passing post-check after timeout/repair.
    Confirmed,
    /// Not installed.
    Unconfirmed,
    /// The run was cancelled while the attempt was in flight.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Idle,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Start the next attempt. Returns its 1-based number, or `None` when
    /// no attempt may start from the current state.
    pub fn begin(&mut self) -> Option<u32> {
        let next = match self.state {
            RetryState::Idle => 1,
            RetryState::Retrying { attempt, .. } => attempt + 1,
            _ => return None,
        };
        self.state = RetryState::Attempting { attempt: next };
        Some(next)
    }

    /// Record the verdict of the attempt in progress.
    pub fn record(&mut self, verdict: AttemptVerdict) -> RetryState {
        let RetryState::Attempting { attempt } = self.state else {
            return self.state;
        };
        self.state = match verdict {
            AttemptVerdict::Confirmed => RetryState::Succeeded { attempts: attempt },
            AttemptVerdict::Interrupted => RetryState::Cancelled { attempts: attempt },
            AttemptVerdict::Unconfirmed if attempt >= self.policy.max_attempts => {
                RetryState::Exhausted { attempts: attempt }
            }
            AttemptVerdict::Unconfirmed => RetryState::Retrying {
                attempt,
                delay: self.policy.next_delay(attempt),
            },
        };
        self.state
    }

    /// Cancellation during backoff (or before the first attempt).
    pub fn cancel(&mut self) -> RetryState {
        if !self.state.is_terminal() {
            self.state = RetryState::Cancelled {
                attempts: self.state.attempts(),
            };
        }
        self.state
    }
}
