//! Queue module: admission lanes, retry policy and the retry state machine.

mod lanes;
mod lease;
mod retry;
mod state;

pub use lanes::TaskQueue;
pub use lease::QueueLease;
pub use retry::RetryPolicy;
pub use state::{AttemptVerdict, RetryMachine, RetryState};
