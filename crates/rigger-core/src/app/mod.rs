//! App layer: wires the ports into a run.
//!
//! - **RunBuilder**: wiring and fail-fast validation
//! - **Orchestrator**: worker pool over the admission queue
//! - **Pipeline**: what a worker does with one task
//! - **RunContext / TaskContext**: run-scoped state handed to adapters

pub mod barrier;
pub mod builder;
pub mod context;
pub mod integrate;
pub mod pipeline;
pub mod scheduler;

pub use self::builder::RunBuilder;
pub use self::context::{RunContext, TaskContext};
pub use self::integrate::LinkError;
pub use self::pipeline::Pipeline;
pub use self::scheduler::{Orchestrator, RunOutcome};
