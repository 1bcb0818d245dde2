//! Ports: the seams between the engine and the outside world.
//!
//! - `ShellExecutor`: subprocesses with deadlines
//! - `SourceAdapter`: one per source kind (apt, pipx, git)
//! - `ResourceProbe`: host load / memory
//! - `ManualHelper`, `IntegrationHook`: collaborators outside the core

pub mod adapter;
pub mod hook;
pub mod manual;
pub mod probe;
pub mod shell;

pub use self::adapter::{AdapterError, Delivery, InstallReport, SourceAdapter};
pub use self::hook::IntegrationHook;
pub use self::manual::ManualHelper;
pub use self::probe::ResourceProbe;
pub use self::shell::{CommandSpec, ExitClass, ShellError, ShellExecutor, ShellOutput, TaskLog};
