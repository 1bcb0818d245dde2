//! Concrete implementations of the ports.

pub mod apt;
pub mod git;
pub mod hook;
pub mod manual_script;
pub mod pipx;
pub mod proc_probe;
pub mod process_shell;

pub use apt::AptAdapter;
pub use git::GitAdapter;
pub use hook::TracingHook;
pub use manual_script::ScriptManualHelper;
pub use pipx::PipxAdapter;
pub use proc_probe::ProcProbe;
pub use process_shell::ProcessShell;
