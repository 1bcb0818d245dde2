//! Build/install strategies for source-repository tasks.

use serde::{Deserialize, Serialize};

/// Compiled-language toolchain behind a module marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toolchain {
    Go,
    Cargo,
}

/// Selected procedure for a fetched repository. Tagged so ledgers stay
/// readable as JSON: `{"kind":"compiled_module","toolchain":"go"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// A package-build descriptor (setup.py, pyproject with packaging tables).
    PackagedLibrary { manifest: String },

    /// A flat dependency list; `then_package` when a non-packaging
    /// pyproject.toml is also present and is installed afterwards.
    DependencyManifest { manifest: String, then_package: bool },

    CompiledModule { toolchain: Toolchain },

    GenericBuild { build_file: String },

    InstallScript { script: String },

    /// Fallback. `readme` is the README-like file to expose, if any.
    Documentation { readme: Option<String> },
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::PackagedLibrary { .. } => "packaged-library",
            Strategy::DependencyManifest { .. } => "dependency-manifest",
            Strategy::CompiledModule { toolchain: Toolchain::Go } => "Go module",
            Strategy::CompiledModule { toolchain: Toolchain::Cargo } => "Cargo crate",
            Strategy::GenericBuild { .. } => "generic build",
            Strategy::InstallScript { .. } => "install script",
            Strategy::Documentation { .. } => "documentation",
        }
    }

    /// Strategies after which the working tree is searched for a new
    /// executable.
    pub fn produces_executable(&self) -> bool {
        matches!(
            self,
            Strategy::CompiledModule { .. } | Strategy::GenericBuild { .. }
        )
    }
}
