//! Strategy detection for source repositories.
//!
//! Detection is a fixed, ordered list of pure predicates over the top level
//! of a checkout; the first rule that matches wins. The order is part of the
//! contract: a checkout with both `requirements.txt` and `go.mod` is always a
//! dependency-manifest install.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::domain::{Strategy, Toolchain};

/// Top-level view of a checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoLayout {
    files: BTreeSet<String>,
    dirs: BTreeSet<String>,
    pyproject: Option<String>,
}

impl RepoLayout {
    pub fn scan(root: &Path) -> io::Result<Self> {
        let mut layout = RepoLayout::default();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                layout.dirs.insert(name);
            } else {
                layout.files.insert(name);
            }
        }
        if layout.has("pyproject.toml") {
            layout.pyproject = std::fs::read_to_string(root.join("pyproject.toml")).ok();
        }
        Ok(layout)
    }

    pub fn from_entries<'a>(files: impl IntoIterator<Item = &'a str>) -> Self {
        RepoLayout {
            files: files.into_iter().map(str::to_string).collect(),
            ..RepoLayout::default()
        }
    }

    pub fn with_pyproject(mut self, text: &str) -> Self {
        self.files.insert("pyproject.toml".to_string());
        self.pyproject = Some(text.to_string());
        self
    }

    fn has(&self, name: &str) -> bool {
        self.files.contains(name)
    }

    fn first_of(&self, names: &[&str]) -> Option<String> {
        names.iter().find(|name| self.has(name)).map(|name| name.to_string())
    }

    fn declares_build(&self) -> bool {
        self.pyproject
            .as_deref()
            .is_some_and(|text| text.contains("[project]") || text.contains("[build-system]"))
    }
}

type Rule = fn(&RepoLayout) -> Option<Strategy>;

/// Evaluated top to bottom.
const RULES: [Rule; 5] = [
    packaged_library,
    dependency_manifest,
    compiled_module,
    generic_build,
    install_script,
];

pub fn detect(layout: &RepoLayout) -> Strategy {
    RULES
        .iter()
        .find_map(|rule| rule(layout))
        .unwrap_or_else(|| documentation(layout))
}

fn packaged_library(layout: &RepoLayout) -> Option<Strategy> {
    let manifest = layout
        .first_of(&["setup.py", "setup.cfg"])
        .or_else(|| layout.declares_build().then(|| "pyproject.toml".to_string()))?;
    Some(Strategy::PackagedLibrary { manifest })
}

fn dependency_manifest(layout: &RepoLayout) -> Option<Strategy> {
    let manifest = layout.first_of(&["requirements.txt"])?;
    // A pyproject without build tables may still be pip-installable.
    let then_package = layout.has("pyproject.toml");
    Some(Strategy::DependencyManifest {
        manifest,
        then_package,
    })
}

fn compiled_module(layout: &RepoLayout) -> Option<Strategy> {
    if layout.has("go.mod") {
        Some(Strategy::CompiledModule {
            toolchain: Toolchain::Go,
        })
    } else if layout.has("Cargo.toml") {
        Some(Strategy::CompiledModule {
            toolchain: Toolchain::Cargo,
        })
    } else {
        None
    }
}

fn generic_build(layout: &RepoLayout) -> Option<Strategy> {
    let build_file = layout.first_of(&["Makefile", "makefile", "GNUmakefile", "CMakeLists.txt"])?;
    Some(Strategy::GenericBuild { build_file })
}

fn install_script(layout: &RepoLayout) -> Option<Strategy> {
    let script = layout.first_of(&["install.sh", "install", "setup.sh"])?;
    Some(Strategy::InstallScript { script })
}

fn documentation(layout: &RepoLayout) -> Strategy {
    let readme = layout
        .files
        .iter()
        .find(|name| name.to_ascii_lowercase().starts_with("readme"))
        .cloned();
    Strategy::Documentation { readme }
}

/// Regular file with any execute bit set.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Directories (relative to the checkout) where builds commonly drop
/// binaries, besides the top level.
const BIN_DIRS: [&str; 5] = ["bin", "build", "dist", "out", "target/release"];

/// Executables and their mtimes, taken before a build step.
pub type ExecutableSnapshot = HashMap<PathBuf, SystemTime>;

fn candidates(root: &Path) -> Vec<(PathBuf, SystemTime, bool)> {
    let dirs = std::iter::once((root.to_path_buf(), false))
        .chain(BIN_DIRS.iter().map(|dir| (root.join(dir), true)));

    let mut found = Vec::new();
    for (dir, bin_like) in dirs {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_executable(&path) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((path, modified, bin_like));
        }
    }
    found
}

pub fn snapshot_executables(root: &Path) -> ExecutableSnapshot {
    candidates(root)
        .into_iter()
        .map(|(path, modified, _)| (path, modified))
        .collect()
}

/// Executable produced (or rewritten) since `before`.
///
/// Preference: file stem matching the repository name, then files in a
/// bin-like directory, then path order.
pub fn find_new_executable(
    root: &Path,
    repo_name: &str,
    before: &ExecutableSnapshot,
) -> Option<PathBuf> {
    let wanted = repo_name.to_ascii_lowercase();
    candidates(root)
        .into_iter()
        .filter(|(path, modified, _)| before.get(path) != Some(modified))
        .min_by_key(|(path, _, bin_like)| {
            let matches = path
                .file_stem()
                .is_some_and(|stem| stem.to_string_lossy().to_ascii_lowercase() == wanted);
            (!matches, !bin_like, path.clone())
        })
        .map(|(path, _, _)| path)
}
