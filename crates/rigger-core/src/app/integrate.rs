//! Bin-directory integration for built executables and documentation.
//!
//! Both operations are create-if-absent: re-running a run leaves the bin
//! directory as it was. Files rigger did not create are never replaced.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

const VIEWER_MARKER: &str = "# rigger documentation viewer";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{0} already exists and was not created by rigger")]
    Occupied(PathBuf),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> LinkError + '_ {
    move |source| LinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Expose `target` as `<bin_dir>/<name>`. An existing symlink is repointed;
/// anything else at that path is left alone.
pub async fn link_executable(bin_dir: &Path, name: &str, target: &Path) -> Result<PathBuf, LinkError> {
    tokio::fs::create_dir_all(bin_dir).await.map_err(io_err(bin_dir))?;
    let link = bin_dir.join(name);
    let target = tokio::fs::canonicalize(target)
        .await
        .unwrap_or_else(|_| target.to_path_buf());

    match tokio::fs::symlink_metadata(&link).await {
        Ok(meta) if meta.file_type().is_symlink() => {
            if tokio::fs::read_link(&link).await.ok().as_deref() == Some(target.as_path()) {
                return Ok(link);
            }
            tokio::fs::remove_file(&link).await.map_err(io_err(&link))?;
        }
        Ok(_) => return Err(LinkError::Occupied(link)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(&link)(err)),
    }

    #[cfg(unix)]
    tokio::fs::symlink(&target, &link).await.map_err(io_err(&link))?;
    #[cfg(not(unix))]
    tokio::fs::copy(&target, &link).await.map_err(io_err(&link))?;

    Ok(link)
}

fn viewer_script(readme: &Path) -> String {
    let quoted = readme.to_string_lossy().replace('\'', r"'\''");
    format!("#!/bin/sh\n{VIEWER_MARKER}\nexec ${{PAGER:-less}} '{quoted}'\n")
}

/// Write `<bin_dir>/<id>-docs`, a wrapper that pages `readme`.
pub async fn write_doc_viewer(bin_dir: &Path, id: &str, readme: &Path) -> Result<PathBuf, LinkError> {
    tokio::fs::create_dir_all(bin_dir).await.map_err(io_err(bin_dir))?;
    let path = bin_dir.join(format!("{id}-docs"));
    let readme = tokio::fs::canonicalize(readme)
        .await
        .unwrap_or_else(|_| readme.to_path_buf());

    match tokio::fs::read_to_string(&path).await {
        Ok(existing) if !existing.contains(VIEWER_MARKER) => return Err(LinkError::Occupied(path)),
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(&path)(err)),
    }

    tokio::fs::write(&path, viewer_script(&readme))
        .await
        .map_err(io_err(&path))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(io_err(&path))?;
    }
    Ok(path)
}
