//! Artifact persistence.
//!
//! Bodies are staged in a temporary file next to the target and renamed into
//! place, so a reader sees either the previous artifact or the new one in
//! full. Same-path writers inside one process are additionally serialized.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::debug;

use super::{error::CacheError, lock::PathLocks, resolver::ResolvedPath};

const STAGING_PREFIX: &str = ".pagecache-";

pub struct ArtifactWriter {
    file_mode: u32,
    locks: PathLocks,
}

impl ArtifactWriter {
    pub fn new(file_mode: u32) -> Self {
        Self {
            file_mode,
            locks: PathLocks::new(),
        }
    }

    /// Write `content` to the resolved location, returning the final path.
    pub fn write(&self, resolved: &ResolvedPath, content: &[u8]) -> Result<PathBuf, CacheError> {
        let directory = PathBuf::from(resolved.directory());
        fs::create_dir_all(&directory).map_err(|err| CacheError::io(&directory, err))?;

        let target = resolved.file_path();
        let _guard = self.locks.lock(&target);

        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&directory)
            .map_err(|err| CacheError::io(&directory, err))?;

        let staged_path = staged.path().to_path_buf();
        staged
            .write_all(content)
            .map_err(|err| CacheError::io(&staged_path, err))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|err| CacheError::io(&staged_path, err))?;
        apply_mode(staged.as_file(), self.file_mode)
            .map_err(|err| CacheError::io(&staged_path, err))?;

        staged
            .persist(&target)
            .map_err(|err| CacheError::io(&target, err.error))?;

        debug!(
            op = "cache::write",
            path = %target.display(),
            bytes = content.len(),
            "Artifact written"
        );

        Ok(target)
    }
}

/// True for leftovers of an interrupted write.
pub fn is_staging_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(STAGING_PREFIX))
}

#[cfg(unix)]
fn apply_mode(file: &fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_mode(_file: &fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
