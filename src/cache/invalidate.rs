//! Artifact invalidation.
//!
//! Both operations work on the filesystem only and report success as a
//! boolean. Index records are left for the expiry sweep.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use super::resolver::join_paths;

const FORGET_EXTENSIONS: [&str; 2] = ["html", "json"];

/// Remove `{root}/{slug}.html` and `{root}/{slug}.json`.
///
/// Returns true when at least one of them existed and was removed.
pub fn forget(root: &str, slug: &str) -> bool {
    if has_traversal(slug) {
        warn!(
            op = "cache::forget",
            result = "rejected",
            slug,
            "Refusing to forget a slug that escapes the cache root"
        );
        return false;
    }

    let mut removed = false;
    for extension in FORGET_EXTENSIONS {
        let path = PathBuf::from(join_paths(&[root, &format!("{slug}.{extension}")]));
        removed |= remove_file(&path);
    }
    removed
}

/// Empty the cache root, or `{root}/{subpath}` when given.
///
/// The target directory itself is kept. Returns false when the target is
/// not a directory or when any entry could not be removed.
pub fn clear(root: &str, subpath: Option<&str>) -> bool {
    let subpath = subpath.unwrap_or_default();
    if has_traversal(subpath) {
        warn!(
            op = "cache::clear",
            result = "rejected",
            subpath,
            "Refusing to clear a directory outside the cache root"
        );
        return false;
    }

    let target = PathBuf::from(join_paths(&[root, subpath]));
    if !target.is_dir() {
        debug!(
            op = "cache::clear",
            result = "missing",
            path = %target.display(),
            "Nothing to clear"
        );
        return false;
    }

    let entries = match fs::read_dir(&target) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                op = "cache::clear",
                result = "error",
                path = %target.display(),
                error = %err,
                "Failed to list cache directory"
            );
            return false;
        }
    };

    let mut cleared = true;
    for entry in entries {
        let outcome = entry.and_then(|entry| {
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            }
        });

        if let Err(err) = outcome {
            warn!(
                op = "cache::clear",
                result = "error",
                path = %target.display(),
                error = %err,
                "Failed to remove cache entry"
            );
            cleared = false;
        }
    }

    cleared
}

fn remove_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            warn!(
                op = "cache::forget",
                result = "error",
                path = %path.display(),
                error = %err,
                "Failed to remove cached artifact"
            );
            false
        }
    }
}

fn has_traversal(relative: &str) -> bool {
    relative.split(['/', '\\']).any(|segment| segment == "..")
}
