//! Deciding whether a backup target is out of date.
//!
//! Staleness is decided by modification time alone. Some filesystems (FAT in particular)
//! store times with a resolution of a couple of seconds, and devices may disagree slightly
//! about the current time, so a source has to be more than [`TOLERANCE`] newer than its
//! target before the target counts as stale.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

use crate::tree::{self, list_included, NOTHING};

/// How much newer a source must be than its target to be copied again.
pub const TOLERANCE: Duration = Duration::from_secs(10);

/// Errors that may occur while comparing modification times.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not read a modification time.
    #[error("failed to read modification time of {path:?}: {error}")]
    ModifiedTime {
        /// The path whose metadata was read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
    /// Could not walk the tree being archived.
    #[error("failed to walk archive source: {0}")]
    Tree(#[from] tree::Error),
}

/// Whether a source modified at `source` should replace a target modified at `target`.
#[must_use]
pub fn is_newer(source: SystemTime, target: SystemTime) -> bool {
    source
        .duration_since(target)
        .map_or(false, |difference| difference > TOLERANCE)
}

/// The modification time of `path` itself, not of whatever it links to.
fn modified(path: &Path) -> Result<SystemTime, Error> {
    fs::symlink_metadata(path)
        .and_then(|metadata| metadata.modified())
        .map_err(|error| Error::ModifiedTime {
            path: path.to_path_buf(),
            error,
        })
}

/// Whether `target` needs to be (re)written from `source`.
///
/// A missing target is always stale. Links are compared by their own times.
///
/// # Errors
///
/// [`Error::ModifiedTime`] if either modification time cannot be read.
pub fn is_stale(source: &Path, target: &Path) -> Result<bool, Error> {
    match fs::symlink_metadata(target) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(error) => {
            return Err(Error::ModifiedTime {
                path: target.to_path_buf(),
                error,
            })
        }
        Ok(_) => {}
    }

    Ok(is_newer(modified(source)?, modified(target)?))
}

/// Whether any file under `dir` changed since `archive` was written.
///
/// Stops walking at the first stale file. A missing archive always needs updating.
///
/// # Errors
///
/// Any error while walking `dir` or reading modification times.
pub fn needs_archive_update(dir: &Path, archive: &Path, keep_symlinks: bool) -> Result<bool, Error> {
    if !archive.exists() {
        return Ok(true);
    }

    for entry in list_included(dir, &NOTHING, keep_symlinks) {
        let entry = entry?;
        if is_stale(&entry, archive)? {
            tracing::trace!(path = %entry.display(), "changed since archived");
            return Ok(true);
        }
    }

    Ok(false)
}
