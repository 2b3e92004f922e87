//! Finding files in the backup directory that nothing backs up any more.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use itertools::Either;
use thiserror::Error;

use crate::paths::{self, TargetDerivation};
use crate::rules::Rules;
use crate::tree::{self, list_included, NOTHING};

/// Errors that may occur while looking for orphans.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not walk a source tree or the backup directory.
    #[error("failed to walk tree: {0}")]
    Tree(#[from] tree::Error),
    /// A source path has no backup target.
    #[error("failed to derive backup target: {0}")]
    Target(#[from] paths::Error),
}

/// Every path a backup with `rules` would produce.
///
/// # Errors
///
/// Any error while walking the source trees or deriving targets.
pub fn expected_targets(
    rules: &Rules,
    derivation: &TargetDerivation,
    keep_symlinks: bool,
) -> Result<HashSet<PathBuf>, Error> {
    let mut expected = HashSet::new();

    for tree in &rules.copy {
        for source in list_included(tree, &rules.ignore, keep_symlinks) {
            expected.insert(derivation.derive(&source?)?);
        }
    }

    for tree in &rules.zip {
        expected.insert(derivation.archive_path(tree)?);
    }

    Ok(expected)
}

/// Lazily yield every path in `backup_dir` that is not an expected target of `rules`.
///
/// The backup directory is walked in full: links are listed as themselves and nothing is
/// ignored. A backup directory that does not exist yet has no orphans.
///
/// # Errors
///
/// Errors building the expected set are returned up front. Errors walking `backup_dir` are
/// yielded by the iterator.
pub fn find_orphans(
    rules: &Rules,
    derivation: &TargetDerivation,
    keep_symlinks: bool,
    backup_dir: &Path,
) -> Result<impl Iterator<Item = Result<PathBuf, Error>>, Error> {
    let backup_dir = paths::absolute(backup_dir)?;
    if !backup_dir.exists() {
        tracing::debug!("backup directory {} does not exist", backup_dir.display());
        return Ok(Either::Left(std::iter::empty::<Result<PathBuf, Error>>()));
    }

    let expected = expected_targets(rules, derivation, keep_symlinks)?;
    tracing::debug!("expecting {} backup targets", expected.len());

    let orphans = list_included(&backup_dir, &NOTHING, true).filter_map(move |item| match item {
        Ok(path) if expected.contains(&path) => None,
        Ok(path) => Some(Ok(path)),
        Err(err) => Some(Err(Error::from(err))),
    });

    Ok(Either::Right(orphans))
}
