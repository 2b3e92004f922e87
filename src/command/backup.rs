//! The backup run: execute programs, then mirror `[copy]` trees, then archive `[zip]` trees.
//!
//! Every change to the filesystem happens inside [`Interrupt::guarded`], so a single Ctrl-C
//! never leaves a half-written file behind.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};
use thiserror::Error;

use crate::archive;
use crate::config::Config;
use crate::interrupt::{Interrupt, Interrupted};
use crate::paths::{self, TargetDerivation};
use crate::rules::Rules;
use crate::stale;
use crate::tree::{self, classify, Category};

/// Errors that may occur while backing up.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not walk a source tree.
    #[error("failed to walk source tree: {0}")]
    Tree(#[from] tree::Error),
    /// A source path has no backup target.
    #[error("failed to derive backup target: {0}")]
    Target(#[from] paths::Error),
    /// Could not decide whether a target is up to date.
    #[error("failed to check whether backup is up to date: {0}")]
    Stale(#[from] stale::Error),
    /// Could not create the parent directories of a target.
    #[error("failed to create directory {path:?}: {error}")]
    CreateDir {
        /// The directory being created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
    /// Could not copy a file or link.
    #[error("failed to copy {src:?} to {dest:?}: {error}")]
    Copy {
        /// The source path.
        src: PathBuf,
        /// The backup target.
        dest: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
    /// Could not write an archive.
    #[error("failed to zip {src:?} into {dest:?}: {error}")]
    Archive {
        /// The tree being archived.
        src: PathBuf,
        /// The archive being written.
        dest: PathBuf,
        /// The underlying error.
        #[source]
        error: archive::Error,
    },
    /// A `[zip]` entry is not a directory.
    #[error("cannot zip {0:?}: not a directory")]
    NotADirectory(PathBuf),
    /// Could not start an `[exec]` program.
    #[error("failed to execute {path:?}: {error}")]
    Exec {
        /// The program.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
    /// An `[exec]` program did not exit successfully.
    #[error("{path:?} exited unsuccessfully ({status})")]
    ExecFailed {
        /// The program.
        path: PathBuf,
        /// How it exited.
        status: ExitStatus,
    },
    /// Stopped after an interrupt.
    #[error("{0}")]
    Interrupted(#[from] Interrupted),
}

/// Flags that change how a backup runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Only log what would be done.
    pub dry_run: bool,
    /// Copy symlinks as links instead of skipping them.
    pub keep_symlinks: bool,
}

impl From<&Config> for Options {
    fn from(config: &Config) -> Self {
        Self {
            dry_run: config.dry_run,
            keep_symlinks: config.keep_symlinks,
        }
    }
}

/// Run every `[exec]` program, then back up every `[copy]` and `[zip]` tree.
///
/// Stops at the first error.
///
/// # Errors
///
/// Any [`Error`] from the passes.
pub fn run_backup(
    rules: &Rules,
    derivation: &TargetDerivation,
    options: Options,
    interrupt: &Interrupt,
) -> Result<(), Error> {
    for program in &rules.exec {
        execute(program, options, interrupt)?;
    }

    for tree in &rules.copy {
        copy_tree(tree, rules, derivation, options, interrupt)?;
    }

    for tree in &rules.zip {
        zip_tree(tree, derivation, options, interrupt)?;
    }

    Ok(())
}

fn execute(program: &Path, options: Options, interrupt: &Interrupt) -> Result<(), Error> {
    if options.dry_run {
        tracing::warn!("Would execute: {}", program.display());
        return Ok(());
    }

    tracing::warn!("Executing: {}", program.display());
    let status = interrupt.guarded(|| {
        process::Command::new(program)
            .status()
            .map_err(|error| Error::Exec {
                path: program.to_path_buf(),
                error,
            })
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::ExecFailed {
            path: program.to_path_buf(),
            status,
        })
    }
}

/// Copy every included, stale path under `tree` to its backup target.
///
/// # Errors
///
/// Any error while walking `tree` or copying.
pub fn copy_tree(
    tree: &Path,
    rules: &Rules,
    derivation: &TargetDerivation,
    options: Options,
    interrupt: &Interrupt,
) -> Result<(), Error> {
    let _span = tracing::debug_span!("copy_tree", tree = %tree.display()).entered();

    for item in classify(tree, &rules.ignore, options.keep_symlinks) {
        let (path, category) = item?;
        match category {
            Category::Ignored => tracing::debug!("Ignored: {}", path.display()),
            Category::SkippedSymlink => tracing::info!("Skipping symlink: {}", path.display()),
            Category::Included => {
                let target = derivation.derive(&path)?;
                copy_file(&path, &target, options, interrupt)?;
            }
        }
    }

    Ok(())
}

fn copy_file(source: &Path, target: &Path, options: Options, interrupt: &Interrupt) -> Result<(), Error> {
    if !stale::is_stale(source, target)? {
        tracing::debug!("Up to date: {}", source.display());
        return Ok(());
    }

    if options.dry_run {
        tracing::warn!("Would copy: {}", source.display());
        return Ok(());
    }

    tracing::warn!("Copying: {}", source.display());
    interrupt.guarded(|| {
        create_parent(target)?;
        replace(source, target).map_err(|error| Error::Copy {
            src: source.to_path_buf(),
            dest: target.to_path_buf(),
            error,
        })
    })
}

/// Archive `tree` into its derived `.zip` target if anything in it changed.
///
/// # Errors
///
/// [`Error::NotADirectory`] if `tree` is not a directory, or any error while checking or
/// writing the archive.
pub fn zip_tree(
    tree: &Path,
    derivation: &TargetDerivation,
    options: Options,
    interrupt: &Interrupt,
) -> Result<(), Error> {
    if !tree.is_dir() {
        return Err(Error::NotADirectory(tree.to_path_buf()));
    }

    let target = derivation.archive_path(tree)?;
    if !stale::needs_archive_update(tree, &target, options.keep_symlinks)? {
        tracing::debug!("Up to date: {}", tree.display());
        return Ok(());
    }

    if options.dry_run {
        tracing::warn!("Would zip: {}", tree.display());
        return Ok(());
    }

    tracing::warn!("Zipping: {}", tree.display());
    interrupt.guarded(|| {
        create_parent(&target)?;
        archive::zip_directory(tree, &target, options.keep_symlinks).map_err(|error| {
            Error::Archive {
                src: tree.to_path_buf(),
                dest: target.clone(),
                error,
            }
        })
    })
}

fn create_parent(target: &Path) -> Result<(), Error> {
    match target.parent() {
        Some(parent) => {
            tracing::trace!(parent = %parent.display(), "ensuring parent dirs");
            fs::create_dir_all(parent).map_err(|error| Error::CreateDir {
                path: parent.to_path_buf(),
                error,
            })
        }
        None => Ok(()),
    }
}

/// Write `source` over `target`, recreating links as links.
fn replace(source: &Path, target: &Path) -> io::Result<()> {
    let source_is_link = fs::symlink_metadata(source)?.file_type().is_symlink();

    // Never write through a link left at the target.
    match fs::symlink_metadata(target) {
        Ok(metadata) if metadata.file_type().is_symlink() => remove_link(target)?,
        Ok(metadata) if source_is_link && metadata.is_file() => fs::remove_file(target)?,
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    if source_is_link {
        copy_symlink(source, target)
    } else {
        fs::copy(source, target).map(|_| ())
    }
}

#[cfg(unix)]
fn remove_link(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

#[cfg(windows)]
fn remove_link(path: &Path) -> io::Result<()> {
    fs::remove_file(path).or_else(|_| fs::remove_dir(path))
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(source)?, target)
}

#[cfg(windows)]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    let pointee = fs::read_link(source)?;
    if source.is_dir() {
        symlink_dir(pointee, target)
    } else {
        symlink_file(pointee, target)
    }
}
