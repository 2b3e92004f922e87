//! Command-line configuration for a `batchup` run.
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::command::Command;
use crate::paths::{self, TargetDerivation};

/// Most `-v` flags that change anything.
const MAX_VERBOSITY: u8 = 2;

/// Back up files selected by a rules file into a backup directory.
///
/// Files are only copied when the source is newer than the existing backup, so running the
/// same rules twice copies nothing the second time.
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
#[command(name = "batchup", version)]
pub struct Config {
    /// Path to the rules file.
    pub rules: PathBuf,
    /// Path to the backup directory.
    pub backup_dir: PathBuf,
    /// Don't copy anything, just show what would be done.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
    /// Copy symlinks as links instead of skipping them.
    #[arg(short = 'l', long)]
    pub keep_symlinks: bool,
    /// The path that maps onto the backup directory. Defaults to the filesystem root.
    #[arg(short, long, value_name = "PATH")]
    pub root: Option<PathBuf>,
    /// List files in the backup directory that no longer have a source, instead of backing up.
    #[arg(short, long)]
    pub orphans: bool,
    /// Be more verbose. Can be used up to 2 times.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    /// A configuration with every flag unset.
    #[must_use]
    pub fn new(rules: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            rules: rules.into(),
            backup_dir: backup_dir.into(),
            dry_run: false,
            keep_symlinks: false,
            root: None,
            orphans: false,
            verbose: 0,
        }
    }

    /// The number of `-v` flags, capped at the most that have an effect.
    #[must_use]
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(MAX_VERBOSITY)
    }

    /// Which mode to run in.
    #[must_use]
    pub fn mode(&self) -> Command {
        if self.orphans {
            Command::Orphans
        } else {
            Command::Backup
        }
    }

    /// Set whether to only report what would be done.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set whether symlinks are copied as links.
    #[must_use]
    pub fn with_keep_symlinks(mut self, keep_symlinks: bool) -> Self {
        self.keep_symlinks = keep_symlinks;
        self
    }

    /// Set the path that maps onto the backup directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set whether to list orphans instead of backing up.
    #[must_use]
    pub fn with_orphans(mut self, orphans: bool) -> Self {
        self.orphans = orphans;
        self
    }

    /// Set the number of `-v` flags.
    #[must_use]
    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// The rules file.
    #[must_use]
    pub fn rules_path(&self) -> &Path {
        &self.rules
    }

    /// The backup directory as an absolute, normalized path.
    ///
    /// # Errors
    ///
    /// [`paths::Error::Absolute`] if the current directory cannot be read.
    pub fn backup_dir(&self) -> Result<PathBuf, paths::Error> {
        paths::absolute(&self.backup_dir)
    }

    /// The derivation of backup targets for this run.
    ///
    /// # Errors
    ///
    /// See [`TargetDerivation::select`].
    pub fn target_derivation(&self) -> Result<TargetDerivation, paths::Error> {
        TargetDerivation::select(self.root.as_deref(), &self.backup_dir)
    }
}
