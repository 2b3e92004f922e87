//! The modes `batchup` can run in.
use std::io::{self, Write};
use thiserror::Error;

pub mod backup;
pub mod orphans;

use crate::config::Config;
use crate::interrupt::Interrupt;
use crate::paths;
use crate::rules::{self, RulesGlobs};

pub use self::backup::run_backup;
pub use self::orphans::find_orphans;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum Error {
    /// The root and backup directory don't fit together.
    #[error("invalid configuration: {0}")]
    Derivation(#[from] paths::Error),
    /// The rules file could not be read or expanded.
    #[error("invalid rules: {0}")]
    Rules(#[from] rules::Error),
    /// An error occurred while backing up.
    #[error("failed to back up: {0}")]
    Backup(#[from] backup::Error),
    /// An error occurred while looking for orphans.
    #[error("failed to list orphans: {0}")]
    Orphans(#[from] orphans::Error),
    /// Orphans could not be written out.
    #[error("failed to write orphan list: {0}")]
    Output(#[source] io::Error),
}

impl Error {
    /// Whether the run stopped because of an interrupt rather than a failure.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Backup(backup::Error::Interrupted(_)))
    }
}

/// The available modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Command {
    /// Back up everything the rules select.
    #[default]
    Backup,
    /// List files in the backup directory that no longer have a source.
    Orphans,
}

impl Command {
    /// Run this command, printing orphans (if any) to stdout.
    ///
    /// # Errors
    ///
    /// See [`Error`].
    pub fn run(self, config: &Config, interrupt: &Interrupt) -> Result<(), Error> {
        self.run_with_output(config, interrupt, &mut io::stdout().lock())
    }

    /// Run this command, writing orphans (if any) to `out`, one per line.
    ///
    /// # Errors
    ///
    /// See [`Error`].
    pub fn run_with_output(
        self,
        config: &Config,
        interrupt: &Interrupt,
        out: &mut impl Write,
    ) -> Result<(), Error> {
        // Checked before the rules so a bad root never touches the filesystem.
        let derivation = config.target_derivation()?;
        let rules = RulesGlobs::from_file(config.rules_path())?.expand(&config.backup_dir)?;
        tracing::debug!(
            exec = rules.exec.len(),
            copy = rules.copy.len(),
            zip = rules.zip.len(),
            "expanded rules"
        );

        match self {
            Self::Backup => run_backup(&rules, &derivation, config.into(), interrupt)?,
            Self::Orphans => {
                let orphans =
                    find_orphans(&rules, &derivation, config.keep_symlinks, derivation.backup_dir())?;
                for orphan in orphans {
                    writeln!(out, "{}", orphan?.display()).map_err(Error::Output)?;
                }
            }
        }

        Ok(())
    }
}
