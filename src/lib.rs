//! `batchup` mirrors files selected by a rules file into a backup directory.
//!
//! A rules file lists globs under four sections:
//!
//! ```ignore
//! ; run these programs first
//! [exec]
//! /home/me/bin/dump-database
//!
//! ; mirror these trees file by file
//! [copy]
//! /home/me/Documents
//! /etc/**/*.conf
//!
//! ; archive each of these directories as one zip file
//! [zip]
//! /home/me/Mail
//!
//! ; never back up anything matching these
//! [ignore]
//! **/.cache/
//! *.tmp
//! ```
//!
//! Every source path is mapped into the backup directory relative to a root (the filesystem
//! root unless configured otherwise), so `/home/me/Documents/a.txt` becomes
//! `<backup_dir>/home/me/Documents/a.txt`. A file is only copied when it is more than
//! [`stale::TOLERANCE`] newer than its backup, which makes running the same rules twice a
//! no-op the second time.
//!
//! Files in the backup directory that no rule produces any more can be listed with the
//! [`Command::Orphans`](command::Command::Orphans) mode.
//!
//! See [`run`] for the library entry point.
#![deny(clippy::all, missing_docs)]

pub mod archive;
pub mod command;
pub mod config;
pub mod filters;
pub mod interrupt;
pub mod logging;
pub mod paths;
pub mod rules;
pub mod stale;
pub mod tree;

pub use config::Config;
pub use interrupt::Interrupt;

/// The error returned by [`run`].
pub type Error = command::Error;

/// Run the mode selected by `config`.
///
/// Logging goes to whatever `tracing` subscriber is current. Interrupts are only acted on if
/// something feeds them into `interrupt`, e.g. [`interrupt::listen`].
///
/// # Errors
///
/// Any error from the selected [`Command`](command::Command).
pub fn run(config: &Config, interrupt: &Interrupt) -> Result<(), Error> {
    tracing::debug!(?config, "running batchup");
    config.mode().run(config, interrupt)
}
