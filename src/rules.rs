//! The rules file: which trees to copy, zip, or execute, and what to ignore.
//!
//! The format is a simplified INI file:
//!
//! ```text
//! ; comments start with a semicolon
//! /home/user/documents
//!
//! [exec]
//! /home/user/bin/dump-database
//!
//! [copy]
//! /home/user/.config/*
//!
//! [zip]
//! /home/user/photos/*
//!
//! [ignore]
//! **/.cache/
//! **.tmp
//! ```
//!
//! Lines before the first header belong to `[copy]`. Any other header is an error.
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use glob::{GlobError, MatchOptions, PatternError};
use itertools::Itertools;
use thiserror::Error;

use crate::filters::{self, IgnoreFilter, Pattern};
use crate::paths;

const COMMENT_PREFIX: &str = ";";

/// Errors that may occur while reading or expanding rules.
#[derive(Debug, Error)]
pub enum Error {
    /// The rules file could not be read.
    #[error("failed to read rules file {path:?}: {error}")]
    Read {
        /// The rules file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
    /// A line could not be read from the rules.
    #[error("failed to read rules: {0}")]
    ReadLine(#[source] io::Error),
    /// The rules contain headers other than `[exec]`, `[copy]`, `[zip]`, and `[ignore]`.
    #[error("unknown section(s): {}", .0.join(", "))]
    UnknownSections(Vec<String>),
    /// An ignore glob could not be compiled.
    #[error("invalid ignore rule: {0}")]
    Pattern(#[from] filters::Error),
    /// A path glob could not be parsed.
    #[error("invalid glob pattern \"{pattern}\": {error}")]
    InvalidGlob {
        /// The glob as written.
        pattern: String,
        /// The underlying error.
        #[source]
        error: PatternError,
    },
    /// A path could not be read while expanding a glob.
    #[error("failed to expand \"{pattern}\": {error}")]
    Expand {
        /// The glob as written.
        pattern: String,
        /// The underlying error.
        #[source]
        error: GlobError,
    },
    /// A relative path could not be made absolute.
    #[error("failed to resolve path: {0}")]
    Resolve(#[from] paths::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Exec,
    Copy,
    Zip,
    Ignore,
}

impl Section {
    fn from_header(header: &str) -> Option<Self> {
        match header {
            "[exec]" => Some(Self::Exec),
            "[copy]" => Some(Self::Copy),
            "[zip]" => Some(Self::Zip),
            "[ignore]" => Some(Self::Ignore),
            _ => None,
        }
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with(COMMENT_PREFIX)
}

fn is_header(line: &str) -> bool {
    line.starts_with('[') && line.ends_with(']')
}

/// The globs listed in each section of a rules file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulesGlobs {
    /// Programs to run before backing up.
    pub exec: Vec<String>,
    /// Trees to mirror file by file.
    pub copy: Vec<String>,
    /// Trees to archive as one zip file each.
    pub zip: Vec<String>,
    /// Paths never to copy.
    pub ignore: Vec<String>,
}

impl RulesGlobs {
    /// Read and parse the rules file at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::Read`] if the file cannot be opened, otherwise see [`RulesGlobs::parse`].
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        tracing::debug!("reading rules from {}", path.display());
        let file = fs::File::open(path).map_err(|error| Error::Read {
            path: path.to_path_buf(),
            error,
        })?;
        Self::parse(io::BufReader::new(file))
    }

    /// Parse rules from `reader`.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadLine`] if reading fails.
    /// - [`Error::UnknownSections`] listing every unrecognized header.
    pub fn parse(reader: impl BufRead) -> Result<Self, Error> {
        let mut rules = Self::default();
        let mut unknown: Vec<String> = Vec::new();
        let mut section = Some(Section::Copy);

        for line in reader.lines() {
            let line = line.map_err(Error::ReadLine)?;
            let line = line.trim_end();
            if line.is_empty() || is_comment(line) {
                continue;
            }

            if is_header(line) {
                section = Section::from_header(line);
                if section.is_none() && !unknown.iter().any(|header| header == line) {
                    unknown.push(line.to_owned());
                }
                continue;
            }

            let list = match section {
                Some(Section::Exec) => &mut rules.exec,
                Some(Section::Copy) => &mut rules.copy,
                Some(Section::Zip) => &mut rules.zip,
                Some(Section::Ignore) => &mut rules.ignore,
                None => continue,
            };
            list.push(line.to_owned());
        }

        if unknown.is_empty() {
            Ok(rules)
        } else {
            Err(Error::UnknownSections(unknown))
        }
    }

    /// Expand the globs against the filesystem and compile the ignore set.
    ///
    /// Expanded paths are made absolute, so relative globs resolve against the current
    /// directory. Besides the `[ignore]` globs, the ignore set contains every `[zip]` glob
    /// and the tree it expanded to, since archived trees are not copied file by file, and
    /// `backup_dir` itself, so the backup never copies itself.
    ///
    /// # Errors
    ///
    /// Any invalid glob or unreadable path found while expanding.
    pub fn expand(&self, backup_dir: &Path) -> Result<Rules, Error> {
        let zip = absolute_paths(expand_globs(&self.zip)?)?;

        let mut ignore = IgnoreFilter::new(self.ignore.iter().chain(&self.zip))?;
        for dir in zip.iter().chain(std::iter::once(&paths::absolute(backup_dir)?)) {
            let escaped = glob::Pattern::escape(&dir.to_string_lossy());
            ignore.push(Pattern::new(&escaped)?);
        }

        Ok(Rules {
            exec: absolute_paths(expand_globs(&self.exec)?)?,
            copy: absolute_paths(expand_globs(&self.copy)?)?,
            zip,
            ignore,
        })
    }
}

fn absolute_paths(expanded: Vec<PathBuf>) -> Result<Vec<PathBuf>, Error> {
    let absolute = expanded
        .iter()
        .map(|path| paths::absolute(path))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(absolute.into_iter().unique().collect())
}

impl FromStr for RulesGlobs {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.as_bytes())
    }
}

/// Rules with every glob expanded to the paths that currently exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rules {
    /// Programs to run before backing up.
    pub exec: Vec<PathBuf>,
    /// Trees to mirror file by file.
    pub copy: Vec<PathBuf>,
    /// Trees to archive as one zip file each.
    pub zip: Vec<PathBuf>,
    /// Paths never to copy.
    pub ignore: IgnoreFilter,
}

/// Every existing path matched by `globs`, without duplicates.
///
/// `*` stays within one path segment, `**` matches any depth, and wildcards do not match
/// a leading `.` unless written out.
///
/// # Errors
///
/// [`Error::InvalidGlob`] or [`Error::Expand`].
pub fn expand_globs(globs: &[String]) -> Result<Vec<PathBuf>, Error> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let mut paths = Vec::new();
    for pattern in globs {
        let matches = glob::glob_with(pattern, options).map_err(|error| Error::InvalidGlob {
            pattern: pattern.clone(),
            error,
        })?;
        let before = paths.len();
        for path in matches {
            paths.push(path.map_err(|error| Error::Expand {
                pattern: pattern.clone(),
                error,
            })?);
        }
        if paths.len() == before {
            tracing::debug!("no paths match {}", pattern);
        }
    }

    Ok(paths.into_iter().unique().collect())
}
