//! Walking source trees and classifying every path found.
//!
//! [`Classify`] lazily walks a tree depth-first, in directory listing order. For each path it
//! decides, in this order:
//!
//! 1. Ignored, if any ignore pattern matches. Ignored directories are never descended into.
//! 2. A symbolic link: [`Category::Included`] when keeping symlinks, otherwise
//!    [`Category::SkippedSymlink`]. Links are never followed.
//! 3. A regular file: [`Category::Included`].
//! 4. A directory: its children are visited. The directory itself is not yielded.
//!
//! Anything else (sockets, device files, paths that vanish mid-walk) is an [`Error`].
use std::fmt;
use std::fs::{self, ReadDir};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::filters::IgnoreFilter;

/// Errors that may occur while walking a tree.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not read the metadata of a path, e.g. because it no longer exists.
    #[error("can't process path {path:?}: {error}")]
    Metadata {
        /// The path being classified.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
    /// Could not list a directory.
    #[error("cannot read directory {path:?}: {error}")]
    ReadDir {
        /// The directory being listed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
    /// The path is neither a regular file, a directory, nor a symbolic link.
    #[error("can't process path {0:?}: not a file, directory, or symlink")]
    Unsupported(PathBuf),
}

/// An ignore set that matches nothing, for walking trees in full.
pub static NOTHING: IgnoreFilter = IgnoreFilter::empty();

/// What happens to a path found while walking a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// The path is backed up.
    Included,
    /// The path matched an ignore pattern.
    Ignored,
    /// The path is a symbolic link and links are not being kept.
    SkippedSymlink,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Included => write!(f, "Included"),
            Self::Ignored => write!(f, "Ignored"),
            Self::SkippedSymlink => write!(f, "Skipping symlink"),
        }
    }
}

/// Lazy, depth-first classification of every path under a root.
///
/// Created by [`classify`].
#[derive(Debug)]
pub struct Classify<'a> {
    ignore: &'a IgnoreFilter,
    keep_symlinks: bool,
    root: Option<PathBuf>,
    dirs: Vec<(PathBuf, ReadDir)>,
}

/// Walk the tree at `path`, classifying everything under it.
///
/// Nothing is touched on disk until the returned iterator is advanced.
#[must_use]
pub fn classify<'a>(path: &Path, ignore: &'a IgnoreFilter, keep_symlinks: bool) -> Classify<'a> {
    Classify {
        ignore,
        keep_symlinks,
        root: Some(path.to_path_buf()),
        dirs: Vec::new(),
    }
}

/// Walk the tree at `path`, yielding only [`Category::Included`] paths.
pub fn list_included<'a>(
    path: &Path,
    ignore: &'a IgnoreFilter,
    keep_symlinks: bool,
) -> impl Iterator<Item = Result<PathBuf, Error>> + 'a {
    classify(path, ignore, keep_symlinks).filter_map(|item| match item {
        Ok((path, Category::Included)) => Some(Ok(path)),
        Ok(_) => None,
        Err(err) => Some(Err(err)),
    })
}

enum Visit {
    Yield(Category),
    Descend(ReadDir),
}

impl<'a> Classify<'a> {
    fn visit(&self, path: &Path) -> Result<Visit, Error> {
        // `is_dir` follows links so a link to a directory matches directory globs too.
        if self.ignore.is_ignored(path, path.is_dir()) {
            return Ok(Visit::Yield(Category::Ignored));
        }

        let file_type = fs::symlink_metadata(path)
            .map_err(|error| Error::Metadata {
                path: path.to_path_buf(),
                error,
            })?
            .file_type();

        if file_type.is_symlink() {
            if self.keep_symlinks {
                Ok(Visit::Yield(Category::Included))
            } else {
                Ok(Visit::Yield(Category::SkippedSymlink))
            }
        } else if file_type.is_file() {
            Ok(Visit::Yield(Category::Included))
        } else if file_type.is_dir() {
            fs::read_dir(path)
                .map(Visit::Descend)
                .map_err(|error| Error::ReadDir {
                    path: path.to_path_buf(),
                    error,
                })
        } else {
            Err(Error::Unsupported(path.to_path_buf()))
        }
    }

    fn next_path(&mut self) -> Option<Result<PathBuf, Error>> {
        if let Some(root) = self.root.take() {
            return Some(Ok(root));
        }

        while let Some((dir, entries)) = self.dirs.last_mut() {
            match entries.next() {
                Some(Ok(entry)) => return Some(Ok(entry.path())),
                Some(Err(error)) => {
                    let path = dir.clone();
                    self.dirs.clear();
                    return Some(Err(Error::ReadDir { path, error }));
                }
                None => {
                    self.dirs.pop();
                }
            }
        }

        None
    }
}

impl<'a> Iterator for Classify<'a> {
    type Item = Result<(PathBuf, Category), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let path = match self.next_path()? {
                Ok(path) => path,
                Err(err) => return Some(Err(err)),
            };

            match self.visit(&path) {
                Ok(Visit::Yield(category)) => {
                    tracing::trace!(path = %path.display(), %category, "classified");
                    return Some(Ok((path, category)));
                }
                Ok(Visit::Descend(entries)) => self.dirs.push((path, entries)),
                Err(err) => {
                    self.dirs.clear();
                    return Some(Err(err));
                }
            }
        }
    }
}
