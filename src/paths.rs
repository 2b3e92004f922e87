//! Mapping between source paths and their location inside the backup directory.
//!
//! A [`TargetDerivation`] "mounts" a source root at the backup directory: the file
//! `<root>/a/b.txt` is backed up to `<backup_dir>/a/b.txt`. Without an explicit root, the
//! filesystem root is mounted, so `/home/user/notes.txt` lands at
//! `<backup_dir>/home/user/notes.txt`.
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};
use thiserror::Error;

/// Extension appended to the derived target of an archived tree.
pub const ARCHIVE_EXTENSION: &str = ".zip";

/// Errors that may occur while building or applying a [`TargetDerivation`].
#[derive(Debug, Error)]
pub enum Error {
    /// A relative path could not be resolved against the current directory.
    #[error("failed to resolve {path:?} to an absolute path: {error}")]
    Absolute {
        /// The relative path.
        path: PathBuf,
        /// The error from reading the current directory.
        #[source]
        error: io::Error,
    },
    /// The source root lies inside the backup directory, so the backup would contain itself.
    #[error("source root {root:?} must not be inside the backup directory {backup_dir:?}")]
    RootInsideBackup {
        /// The configured source root.
        root: PathBuf,
        /// The configured backup directory.
        backup_dir: PathBuf,
    },
    /// A path handed to [`TargetDerivation::derive`] is not under the source root.
    ///
    /// Every derived path should already have been found by walking a tree under the root,
    /// so this indicates a bug rather than bad user input.
    #[error("{path:?} is not under the source root {root:?}")]
    OutsideRoot {
        /// The offending path.
        path: PathBuf,
        /// The configured source root.
        root: PathBuf,
    },
}

/// Normalize a path, removing things like `.` and `..`.
///
/// CAUTION: This does not resolve symlinks (unlike [`std::fs::canonicalize`]), so
/// `link/..` collapses to the directory containing `link`, not the parent of its target.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = path.components().peekable();
    let mut ret = if let Some(c @ Component::Prefix(..)) = components.peek().copied() {
        components.next();
        PathBuf::from(c.as_os_str())
    } else {
        PathBuf::new()
    };

    for component in components {
        match component {
            Component::Prefix(..) => unreachable!(),
            Component::RootDir => {
                ret.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(ret.components().last(), None | Some(Component::ParentDir)) {
                    ret.push(Component::ParentDir);
                } else {
                    ret.pop();
                }
            }
            Component::Normal(c) => {
                ret.push(c);
            }
        }
    }
    ret
}

/// Resolve `path` against the current directory and normalize it.
///
/// # Errors
///
/// [`Error::Absolute`] if `path` is relative and the current directory cannot be read.
pub fn absolute(path: &Path) -> Result<PathBuf, Error> {
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }

    std::env::current_dir()
        .map(|cwd| normalize_path(&cwd.join(path)))
        .map_err(|error| Error::Absolute {
            path: path.to_path_buf(),
            error,
        })
}

/// Derives backup targets from source paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDerivation {
    source_root: PathBuf,
    backup_dir: PathBuf,
}

impl TargetDerivation {
    /// Mount `source_root` at `backup_dir`.
    ///
    /// # Errors
    ///
    /// - [`Error::RootInsideBackup`] if `source_root` is `backup_dir` or one of its descendants.
    /// - [`Error::Absolute`] if either path cannot be made absolute.
    pub fn new(source_root: &Path, backup_dir: &Path) -> Result<Self, Error> {
        let source_root = absolute(source_root)?;
        let backup_dir = absolute(backup_dir)?;

        if source_root.starts_with(&backup_dir) {
            return Err(Error::RootInsideBackup {
                root: source_root,
                backup_dir,
            });
        }

        tracing::debug!(
            root = %source_root.display(),
            backup_dir = %backup_dir.display(),
            "mounting source root at backup directory"
        );

        Ok(Self {
            source_root,
            backup_dir,
        })
    }

    /// Mount the root of the filesystem at `backup_dir`.
    ///
    /// # Errors
    ///
    /// See [`TargetDerivation::new`].
    pub fn from_filesystem_root(backup_dir: &Path) -> Result<Self, Error> {
        Self::new(Path::new(MAIN_SEPARATOR_STR), backup_dir)
    }

    /// Mount `root` at `backup_dir`, or the filesystem root if `root` is `None`.
    ///
    /// # Errors
    ///
    /// See [`TargetDerivation::new`].
    pub fn select(root: Option<&Path>, backup_dir: &Path) -> Result<Self, Error> {
        match root {
            None => Self::from_filesystem_root(backup_dir),
            Some(root) => Self::new(root, backup_dir),
        }
    }

    /// The absolute source root.
    #[must_use]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// The absolute backup directory.
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Returns the backup target of `source`.
    ///
    /// # Errors
    ///
    /// - [`Error::OutsideRoot`] if `source` is not under the source root.
    /// - [`Error::Absolute`] if `source` cannot be made absolute.
    pub fn derive(&self, source: &Path) -> Result<PathBuf, Error> {
        let source = absolute(source)?;
        match source.strip_prefix(&self.source_root) {
            Ok(relative) => Ok(self.backup_dir.join(relative)),
            Err(_) => Err(Error::OutsideRoot {
                path: source,
                root: self.source_root.clone(),
            }),
        }
    }

    /// Returns the path of the archive that `tree` is zipped into.
    ///
    /// # Errors
    ///
    /// See [`TargetDerivation::derive`].
    pub fn archive_path(&self, tree: &Path) -> Result<PathBuf, Error> {
        let mut name = OsString::from(self.derive(tree)?);
        name.push(ARCHIVE_EXTENSION);
        Ok(PathBuf::from(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn derivation() -> TargetDerivation {
            TargetDerivation::new(Path::new("/a/b"), Path::new("/backup"))
                .expect("derivation should be valid")
        }

        #[test]
        fn test_derive_path_under_root() {
            let target = derivation()
                .derive(Path::new("/a/b/c/d.txt"))
                .expect("path is under root");
            assert_eq!(PathBuf::from("/backup/c/d.txt"), target);
        }

        #[test]
        fn test_derive_root_itself_is_backup_dir() {
            let target = derivation().derive(Path::new("/a/b")).expect("root is under root");
            assert_eq!(PathBuf::from("/backup"), target);
        }

        #[test]
        fn test_derive_path_outside_root_fails() {
            let err = derivation()
                .derive(Path::new("/x/y"))
                .expect_err("path is not under root");
            match err {
                Error::OutsideRoot { path, root } => {
                    assert_eq!(PathBuf::from("/x/y"), path);
                    assert_eq!(PathBuf::from("/a/b"), root);
                }
                other => panic!("unexpected error: {}", other),
            }
        }

        #[test]
        fn test_sibling_with_common_prefix_is_outside_root() {
            derivation()
                .derive(Path::new("/a/bc/file"))
                .expect_err("/a/bc is not under /a/b");
        }

        #[test]
        fn test_derive_normalizes_source() {
            let target = derivation()
                .derive(Path::new("/a/b/./c/../d.txt"))
                .expect("path is under root");
            assert_eq!(PathBuf::from("/backup/d.txt"), target);
        }

        #[test]
        fn test_filesystem_root_mounts_everything() {
            let derivation = TargetDerivation::from_filesystem_root(Path::new("/backup"))
                .expect("filesystem root is not inside /backup");
            assert_eq!(Path::new("/"), derivation.source_root());
            let target = derivation
                .derive(Path::new("/home/user/notes.txt"))
                .expect("everything is under /");
            assert_eq!(PathBuf::from("/backup/home/user/notes.txt"), target);
        }

        #[test]
        fn test_select_defaults_to_filesystem_root() {
            let selected = TargetDerivation::select(None, Path::new("/backup"))
                .expect("derivation should be valid");
            let explicit = TargetDerivation::from_filesystem_root(Path::new("/backup"))
                .expect("derivation should be valid");
            assert_eq!(explicit, selected);
            let selected = TargetDerivation::select(Some(Path::new("/a/b")), Path::new("/backup"))
                .expect("derivation should be valid");
            assert_eq!(derivation(), selected);
        }

        #[test]
        fn test_root_inside_backup_is_rejected() {
            let err = TargetDerivation::new(Path::new("/backup/inner"), Path::new("/backup"))
                .expect_err("root inside backup dir should fail");
            assert!(matches!(err, Error::RootInsideBackup { .. }));
            TargetDerivation::new(Path::new("/backup"), Path::new("/backup"))
                .expect_err("root equal to backup dir should fail");
            TargetDerivation::new(Path::new("/backup/x/.."), Path::new("/backup"))
                .expect_err("root is checked after normalizing");
        }

        #[test]
        fn test_backup_inside_root_is_allowed() {
            TargetDerivation::new(Path::new("/home"), Path::new("/home/backup"))
                .expect("backup dir inside root is fine");
        }

        #[test]
        fn test_archive_path_appends_extension() {
            let archive = derivation()
                .archive_path(Path::new("/a/b/photos"))
                .expect("path is under root");
            assert_eq!(PathBuf::from("/backup/photos.zip"), archive);
        }
    }

    #[test]
    fn test_relative_paths_resolve_against_current_dir() {
        let cwd = std::env::current_dir().expect("current dir should be readable");
        let resolved = absolute(Path::new("some/../file")).expect("cwd is readable");
        assert_eq!(normalize_path(&cwd.join("file")), resolved);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(PathBuf::from("a/c"), normalize_path(Path::new("a/./b/../c")));
        assert_eq!(PathBuf::from("../a"), normalize_path(Path::new("../a")));
        assert_eq!(PathBuf::from(""), normalize_path(Path::new("a/..")));
    }
}
