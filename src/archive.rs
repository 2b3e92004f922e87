//! Writing a directory tree into a single zip archive.
//!
//! Empty directories are stored as zero-length entries whose names end in `/`. Symbolic
//! links are stored as entries whose content is the link target, with the unix symlink
//! bit set in the entry's external attributes. Links are left out entirely unless
//! `keep_symlinks` is set.
use std::fs;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use thiserror::Error;
use time::OffsetDateTime;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Errors that may occur while writing an archive.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error on a path inside the archived tree or on the archive itself.
    #[error("I/O error on {path:?}: {error}")]
    IO {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
    /// The zip writer failed.
    #[error("failed to write archive entry for {path:?}: {error}")]
    Zip {
        /// The path being added.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: ZipError,
    },
    /// The tree contains something other than files, directories, and links.
    #[error("can't archive {0:?}: not a file, directory, or symlink")]
    Unsupported(PathBuf),
}

/// Permission bits of a finished archive.
#[cfg(unix)]
const ARCHIVE_MODE: u32 = 0o644;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |error| Error::IO {
        path: path.to_path_buf(),
        error,
    }
}

fn zip_error(path: &Path) -> impl FnOnce(ZipError) -> Error + '_ {
    move |error| Error::Zip {
        path: path.to_path_buf(),
        error,
    }
}

/// Zip the directory `source` into the file `target`.
///
/// The archive is written to a temporary file next to `target` and moved into place once
/// complete, so an existing archive is only ever replaced by a finished one.
///
/// # Errors
///
/// Any error while reading `source` or writing the archive.
pub fn zip_directory(source: &Path, target: &Path, keep_symlinks: bool) -> Result<(), Error> {
    let parent = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(parent).map_err(io_error(parent))?;
    let file = temp.reopen().map_err(io_error(temp.path()))?;

    let mut archiver = Archiver {
        source,
        keep_symlinks,
        writer: ZipWriter::new(file),
    };
    archiver.add_dir(source, true)?;
    archiver.writer.finish().map_err(zip_error(target))?;

    // Temporary files are created owner-only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(ARCHIVE_MODE))
            .map_err(io_error(temp.path()))?;
    }

    temp.persist(target)
        .map_err(|err| Error::IO {
            path: target.to_path_buf(),
            error: err.error,
        })
        .map(|_| ())
}

struct Archiver<'a, W: Write + Seek> {
    source: &'a Path,
    keep_symlinks: bool,
    writer: ZipWriter<W>,
}

impl<'a, W: Write + Seek> Archiver<'a, W> {
    /// The name of `path` inside the archive, always `/`-separated.
    fn entry_name(&self, path: &Path) -> String {
        path.strip_prefix(self.source)
            .unwrap_or(path)
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn add_dir(&mut self, dir: &Path, is_root: bool) -> Result<(), Error> {
        let mut entries = fs::read_dir(dir)
            .map_err(io_error(dir))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_error(dir))?;
        // Sorted so rebuilding an unchanged tree yields the same entry order.
        entries.sort();

        if entries.is_empty() && !is_root {
            let name = self.entry_name(dir);
            tracing::trace!(name = %name, "adding empty directory");
            self.writer
                .add_directory(name, SimpleFileOptions::default())
                .map_err(zip_error(dir))?;
        }

        for path in entries {
            let metadata = fs::symlink_metadata(&path).map_err(io_error(&path))?;
            let file_type = metadata.file_type();
            if file_type.is_symlink() {
                if self.keep_symlinks {
                    self.add_symlink(&path)?;
                } else {
                    tracing::debug!("not archiving symlink {}", path.display());
                }
            } else if file_type.is_dir() {
                self.add_dir(&path, false)?;
            } else if file_type.is_file() {
                self.add_file(&path, &metadata)?;
            } else {
                return Err(Error::Unsupported(path));
            }
        }

        Ok(())
    }

    fn add_symlink(&mut self, path: &Path) -> Result<(), Error> {
        let link_target = fs::read_link(path).map_err(io_error(path))?;
        let name = self.entry_name(path);
        tracing::trace!(name = %name, target = %link_target.display(), "adding symlink");
        self.writer
            .add_symlink(
                name,
                link_target.to_string_lossy().into_owned(),
                SimpleFileOptions::default(),
            )
            .map_err(zip_error(path))
    }

    fn add_file(&mut self, path: &Path, metadata: &fs::Metadata) -> Result<(), Error> {
        let name = self.entry_name(path);
        tracing::trace!(name = %name, "adding file");
        self.writer
            .start_file(name, file_options(metadata))
            .map_err(zip_error(path))?;
        let mut file = fs::File::open(path).map_err(io_error(path))?;
        io::copy(&mut file, &mut self.writer).map_err(io_error(path))?;
        Ok(())
    }
}

fn file_options(metadata: &fs::Metadata) -> SimpleFileOptions {
    let mut options =
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode());
    }

    if let Some(modified) = metadata.modified().ok().and_then(zip_time) {
        options = options.last_modified_time(modified);
    }

    options
}

/// Converts to the MS-DOS time stored in zip entries, if representable.
fn zip_time(time: SystemTime) -> Option<zip::DateTime> {
    let time = OffsetDateTime::from(time);
    zip::DateTime::from_date_and_time(
        u16::try_from(time.year()).ok()?,
        u8::from(time.month()),
        time.day(),
        time.hour(),
        time.minute(),
        time.second(),
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Read;
    use zip::ZipArchive;

    fn open(path: &Path) -> ZipArchive<fs::File> {
        ZipArchive::new(fs::File::open(path).expect("archive should exist"))
            .expect("archive should be readable")
    }

    fn names(archive: &ZipArchive<fs::File>) -> HashSet<String> {
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn test_files_and_nested_dirs() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let source = dir.path().join("source");
        fs::create_dir_all(source.join("sub")).expect("failed to create dir");
        fs::write(source.join("top.txt"), "top").expect("failed to write file");
        fs::write(source.join("sub").join("inner.txt"), "inner").expect("failed to write file");
        let target = dir.path().join("source.zip");

        zip_directory(&source, &target, false).expect("zipping should succeed");

        let mut archive = open(&target);
        assert_eq!(
            HashSet::from(["top.txt".to_string(), "sub/inner.txt".to_string()]),
            names(&archive)
        );
        let mut content = String::new();
        archive
            .by_name("sub/inner.txt")
            .expect("entry should exist")
            .read_to_string(&mut content)
            .expect("entry should be readable");
        assert_eq!("inner", content);
    }

    #[test]
    fn test_empty_root_gives_empty_archive() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let source = dir.path().join("source");
        fs::create_dir(&source).expect("failed to create dir");
        let target = dir.path().join("source.zip");

        zip_directory(&source, &target, true).expect("zipping should succeed");
        assert!(open(&target).is_empty());
    }

    #[test]
    fn test_archive_is_replaced() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let source = dir.path().join("source");
        fs::create_dir(&source).expect("failed to create dir");
        fs::write(source.join("a"), "a").expect("failed to write file");
        let target = dir.path().join("source.zip");
        fs::write(&target, "not a zip").expect("failed to write file");

        zip_directory(&source, &target, true).expect("zipping should succeed");
        assert_eq!(HashSet::from(["a".to_string()]), names(&open(&target)));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("dir should be readable")
            .collect();
        assert_eq!(2, leftovers.len(), "no temporary files should remain");
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::symlink;

        const S_IFMT: u32 = 0o170_000;
        const S_IFLNK: u32 = 0o120_000;

        fn tree_with_link(dir: &Path) -> PathBuf {
            let source = dir.join("source");
            fs::create_dir_all(source.join("empty")).expect("failed to create dir");
            symlink("../elsewhere/file.txt", source.join("link")).expect("failed to create symlink");
            source
        }

        #[test]
        fn test_empty_dir_and_symlink_round_trip() {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let source = tree_with_link(dir.path());
            let target = dir.path().join("source.zip");

            zip_directory(&source, &target, true).expect("zipping should succeed");

            let mut archive = open(&target);
            assert_eq!(
                HashSet::from(["empty/".to_string(), "link".to_string()]),
                names(&archive)
            );

            {
                let empty = archive.by_name("empty/").expect("entry should exist");
                assert!(empty.is_dir());
                assert_eq!(0, empty.size());
            }

            let mut link = archive.by_name("link").expect("entry should exist");
            let mode = link.unix_mode().expect("link entry should carry a unix mode");
            assert_eq!(S_IFLNK, mode & S_IFMT);
            let mut content = String::new();
            link.read_to_string(&mut content).expect("entry should be readable");
            assert_eq!("../elsewhere/file.txt", content);
        }

        #[test]
        fn test_symlinks_left_out_unless_kept() {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let source = tree_with_link(dir.path());
            let target = dir.path().join("source.zip");

            zip_directory(&source, &target, false).expect("zipping should succeed");
            assert_eq!(HashSet::from(["empty/".to_string()]), names(&open(&target)));
        }

        #[test]
        fn test_archive_is_world_readable() {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let source = tree_with_link(dir.path());
            let target = dir.path().join("source.zip");

            zip_directory(&source, &target, true).expect("zipping should succeed");
            let mode = fs::metadata(&target)
                .expect("archive should exist")
                .permissions()
                .mode();
            assert_eq!(0o644, mode & 0o777);
        }

        #[test]
        fn test_socket_is_unsupported() {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let source = dir.path().join("source");
            fs::create_dir(&source).expect("failed to create dir");
            let _listener = std::os::unix::net::UnixListener::bind(source.join("sock"))
                .expect("failed to bind socket");
            let target = dir.path().join("source.zip");

            let err = zip_directory(&source, &target, true).expect_err("sockets can't be archived");
            assert!(matches!(err, Error::Unsupported(path) if path == source.join("sock")));
            assert!(!target.exists(), "failed archives are not persisted");
        }

        #[test]
        fn test_linked_directory_is_not_descended() {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let outside = dir.path().join("outside");
            fs::create_dir(&outside).expect("failed to create dir");
            fs::write(outside.join("secret"), "secret").expect("failed to write file");
            let source = dir.path().join("source");
            fs::create_dir(&source).expect("failed to create dir");
            symlink(&outside, source.join("linked")).expect("failed to create symlink");

            zip_directory(&source, &dir.path().join("source.zip"), true)
                .expect("zipping should succeed");
            assert_eq!(
                HashSet::from(["linked".to_string()]),
                names(&open(&dir.path().join("source.zip")))
            );
        }
    }
}
