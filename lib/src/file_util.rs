//! Small filesystem helpers shared by the object store, ref store, and
//! sysroot: directory creation, atomic temp-file persistence, and path
//! error context.

use std::fs;
use std::fs::File;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tempfile::PersistError;
use thiserror::Error;

use crate::transaction::FsyncPolicy;

#[derive(Debug, Error)]
#[error("cannot access {path}")]
pub struct PathError {
    pub path: PathBuf,
    pub source: io::Error,
}

pub trait IoResultExt<T> {
    fn context(self, path: impl AsRef<Path>) -> Result<T, PathError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn context(self, path: impl AsRef<Path>) -> Result<T, PathError> {
        self.map_err(|source| PathError { path: path.as_ref().to_path_buf(), source })
    }
}

/// Creates a directory, or does nothing if it already exists. Intermediate
/// directories must already exist.
pub fn create_or_reuse_dir(dirname: &Path) -> io::Result<()> {
    match fs::create_dir(dirname) {
        Ok(()) => Ok(()),
        Err(_) if dirname.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn create_dir_all_reuse(dirname: &Path) -> io::Result<()> {
    match fs::create_dir_all(dirname) {
        Ok(()) => Ok(()),
        Err(_) if dirname.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Persists a temp file after syncing its content (unless `fsync` is
/// [`FsyncPolicy::Never`]), overwriting a prior occupant of `new_path` if one
/// exists. On Unix, rename is atomic, so readers never observe a
/// partially-written object.
pub fn persist_temp_file<P: AsRef<Path>>(temp_file: NamedTempFile, new_path: P, fsync: FsyncPolicy) -> io::Result<File> {
    if fsync != FsyncPolicy::Never {
        temp_file.as_file().sync_data()?;
    }
    temp_file.persist(new_path).map_err(|PersistError { error, file: _ }| error)
}

/// Like [`persist_temp_file`], but treats an existing file at the
/// destination as success rather than overwriting it: content-addressed
/// paths are content-identical whenever the name matches, so a racing
/// writer finishing first is not an error (spec §4.1: duplicate writes are
/// idempotent).
pub fn persist_content_addressed_temp_file<P: AsRef<Path>>(
    temp_file: NamedTempFile,
    new_path: P,
    fsync: FsyncPolicy,
) -> io::Result<()> {
    if fsync != FsyncPolicy::Never {
        temp_file.as_file().sync_data()?;
    }
    match temp_file.persist_noclobber(&new_path) {
        Ok(_file) => Ok(()),
        Err(PersistError { error, file: _ }) if error.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(PersistError { error, file: _ }) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn create_or_reuse_dir_is_idempotent() {
        let dir = crate::tests::new_temp_dir();
        let target = dir.path().join("sub");
        create_or_reuse_dir(&target).unwrap();
        create_or_reuse_dir(&target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn content_addressed_persist_is_idempotent_on_collision() {
        let dir = crate::tests::new_temp_dir();
        let target = dir.path().join("object");

        let mut first = NamedTempFile::new_in(dir.path()).unwrap();
        first.write_all(b"same content").unwrap();
        persist_content_addressed_temp_file(first, &target, FsyncPolicy::PerObject).unwrap();

        let mut second = NamedTempFile::new_in(dir.path()).unwrap();
        second.write_all(b"same content").unwrap();
        persist_content_addressed_temp_file(second, &target, FsyncPolicy::PerObject).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"same content");
    }
}
