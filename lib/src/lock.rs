//! `flock`-based locking (spec §4.4, §4.8): repository `.lock` and sysroot
//! `.lock` files coordinate writers across processes, since transactions
//! are process-scoped but repositories are not (spec: "concurrent writers
//! MUST coordinate externally").

use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;

use rustix::fs::FlockOperation;

use crate::error::IoResultExt as _;
use crate::error::OstreeResult;

/// A held `flock` on a `.lock` file. Dropped (and thus released) when the
/// guard goes out of scope.
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Acquires an exclusive lock, blocking until it is available.
pub fn lock_exclusive(path: &Path) -> OstreeResult<LockGuard> {
    acquire(path, FlockOperation::LockExclusive)
}

/// Acquires a shared lock, blocking until it is available.
pub fn lock_shared(path: &Path) -> OstreeResult<LockGuard> {
    acquire(path, FlockOperation::LockShared)
}

/// Attempts an exclusive lock without blocking; returns `Ok(None)` if
/// already held elsewhere.
pub fn try_lock_exclusive(path: &Path) -> OstreeResult<Option<LockGuard>> {
    try_acquire(path, FlockOperation::NonBlockingLockExclusive)
}

fn acquire(path: &Path, op: FlockOperation) -> OstreeResult<LockGuard> {
    let file = open_lock_file(path)?;
    rustix::fs::flock(&file, op).map_err(|e| std::io::Error::from(e)).path_context(path)?;
    Ok(LockGuard { _file: file, path: path.to_path_buf() })
}

fn try_acquire(path: &Path, op: FlockOperation) -> OstreeResult<Option<LockGuard>> {
    let file = open_lock_file(path)?;
    match rustix::fs::flock(&file, op) {
        Ok(()) => Ok(Some(LockGuard { _file: file, path: path.to_path_buf() })),
        Err(e) if e == rustix::io::Errno::WOULDBLOCK => Ok(None),
        Err(e) => Err(std::io::Error::from(e)).path_context(path),
    }
}

fn open_lock_file(path: &Path) -> OstreeResult<File> {
    OpenOptions::new().create(true).truncate(false).write(true).open(path).path_context(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_lock_blocks_a_nonblocking_second_attempt() {
        let dir = crate::tests::new_temp_dir();
        let path = dir.path().join(".lock");
        let _held = lock_exclusive(&path).unwrap();
        assert!(try_lock_exclusive(&path).unwrap().is_none());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = crate::tests::new_temp_dir();
        let path = dir.path().join(".lock");
        {
            let _held = lock_exclusive(&path).unwrap();
        }
        let reacquired = try_lock_exclusive(&path).unwrap();
        assert!(reacquired.is_some());
    }
}
