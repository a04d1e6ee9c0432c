//! Transaction manager (spec §4.4): a scoped, process-local staging area
//! for new objects, with a repository-wide fsync policy.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use rand::Rng as _;
use tracing::debug;
use tracing::warn;

use crate::error::IoResultExt as _;
use crate::error::OstreeError;
use crate::error::OstreeResult;
use crate::file_util;

/// When objects and ref renames are fsynced (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FsyncPolicy {
    Always,
    Never,
    #[default]
    PerObject,
}

impl std::str::FromStr for FsyncPolicy {
    type Err = OstreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "per-object" => Ok(Self::PerObject),
            other => Err(OstreeError::Config(format!("unknown fsync policy: {other}"))),
        }
    }
}

impl FsyncPolicy {
    /// Reads `core.fsync` out of a repository config, defaulting to
    /// [`FsyncPolicy::PerObject`] when unset or unparseable.
    pub fn from_config(config: &crate::config::RepoConfig) -> Self {
        config.ini.get("core", "fsync").and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

/// Tracks whether a transaction is open on this process; a repository holds
/// one of these and hands out [`Transaction`] guards from it. Only one
/// transaction per process is permitted (spec §4.4).
#[derive(Default)]
pub struct TransactionManager {
    active: AtomicBool,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin<'a>(&'a self, repo_root: &Path, fsync: FsyncPolicy) -> OstreeResult<Transaction<'a>> {
        if self.active.swap(true, Ordering::AcqRel) {
            return Err(OstreeError::TransactionAlreadyActive);
        }
        let staging = repo_root
            .join("tmp")
            .join(format!("staging-{}-{:08x}", process::id(), rand::rng().random::<u32>()));
        file_util::create_or_reuse_dir(&staging).path_context(&staging)?;
        debug!(path = %staging.display(), "opened transaction staging dir");
        Ok(Transaction { manager: self, staging: Some(staging), fsync, finished: false })
    }
}

/// A scoped transaction (spec §4.4). New objects are written into
/// `staging()` by the caller; [`commit`] fsyncs per policy and marks the
/// staging dir consumed, [`abort`] discards it. Dropping without calling
/// either aborts.
///
/// [`commit`]: Transaction::commit
/// [`abort`]: Transaction::abort
pub struct Transaction<'a> {
    manager: &'a TransactionManager,
    staging: Option<PathBuf>,
    fsync: FsyncPolicy,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn staging_dir(&self) -> &Path {
        self.staging.as_deref().expect("transaction already finished")
    }

    pub fn fsync_policy(&self) -> FsyncPolicy {
        self.fsync
    }

    /// Fsyncs the staging directory's entries per policy, then marks the
    /// transaction complete. Object writes themselves (via
    /// [`crate::object_store::ObjectStore::put_object`]) are expected to
    /// have already landed in `objects/`; this only covers the
    /// directory-entry durability the policy calls for.
    pub fn commit(mut self) -> OstreeResult<()> {
        if self.fsync != FsyncPolicy::Never {
            if let Some(staging) = &self.staging {
                if let Ok(dir) = fs::File::open(staging) {
                    let _ = dir.sync_all();
                }
            }
        }
        self.finish()
    }

    pub fn abort(mut self) -> OstreeResult<()> {
        if let Some(staging) = &self.staging {
            if staging.exists() {
                fs::remove_dir_all(staging).path_context(staging)?;
            }
        }
        self.finish()
    }

    fn finish(&mut self) -> OstreeResult<()> {
        self.staging = None;
        self.finished = true;
        self.manager.active.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(staging) = self.staging.take() {
                if let Err(e) = fs::remove_dir_all(&staging) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %staging.display(), error = %e, "failed to clean up abandoned transaction staging dir");
                    }
                }
            }
            self.manager.active.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_transaction_on_same_manager_fails() {
        let dir = crate::tests::new_temp_dir();
        let mgr = TransactionManager::new();
        let first = mgr.begin(dir.path(), FsyncPolicy::PerObject).unwrap();
        assert!(matches!(mgr.begin(dir.path(), FsyncPolicy::PerObject), Err(OstreeError::TransactionAlreadyActive)));
        first.abort().unwrap();
    }

    #[test]
    fn commit_allows_a_subsequent_transaction() {
        let dir = crate::tests::new_temp_dir();
        let mgr = TransactionManager::new();
        let txn = mgr.begin(dir.path(), FsyncPolicy::Always).unwrap();
        let staging = txn.staging_dir().to_path_buf();
        txn.commit().unwrap();
        assert!(staging.exists());
        let _second = mgr.begin(dir.path(), FsyncPolicy::Always).unwrap();
    }

    #[test]
    fn abort_removes_staging_dir() {
        let dir = crate::tests::new_temp_dir();
        let mgr = TransactionManager::new();
        let txn = mgr.begin(dir.path(), FsyncPolicy::PerObject).unwrap();
        let staging = txn.staging_dir().to_path_buf();
        txn.abort().unwrap();
        assert!(!staging.exists());
    }

    #[test]
    fn dropping_without_commit_releases_the_slot() {
        let dir = crate::tests::new_temp_dir();
        let mgr = TransactionManager::new();
        {
            let _txn = mgr.begin(dir.path(), FsyncPolicy::PerObject).unwrap();
        }
        let _second = mgr.begin(dir.path(), FsyncPolicy::PerObject).unwrap();
    }

    #[test]
    fn fsync_policy_parses_from_str() {
        assert_eq!("always".parse::<FsyncPolicy>().unwrap(), FsyncPolicy::Always);
        assert_eq!("never".parse::<FsyncPolicy>().unwrap(), FsyncPolicy::Never);
        assert_eq!("per-object".parse::<FsyncPolicy>().unwrap(), FsyncPolicy::PerObject);
        assert!("bogus".parse::<FsyncPolicy>().is_err());
    }
}
