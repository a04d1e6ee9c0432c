//! The repository handle (spec §3, §4): ties the object store, ref store,
//! configuration, and transaction manager to a single on-disk root, the way
//! every other component is reached in practice.

use std::path::Path;
use std::path::PathBuf;

use tracing::info;

use crate::config::RepoConfig;
use crate::error::IoResultExt as _;
use crate::error::OstreeError;
use crate::error::OstreeResult;
use crate::file_util;
use crate::lock;
use crate::lock::LockGuard;
use crate::object_store::ObjectStore;
use crate::object_store::RepoMode;
use crate::refs::RefStore;
use crate::transaction::FsyncPolicy;
use crate::transaction::Transaction;
use crate::transaction::TransactionManager;

/// Environment variable consulted when no explicit repo path is given
/// (mirrors the CLI's `--repo` default resolution).
pub const REPO_PATH_ENV: &str = "OSTREE_REPO";

/// A repository root: `config`, `objects/`, `refs/`, `tmp/`, `state/`,
/// `deltas/`, and `summary` (spec §3 filesystem diagram).
pub struct Repository {
    root: PathBuf,
    config: RepoConfig,
    store: ObjectStore,
    refs: RefStore,
    transactions: TransactionManager,
}

impl Repository {
    /// Creates a fresh repository at `root` in the given mode.
    pub fn init(root: &Path, mode: RepoMode, collection_id: Option<&str>) -> OstreeResult<Self> {
        file_util::create_dir_all_reuse(root).path_context(root)?;
        for subdir in ["objects", "refs/heads", "refs/remotes", "refs/mirrors", "tmp", "state", "deltas"] {
            let path = root.join(subdir);
            file_util::create_dir_all_reuse(&path).path_context(&path)?;
        }

        let mut config = RepoConfig::new(mode);
        if let Some(collection_id) = collection_id {
            config.ini.set("core", "collection-id", collection_id);
        }
        config.save(&root.join("config"))?;

        let fsync = FsyncPolicy::from_config(&config);
        let store = ObjectStore::create_with_fsync(root, mode, fsync)?;
        let refs = RefStore::new_with_fsync(root, fsync);
        info!(root = %root.display(), mode = %mode, "initialized repository");
        Ok(Self { root: root.to_path_buf(), config, store, refs, transactions: TransactionManager::new() })
    }

    /// Opens an existing repository, reading its mode from `config`.
    pub fn open(root: &Path) -> OstreeResult<Self> {
        let config = RepoConfig::load(&root.join("config"))?;
        let mode = config.mode()?;
        let fsync = FsyncPolicy::from_config(&config);
        let store = ObjectStore::open_with_fsync(root, mode, fsync);
        let refs = RefStore::new_with_fsync(root, fsync);
        Ok(Self { root: root.to_path_buf(), config, store, refs, transactions: TransactionManager::new() })
    }

    /// Resolves the repository root the CLI should use: an explicit path
    /// if given, else `$OSTREE_REPO`, else the current directory's
    /// `./repo`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(env_path) = std::env::var(REPO_PATH_ENV) {
            return PathBuf::from(env_path);
        }
        PathBuf::from("repo")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RepoConfig {
        &mut self.config
    }

    /// Persists changes made through [`Self::config_mut`] back to `config`
    /// (used by `remote add`/`remote delete`, spec §6).
    pub fn save_config(&self) -> OstreeResult<()> {
        self.config.save(&self.root.join("config"))
    }

    pub fn mode(&self) -> RepoMode {
        self.store.mode()
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn fsync_policy(&self) -> FsyncPolicy {
        FsyncPolicy::from_config(&self.config)
    }

    pub fn begin_transaction(&self) -> OstreeResult<Transaction<'_>> {
        self.transactions.begin(&self.root, self.fsync_policy())
    }

    /// Acquires the cross-process repository lock (spec §4.4: transactions
    /// are process-scoped; concurrent writers coordinate via this).
    pub fn lock_exclusive(&self) -> OstreeResult<LockGuard> {
        lock::lock_exclusive(&self.root.join("lock"))
    }

    pub fn lock_shared(&self) -> OstreeResult<LockGuard> {
        lock::lock_shared(&self.root.join("lock"))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn deltas_dir(&self) -> PathBuf {
        self.root.join("deltas")
    }

    /// Path to the `.commitpartial` marker for a commit (spec §3, §4.5):
    /// its presence means the commit's transitive closure isn't guaranteed
    /// complete yet.
    pub fn commit_partial_marker(&self, checksum: &crate::checksum::Checksum) -> PathBuf {
        self.state_dir().join(format!("{}.commitpartial", checksum.hex()))
    }

    pub fn is_commit_partial(&self, checksum: &crate::checksum::Checksum) -> bool {
        self.commit_partial_marker(checksum).exists()
    }

    pub fn mark_commit_partial(&self, checksum: &crate::checksum::Checksum) -> OstreeResult<()> {
        let path = self.commit_partial_marker(checksum);
        std::fs::write(&path, b"").path_context(&path)
    }

    pub fn clear_commit_partial(&self, checksum: &crate::checksum::Checksum) -> OstreeResult<()> {
        let path = self.commit_partial_marker(checksum);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OstreeError::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_open_preserves_mode() {
        let dir = crate::tests::new_temp_dir();
        let root = dir.path().join("repo");
        Repository::init(&root, RepoMode::BareUserOnly, None).unwrap();
        let repo = Repository::open(&root).unwrap();
        assert_eq!(repo.mode(), RepoMode::BareUserOnly);
    }

    #[test]
    fn init_lays_out_expected_directories() {
        let dir = crate::tests::new_temp_dir();
        let root = dir.path().join("repo");
        Repository::init(&root, RepoMode::Bare, Some("org.example.Os")).unwrap();
        for subdir in ["objects", "refs/heads", "tmp", "state", "deltas"] {
            assert!(root.join(subdir).is_dir(), "missing {subdir}");
        }
        let repo = Repository::open(&root).unwrap();
        assert_eq!(repo.config().ini.get("core", "collection-id"), Some("org.example.Os"));
    }

    #[test]
    fn commit_partial_marker_round_trips() {
        let dir = crate::tests::new_temp_dir();
        let root = dir.path().join("repo");
        let repo = Repository::init(&root, RepoMode::Bare, None).unwrap();
        let csum = crate::checksum::Checksum::of(b"pending");
        assert!(!repo.is_commit_partial(&csum));
        repo.mark_commit_partial(&csum).unwrap();
        assert!(repo.is_commit_partial(&csum));
        repo.clear_commit_partial(&csum).unwrap();
        assert!(!repo.is_commit_partial(&csum));
    }

    #[test]
    fn begin_transaction_enforces_single_active() {
        let dir = crate::tests::new_temp_dir();
        let root = dir.path().join("repo");
        let repo = Repository::init(&root, RepoMode::Bare, None).unwrap();
        let txn = repo.begin_transaction().unwrap();
        assert!(repo.begin_transaction().is_err());
        txn.commit().unwrap();
        assert!(repo.begin_transaction().is_ok());
    }
}
