//! Read-only repository verification (§11.1): walks every ref to its
//! commit, recurses each commit's closure, and verifies every object's
//! checksum, without mutating the object store.

use std::collections::HashSet;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tracing::warn;

use crate::checksum::Checksum;
use crate::commit::Commit;
use crate::commit::Metadata;
use crate::commit::MetadataValue;
use crate::error::OstreeError;
use crate::error::OstreeResult;
use crate::object_store::ObjectKind;
use crate::object_store::ObjectStore;
use crate::refs::RefCategory;
use crate::repo::Repository;
use crate::tree::DirTree;

#[derive(Debug, Clone)]
pub struct FsckOptions {
    /// Write a tombstone (§11.2) for any ref whose commit is missing.
    pub add_tombstones: bool,
    pub quiet: bool,
}

impl Default for FsckOptions {
    fn default() -> Self {
        Self { add_tombstones: false, quiet: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingObject {
    pub kind: ObjectKind,
    pub checksum: Checksum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptObject {
    pub kind: ObjectKind,
    pub checksum: Checksum,
    pub observed: Checksum,
}

#[derive(Debug, Clone, Default)]
pub struct FsckReport {
    pub commits_checked: usize,
    pub missing: Vec<MissingObject>,
    pub corrupt: Vec<CorruptObject>,
    /// `.commitpartial` markers removed because the commit they name turned
    /// out to have a complete closure on disk already (stale, safe to drop).
    pub stale_commitpartial_removed: Vec<Checksum>,
    pub tombstones_written: Vec<Checksum>,
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }
}

fn verify_object(
    store: &ObjectStore,
    kind: ObjectKind,
    checksum: Checksum,
    report: &mut FsckReport,
) -> OstreeResult<bool> {
    match store.open_object_verified(kind, &checksum) {
        Ok(_) => Ok(true),
        Err(OstreeError::ObjectNotFound { .. }) => {
            report.missing.push(MissingObject { kind, checksum });
            Ok(false)
        }
        Err(OstreeError::CorruptObject { observed, .. }) => {
            report.corrupt.push(CorruptObject { kind, checksum, observed });
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Verifies a directory's closure recursively, short-circuiting recursion
/// into a subtree the moment it's found missing or corrupt (its contents
/// can't be checked if the dirtree itself can't be trusted).
fn verify_tree_closure(
    store: &ObjectStore,
    tree: Checksum,
    meta: Checksum,
    visited: &mut HashSet<Checksum>,
    report: &mut FsckReport,
) -> OstreeResult<()> {
    if !visited.insert(tree) {
        return Ok(());
    }
    if !verify_object(store, ObjectKind::DirMeta, meta, report)? {
        return Ok(());
    }
    if !verify_object(store, ObjectKind::DirTree, tree, report)? {
        return Ok(());
    }

    let dirtree = DirTree::decode(&store.open_object(ObjectKind::DirTree, &tree)?)?;
    for file in &dirtree.files {
        verify_object(store, ObjectKind::File, file.checksum, report)?;
    }
    for dir in &dirtree.dirs {
        verify_tree_closure(store, dir.tree_checksum, dir.meta_checksum, visited, report)?;
    }
    Ok(())
}

/// Builds and stores a tombstone standing in for a missing commit (§11.2),
/// referenced from `refs/heads/.tombstones/<csum>` so prune and pull can
/// distinguish "never seen" from "deliberately deleted".
fn write_tombstone(repo: &Repository, missing_commit: Checksum) -> OstreeResult<()> {
    let mut metadata = Metadata::new();
    metadata.insert("ostree.tombstone-commit", MetadataValue::Bool(true));
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();

    let tombstone = Commit {
        metadata,
        parent: Some(missing_commit),
        subject: String::new(),
        body: String::new(),
        timestamp: now,
        root_tree: Checksum::of(b""),
        root_meta: Checksum::of(b""),
        ref_bindings: vec![],
        collection_binding: None,
        signatures: vec![],
    };
    let tombstone_checksum = repo.store().put_object(ObjectKind::Commit, &tombstone.encode())?;
    repo.refs().set(&RefCategory::Heads, &format!(".tombstones/{}", missing_commit.hex()), tombstone_checksum)
}

/// Runs a full verification pass (§11.1). Takes the repository's shared
/// lock: fsck never mutates objects, only optionally writes tombstones and
/// removes stale `.commitpartial` markers.
pub fn fsck(repo: &Repository, options: &FsckOptions) -> OstreeResult<FsckReport> {
    let _lock = repo.lock_shared()?;

    let mut report = FsckReport::default();
    let mut visited_trees = HashSet::new();
    let mut visited_commits = HashSet::new();

    for (ref_name, checksum) in repo.refs().list(&RefCategory::Heads, "")? {
        if ref_name.starts_with(".tombstones/") {
            continue;
        }
        if !visited_commits.insert(checksum) {
            continue;
        }
        match store_decode_commit(repo.store(), checksum) {
            Ok(commit) => {
                report.commits_checked += 1;
                verify_tree_closure(repo.store(), commit.root_tree, commit.root_meta, &mut visited_trees, &mut report)?;
            }
            Err(OstreeError::ObjectNotFound { .. }) => {
                report.missing.push(MissingObject { kind: ObjectKind::Commit, checksum });
                if options.add_tombstones {
                    write_tombstone(repo, checksum)?;
                    report.tombstones_written.push(checksum);
                }
            }
            Err(e) => return Err(e),
        }
    }

    let state_dir = repo.state_dir();
    if state_dir.is_dir() {
        for entry in std::fs::read_dir(&state_dir).map_err(|e| OstreeError::io(&state_dir, e))? {
            let entry = entry.map_err(|e| OstreeError::io(&state_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(hex) = name.strip_suffix(".commitpartial") else { continue };
            let Ok(checksum) = Checksum::from_hex(hex) else { continue };
            if closure_is_complete(repo.store(), checksum)? {
                repo.clear_commit_partial(&checksum)?;
                report.stale_commitpartial_removed.push(checksum);
            }
        }
    }

    if !options.quiet && !report.is_clean() {
        warn!(missing = report.missing.len(), corrupt = report.corrupt.len(), "fsck found problems");
    }
    Ok(report)
}

fn store_decode_commit(store: &ObjectStore, checksum: Checksum) -> OstreeResult<Commit> {
    let bytes = store.open_object(ObjectKind::Commit, &checksum)?;
    Commit::decode(&bytes)
}

fn closure_is_complete(store: &ObjectStore, checksum: Checksum) -> OstreeResult<bool> {
    let commit = match store_decode_commit(store, checksum) {
        Ok(c) => c,
        Err(OstreeError::ObjectNotFound { .. }) => return Ok(false),
        Err(e) => return Err(e),
    };
    let mut scratch_report = FsckReport::default();
    let mut visited = HashSet::new();
    verify_tree_closure(store, commit.root_tree, commit.root_meta, &mut visited, &mut scratch_report)?;
    Ok(scratch_report.is_clean())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::RepoMode;
    use crate::tree::DirMeta;
    use crate::tree::FileObject;
    use crate::tree_builder::MutableTree;

    fn setup_repo_with_commit() -> (tempfile::TempDir, Repository, Checksum) {
        let dir = crate::tests::new_temp_dir();
        let root = dir.path().join("repo");
        let repo = Repository::init(&root, RepoMode::BareUserOnly, None).unwrap();

        let file = FileObject {
            uid: 0,
            gid: 0,
            mode: 0o100644,
            rdev: 0,
            symlink_target: String::new(),
            xattrs: vec![],
            content: b"hello".to_vec(),
        };
        let file_csum = repo.store().put_object(ObjectKind::File, &file.encode()).unwrap();
        let mut tree = MutableTree::new();
        tree.set_metadata(DirMeta::new(0, 0, 0o040755, vec![]));
        tree.replace_file("a.txt", file_csum);
        let (root_tree, root_meta) = tree.finalize(repo.store()).unwrap();
        let commit = Commit {
            metadata: Metadata::new(),
            parent: None,
            subject: "s".into(),
            body: String::new(),
            timestamp: 1,
            root_tree,
            root_meta,
            ref_bindings: vec![],
            collection_binding: None,
            signatures: vec![],
        };
        let commit_csum = repo.store().put_object(ObjectKind::Commit, &commit.encode()).unwrap();
        repo.refs().set(&RefCategory::Heads, "main", commit_csum).unwrap();
        (dir, repo, commit_csum)
    }

    #[test]
    fn fsck_reports_clean_for_a_complete_repository() {
        let (_dir, repo, _csum) = setup_repo_with_commit();
        let report = fsck(&repo, &FsckOptions::default()).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.commits_checked, 1);
    }

    #[test]
    fn fsck_detects_a_missing_commit_and_can_tombstone_it() {
        let (_dir, repo, csum) = setup_repo_with_commit();
        repo.store().remove_object(ObjectKind::Commit, &csum).unwrap();
        let report = fsck(&repo, &FsckOptions { add_tombstones: true, quiet: true }).unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.missing, vec![MissingObject { kind: ObjectKind::Commit, checksum: csum }]);
        assert_eq!(report.tombstones_written, vec![csum]);
        assert!(repo.refs().resolve(&RefCategory::Heads, &format!(".tombstones/{}", csum.hex())).is_ok());
    }

    #[test]
    fn fsck_removes_a_stale_commitpartial_marker() {
        let (_dir, repo, csum) = setup_repo_with_commit();
        repo.mark_commit_partial(&csum).unwrap();
        let report = fsck(&repo, &FsckOptions::default()).unwrap();
        assert_eq!(report.stale_commitpartial_removed, vec![csum]);
        assert!(!repo.is_commit_partial(&csum));
    }
}
