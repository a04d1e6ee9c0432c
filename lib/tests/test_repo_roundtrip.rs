//! End-to-end coverage of the object store + tree builder + commit layer
//! through the public `Repository` API, across a nested directory shape
//! instead of the single-file fixtures the unit tests use.

use ostree_core::commit::Commit;
use ostree_core::commit::Metadata;
use ostree_core::fsck;
use ostree_core::fsck::FsckOptions;
use ostree_core::object_store::ObjectKind;
use ostree_core::object_store::RepoMode;
use ostree_core::refs::RefCategory;
use ostree_core::repo::Repository;
use ostree_core::tree::DirMeta;
use ostree_core::tree::DirTree;
use ostree_core::tree::FileObject;
use ostree_core::tree_builder::MutableTree;

fn temp_repo(mode: RepoMode) -> (tempfile::TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(&dir.path().join("repo"), mode, None).unwrap();
    (dir, repo)
}

fn put_file(repo: &Repository, content: &[u8], mode: u32) -> ostree_core::checksum::Checksum {
    let file = FileObject {
        uid: 0,
        gid: 0,
        mode,
        rdev: 0,
        symlink_target: String::new(),
        xattrs: vec![],
        content: content.to_vec(),
    };
    repo.store().put_object(ObjectKind::File, &file.encode()).unwrap()
}

#[test]
fn nested_tree_commits_and_checks_out_clean_via_fsck() {
    let (_dir, repo) = temp_repo(RepoMode::BareUserOnly);

    let readme = put_file(&repo, b"# hello\n", 0o100644);
    let script = put_file(&repo, b"#!/bin/sh\necho hi\n", 0o100755);

    let mut root = MutableTree::new();
    root.set_metadata(DirMeta::new(0, 0, 0o040755, vec![]));
    root.replace_file("README.md", readme);
    {
        let bin = root.ensure_dir("bin");
        bin.set_metadata(DirMeta::new(0, 0, 0o040755, vec![]));
        bin.replace_file("run.sh", script);
    }
    let (root_tree, root_meta) = root.finalize(repo.store()).unwrap();

    let commit = Commit {
        metadata: Metadata::new(),
        parent: None,
        subject: "initial import".into(),
        body: String::new(),
        timestamp: 1_700_000_000,
        root_tree,
        root_meta,
        ref_bindings: vec![],
        collection_binding: None,
        signatures: vec![],
    };
    let commit_checksum = repo.store().put_object(ObjectKind::Commit, &commit.encode()).unwrap();
    repo.refs().set(&RefCategory::Heads, "main", commit_checksum).unwrap();

    // Re-open and walk back down, confirming the nested directory survived
    // the round trip through the object store.
    let reopened = Repository::open(repo.root()).unwrap();
    let resolved = reopened.refs().resolve(&RefCategory::Heads, "main").unwrap();
    assert_eq!(resolved, commit_checksum);

    let loaded_commit = Commit::decode(&reopened.store().open_object(ObjectKind::Commit, &resolved).unwrap()).unwrap();
    let top = DirTree::decode(&reopened.store().open_object(ObjectKind::DirTree, &loaded_commit.root_tree).unwrap())
        .unwrap();
    assert_eq!(top.files.len(), 1);
    assert_eq!(top.files[0].name, "README.md");
    let bin_entry = top.dirs.iter().find(|d| d.name == "bin").unwrap();
    let bin_tree = DirTree::decode(&reopened.store().open_object(ObjectKind::DirTree, &bin_entry.tree_checksum).unwrap())
        .unwrap();
    assert_eq!(bin_tree.files[0].name, "run.sh");

    let report = fsck::fsck(&reopened, &FsckOptions::default()).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.commits_checked, 1);
}

#[test]
fn bare_user_only_rejects_device_nodes() {
    let (_dir, repo) = temp_repo(RepoMode::BareUserOnly);
    let device = FileObject {
        uid: 0,
        gid: 0,
        // A character device bit pattern; bare-user-only forbids these.
        mode: 0o020644,
        rdev: 0x0105,
        symlink_target: String::new(),
        xattrs: vec![],
        content: vec![],
    };
    let result = repo.store().put_object(ObjectKind::File, &device.encode());
    assert!(result.is_err());
}
