//! Pulls a commit from a local-transport remote and then confirms `prune`
//! on the destination keeps exactly what the pull landed.

use ostree_core::commit::Commit;
use ostree_core::commit::Metadata;
use ostree_core::object_store::ObjectKind;
use ostree_core::object_store::RepoMode;
use ostree_core::prune;
use ostree_core::prune::PruneOptions;
use ostree_core::pull::pull_ref_quiet;
use ostree_core::pull::LocalTransport;
use ostree_core::pull::PullOptions;
use ostree_core::pull::RemoteDescriptor;
use ostree_core::refs::RefCategory;
use ostree_core::repo::Repository;
use ostree_core::signing::Ed25519Verifier;
use ostree_core::summary::Summary;
use ostree_core::summary::SummaryRefEntry;
use ostree_core::tree::DirMeta;
use ostree_core::tree::FileObject;
use ostree_core::tree_builder::MutableTree;

fn seed_source_repo(root: &std::path::Path) -> (Repository, ostree_core::checksum::Checksum) {
    let repo = Repository::init(root, RepoMode::BareUserOnly, Some("org.example.Os")).unwrap();
    let file = FileObject {
        uid: 0,
        gid: 0,
        mode: 0o100644,
        rdev: 0,
        symlink_target: String::new(),
        xattrs: vec![],
        content: b"payload one".to_vec(),
    };
    let file_csum = repo.store().put_object(ObjectKind::File, &file.encode()).unwrap();
    let mut tree = MutableTree::new();
    tree.set_metadata(DirMeta::new(0, 0, 0o040755, vec![]));
    tree.replace_file("data.bin", file_csum);
    let (root_tree, root_meta) = tree.finalize(repo.store()).unwrap();

    let commit = Commit {
        metadata: Metadata::new(),
        parent: None,
        subject: "seed".into(),
        body: String::new(),
        timestamp: 10,
        root_tree,
        root_meta,
        ref_bindings: vec!["main".into()],
        collection_binding: Some("org.example.Os".into()),
        signatures: vec![],
    };
    let commit_csum = repo.store().put_object(ObjectKind::Commit, &commit.encode()).unwrap();
    repo.refs().set(&RefCategory::Heads, "main", commit_csum).unwrap();

    let mut summary = Summary::new();
    summary.refs.push(SummaryRefEntry {
        name: "main".into(),
        checksum: commit_csum,
        commit_size: commit.encode().len() as u64,
    });
    std::fs::write(root.join("summary"), summary.encode()).unwrap();
    (repo, commit_csum)
}

#[tokio::test]
async fn pulled_objects_survive_a_prune_and_resolve_to_the_same_commit() {
    let source_dir = tempfile::tempdir().unwrap();
    let (_source_repo, expected_commit) = seed_source_repo(&source_dir.path().join("source"));
    let source_root = source_dir.path().join("source");

    let dest_dir = tempfile::tempdir().unwrap();
    let dest_root = dest_dir.path().join("dest");
    let dest_repo = Repository::init(&dest_root, RepoMode::BareUserOnly, None).unwrap();

    let transport = LocalTransport::new(&source_root);
    let remote = RemoteDescriptor {
        name: "origin".into(),
        url: "file://source".into(),
        gpg_verify: false,
        collection_id: Some("org.example.Os".into()),
        key_path: None,
    };
    let verifier = Ed25519Verifier::new(vec![]);

    let outcome = pull_ref_quiet(
        &dest_repo,
        &remote,
        &transport,
        "main",
        &PullOptions::default(),
        &[],
        &verifier,
    )
    .await
    .unwrap();
    assert_eq!(outcome.commit, expected_commit);

    // Promote the pulled remote ref to a local head so prune's mark phase
    // has something to walk from.
    let remote_head = dest_repo.refs().resolve(&RefCategory::Remote("origin".into()), "main").unwrap();
    dest_repo.refs().set(&RefCategory::Heads, "main", remote_head).unwrap();

    let report = prune::prune(&dest_repo, &PruneOptions::default()).unwrap();
    assert_eq!(report.objects_removed, 0);
    assert!(dest_repo.store().has_object(ObjectKind::Commit, &expected_commit).unwrap());
    assert_eq!(dest_repo.refs().resolve(&RefCategory::Heads, "main").unwrap(), expected_commit);
}
