//! End-to-end deploy -> upgrade -> undeploy -> cleanup across the public
//! `Sysroot` API, exercising the etc merge and boot-slot flip together
//! rather than in isolation.

use ostree_core::commit::Commit;
use ostree_core::commit::Metadata;
use ostree_core::object_store::ObjectKind;
use ostree_core::object_store::RepoMode;
use ostree_core::repo::Repository;
use ostree_core::sysroot::BlsBootloader;
use ostree_core::sysroot::KernelArgs;
use ostree_core::sysroot::Origin;
use ostree_core::sysroot::Sysroot;
use ostree_core::tree::DirMeta;
use ostree_core::tree::FileObject;
use ostree_core::tree_builder::MutableTree;

fn commit_etc_file(repo: &Repository, relpath: &[&str], content: &[u8]) -> ostree_core::checksum::Checksum {
    let file = FileObject {
        uid: 0,
        gid: 0,
        mode: 0o100644,
        rdev: 0,
        symlink_target: String::new(),
        xattrs: vec![],
        content: content.to_vec(),
    };
    let file_csum = repo.store().put_object(ObjectKind::File, &file.encode()).unwrap();

    let mut root = MutableTree::new();
    root.set_metadata(DirMeta::new(0, 0, 0o040755, vec![]));
    let mut cursor = &mut root;
    let (dirs, name) = relpath.split_at(relpath.len() - 1);
    for dir in dirs {
        cursor = cursor.ensure_dir(*dir);
        cursor.set_metadata(DirMeta::new(0, 0, 0o040755, vec![]));
    }
    cursor.replace_file(name[0], file_csum);

    let (root_tree, root_meta) = root.finalize(repo.store()).unwrap();
    let commit = Commit {
        metadata: Metadata::new(),
        parent: None,
        subject: "os update".into(),
        body: String::new(),
        timestamp: 1,
        root_tree,
        root_meta,
        ref_bindings: vec![],
        collection_binding: None,
        signatures: vec![],
    };
    repo.store().put_object(ObjectKind::Commit, &commit.encode()).unwrap()
}

#[test]
fn deploy_twice_flips_boot_slot_and_keeps_user_etc_edits() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(&dir.path().join("repo"), RepoMode::BareUserOnly, None).unwrap();
    let sysroot = Sysroot::new(dir.path().join("sysroot"));
    sysroot.init_fs().unwrap();
    sysroot.os_init("myos").unwrap();

    let bootloader = BlsBootloader;
    let kargs = KernelArgs::parse("root=UUID=x ro");

    let v1 = commit_etc_file(&repo, &["usr", "etc", "hostname"], b"host-v1\n");
    let deployment_one = sysroot
        .deploy(&repo, "myos", v1, Origin::new("origin:main"), &kargs, &bootloader)
        .unwrap();
    assert_eq!(sysroot.current_boot_version().unwrap().0, 0);

    // The admin hand-edits the live etc of the first deployment.
    let live_etc = sysroot
        .root()
        .join("ostree/deploy/myos/deploy")
        .join(deployment_one.directory_name())
        .join("etc/hostname");
    std::fs::write(&live_etc, b"host-customized\n").unwrap();

    let v2 = commit_etc_file(&repo, &["usr", "etc", "hostname"], b"host-v2\n");
    let deployment_two = sysroot
        .deploy(&repo, "myos", v2, Origin::new("origin:main"), &kargs, &bootloader)
        .unwrap();

    assert_eq!(sysroot.current_boot_version().unwrap().0, 1);

    let new_live_etc = sysroot
        .root()
        .join("ostree/deploy/myos/deploy")
        .join(deployment_two.directory_name())
        .join("etc/hostname");
    let contents = std::fs::read_to_string(&new_live_etc).unwrap();
    assert_eq!(contents, "host-customized\n");

    let statuses = sysroot.status("myos").unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses[0].booted);
    assert_eq!(statuses[0].commit, v2);
}

#[test]
fn undeploy_then_cleanup_removes_the_dropped_checkout() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(&dir.path().join("repo"), RepoMode::BareUserOnly, None).unwrap();
    let sysroot = Sysroot::new(dir.path().join("sysroot"));
    sysroot.init_fs().unwrap();
    sysroot.os_init("myos").unwrap();

    let bootloader = BlsBootloader;
    let kargs = KernelArgs::new();

    let v1 = commit_etc_file(&repo, &["usr", "etc", "hostname"], b"v1\n");
    sysroot.deploy(&repo, "myos", v1, Origin::new("origin:main"), &kargs, &bootloader).unwrap();
    let v2 = commit_etc_file(&repo, &["usr", "etc", "hostname"], b"v2\n");
    let deployment_two =
        sysroot.deploy(&repo, "myos", v2, Origin::new("origin:main"), &kargs, &bootloader).unwrap();

    // Drop the now-superseded first deployment (index 1, oldest first).
    sysroot.undeploy("myos", 1, &bootloader).unwrap();
    sysroot.cleanup("myos").unwrap();

    let remaining = sysroot.deployments("myos").unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].commit, deployment_two.commit);

    let deploy_dir = sysroot.root().join("ostree/deploy/myos/deploy");
    let leftover: Vec<_> = std::fs::read_dir(&deploy_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftover.len(), 1);
}
