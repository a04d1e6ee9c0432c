//! Fixture builders shared by `ostree-core`'s own test modules and
//! `ostree-cli`'s integration tests: a temp-dir helper plus small functions
//! for seeding a repository, a commit, and a sysroot without repeating the
//! object/tree-builder boilerplate at every call site.

use ostree_core::checksum::Checksum;
use ostree_core::commit::Commit;
use ostree_core::commit::Metadata;
use ostree_core::object_store::ObjectKind;
use ostree_core::object_store::RepoMode;
use ostree_core::repo::Repository;
use ostree_core::sysroot::Sysroot;
use ostree_core::tree::DirMeta;
use ostree_core::tree::FileObject;
use ostree_core::tree_builder::MutableTree;
use tempfile::TempDir;

pub fn new_temp_dir() -> TempDir {
    tempfile::Builder::new().prefix("ostree-testutils-").tempdir().unwrap()
}

/// Initializes a fresh `bare-user-only` repository under a temp dir the
/// caller owns (dropping it deletes the repository).
pub fn init_repo(dir: &TempDir) -> Repository {
    Repository::init(&dir.path().join("repo"), RepoMode::BareUserOnly, None).unwrap()
}

pub fn init_repo_with_mode(dir: &TempDir, mode: RepoMode, collection_id: Option<&str>) -> Repository {
    Repository::init(&dir.path().join("repo"), mode, collection_id).unwrap()
}

/// Builds a one-file tree at `path` (slash-separated) with `content`,
/// commits it, and returns the commit's checksum. Does not write a ref.
pub fn commit_single_file(repo: &Repository, path: &str, content: &[u8], parent: Option<Checksum>) -> Checksum {
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
    let mut components: Vec<&str> = path.split('/').collect();
    let file_name = components.pop().expect("path has at least one component");
    let mut cursor = &mut root;
    for dir_name in components {
        cursor = cursor.ensure_dir(dir_name);
        cursor.set_metadata(DirMeta::new(0, 0, 0o040755, vec![]));
    }
    cursor.replace_file(file_name, file_csum);

    let (root_tree, root_meta) = root.finalize(repo.store()).unwrap();
    let commit = Commit {
        metadata: Metadata::new(),
        parent,
        subject: "test commit".into(),
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

/// Initializes a sysroot under a temp dir the caller owns, with one
/// stateroot (`"testos"`) ready for `deploy`.
pub fn init_sysroot(dir: &TempDir) -> Sysroot {
    let sysroot = Sysroot::new(dir.path().join("sysroot"));
    sysroot.init_fs().unwrap();
    sysroot.os_init("testos").unwrap();
    sysroot
}

#[cfg(test)]
mod tests {
    use ostree_core::refs::RefCategory;

    use super::*;

    #[test]
    fn commit_single_file_round_trips_through_the_object_store() {
        let dir = new_temp_dir();
        let repo = init_repo(&dir);
        let csum = commit_single_file(&repo, "a/b.txt", b"hi", None);
        repo.refs().set(&RefCategory::Heads, "main", csum).unwrap();
        assert_eq!(repo.refs().resolve(&RefCategory::Heads, "main").unwrap(), csum);
    }
}
