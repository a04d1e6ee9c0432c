//! `checkout REF DIR` (spec §6): materializes a commit's tree under a plain
//! directory, independent of the sysroot/deployment machinery in
//! [`ostree_core::sysroot`]. Grounded in that module's own `checkout_tree`/
//! `checkout_file` walk, reimplemented here since those are private to the
//! deployment checkout path (it also merges `/etc`, which a bare `checkout`
//! must not do).

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use clap::Args;
use ostree_core::checksum::Checksum;
use ostree_core::commit::Commit;
use ostree_core::error::IoResultExt as _;
use ostree_core::error::OstreeError;
use ostree_core::error::OstreeResult;
use ostree_core::object_store::ObjectKind;
use ostree_core::object_store::ObjectStore;
use ostree_core::refs::RefCategory;
use ostree_core::repo::Repository;
use ostree_core::tree::DirMeta;
use ostree_core::tree::DirTree;
use ostree_core::tree::FileObject;

use super::context;

#[derive(Debug, Args)]
pub struct CheckoutArgs {
    /// Allow checking out into a directory that already exists.
    #[arg(short = 'U', long)]
    union: bool,
    /// Accepted for surface compatibility; this store's objects always
    /// carry their own content (see `ostree_core::sysroot`'s module doc),
    /// so there is no hardlink-free checkout mode to select between.
    #[arg(short = 'H', long)]
    hardlinks: bool,
    refspec: String,
    dir: PathBuf,
}

fn resolve_commit(repo: &Repository, refspec: &str) -> OstreeResult<Checksum> {
    match repo.refs().resolve(&RefCategory::Heads, refspec) {
        Ok(csum) => Ok(csum),
        Err(OstreeError::RefNotFound(_)) => Checksum::from_hex(refspec),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt as _;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

fn checkout_file(file: &FileObject, dest: &Path) -> OstreeResult<()> {
    if file.is_symlink() {
        #[cfg(unix)]
        std::os::unix::fs::symlink(&file.symlink_target, dest).path_context(dest)?;
    } else {
        fs::write(dest, &file.content).path_context(dest)?;
        set_mode(dest, file.mode);
    }
    Ok(())
}

fn checkout_tree(store: &ObjectStore, tree: Checksum, meta: Checksum, dest: &Path) -> OstreeResult<()> {
    let dirmeta = DirMeta::decode(&store.open_object_verified(ObjectKind::DirMeta, &meta)?)?;
    ostree_core::file_util::create_dir_all_reuse(dest).path_context(dest)?;
    set_mode(dest, dirmeta.mode);

    let dirtree = DirTree::decode(&store.open_object_verified(ObjectKind::DirTree, &tree)?)?;
    for file in &dirtree.files {
        let file_obj = FileObject::decode(&store.open_object_verified(ObjectKind::File, &file.checksum)?)?;
        checkout_file(&file_obj, &dest.join(&file.name))?;
    }
    for dir in &dirtree.dirs {
        checkout_tree(store, dir.tree_checksum, dir.meta_checksum, &dest.join(&dir.name))?;
    }
    Ok(())
}

pub fn run(repo_path: Option<PathBuf>, args: CheckoutArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let commit_csum = resolve_commit(&repo, &args.refspec)?;
    let commit = Commit::decode(&repo.store().open_object_verified(ObjectKind::Commit, &commit_csum)?)?;

    if args.dir.exists() && !args.union {
        return Err(OstreeError::Config(format!(
            "destination {:?} already exists; pass --union to check out into it",
            args.dir
        )));
    }
    let _ = args.hardlinks;

    checkout_tree(repo.store(), commit.root_tree, commit.root_meta, &args.dir)
}
