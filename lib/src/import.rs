//! Importing a local directory into the object store as a commit's tree
//! (spec §6: `commit --tree=DIR`), the inverse of [`crate::sysroot`]'s
//! checkout.

use std::fs;
use std::path::Path;

use crate::checksum::Checksum;
use crate::error::IoResultExt as _;
use crate::error::OstreeResult;
use crate::object_store::ObjectKind;
use crate::object_store::ObjectStore;
use crate::tree::DirMeta;
use crate::tree::FileObject;
use crate::tree_builder::CommitModifier;
use crate::tree_builder::FilterDecision;
use crate::tree_builder::MutableTree;

#[cfg(unix)]
fn file_mode_and_owner(meta: &fs::Metadata) -> (u32, u32, u32) {
    use std::os::unix::fs::MetadataExt as _;
    (meta.uid(), meta.gid(), meta.mode())
}

#[cfg(not(unix))]
fn file_mode_and_owner(meta: &fs::Metadata) -> (u32, u32, u32) {
    let mode = if meta.is_dir() { 0o040755 } else { 0o100644 };
    (0, 0, mode)
}

fn import_into(
    store: &ObjectStore,
    dir: &Path,
    relative_path: &str,
    tree: &mut MutableTree,
    modifier: &CommitModifier,
) -> OstreeResult<()> {
    let dir_meta = fs::symlink_metadata(dir).path_context(dir)?;
    let (uid, gid, mode) = file_mode_and_owner(&dir_meta);
    let (uid, gid) = modifier.apply_uid_gid(uid, gid);
    let mode = modifier.apply_mode(mode);
    tree.set_metadata(DirMeta::new(uid, gid, mode, modifier.apply_xattrs(vec![])));

    let mut entries: Vec<_> = fs::read_dir(dir).path_context(dir)?.collect::<Result<_, _>>().path_context(dir)?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let entry_path =
            if relative_path.is_empty() { name.clone() } else { format!("{relative_path}/{name}") };
        let meta = fs::symlink_metadata(&path).path_context(&path)?;
        let is_dir = meta.is_dir();

        if modifier.decide(&entry_path, is_dir) == FilterDecision::Skip {
            continue;
        }

        if is_dir {
            let child = tree.ensure_dir(name);
            import_into(store, &path, &entry_path, child, modifier)?;
        } else if meta.file_type().is_symlink() {
            let target = fs::read_link(&path).path_context(&path)?;
            let (uid, gid, mode) = file_mode_and_owner(&meta);
            let (uid, gid) = modifier.apply_uid_gid(uid, gid);
            let mode = modifier.apply_mode(mode);
            let file = FileObject {
                uid,
                gid,
                mode,
                rdev: 0,
                symlink_target: target.to_string_lossy().into_owned(),
                xattrs: modifier.apply_xattrs(vec![]),
                content: vec![],
            };
            let checksum = store.put_object(ObjectKind::File, &file.encode())?;
            tree.replace_file(name, checksum);
        } else {
            let content = fs::read(&path).path_context(&path)?;
            let (uid, gid, mode) = file_mode_and_owner(&meta);
            let (uid, gid) = modifier.apply_uid_gid(uid, gid);
            let mode = modifier.apply_mode(mode);
            let file = FileObject {
                uid,
                gid,
                mode,
                rdev: 0,
                symlink_target: String::new(),
                xattrs: modifier.apply_xattrs(vec![]),
                content,
            };
            let checksum = store.put_object(ObjectKind::File, &file.encode())?;
            tree.replace_file(name, checksum);
        }
    }
    Ok(())
}

/// Walks `root` and stores every file/symlink/directory as the object
/// store's dirtree/dirmeta/file objects, applying `modifier`'s filter,
/// uid/gid override, and permission/xattr canonicalisation to each entry
/// (spec §4.2), and returning `(root_tree, root_meta)` for use as a commit's
/// tree fields.
pub fn import_directory(store: &ObjectStore, root: &Path, modifier: &CommitModifier) -> OstreeResult<(Checksum, Checksum)> {
    let mut tree = MutableTree::new();
    import_into(store, root, "", &mut tree, modifier)?;
    tree.finalize(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::RepoMode;
    use crate::tree::DirTree;

    #[test]
    fn imports_nested_files_and_a_symlink() {
        let dir = crate::tests::new_temp_dir();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("README"), b"hi").unwrap();
        fs::write(src.join("bin/tool"), b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("tool", src.join("bin/tool-link")).unwrap();

        let store_dir = dir.path().join("objects-repo");
        let store = ObjectStore::create(&store_dir, RepoMode::BareUserOnly).unwrap();
        let (root_tree, _root_meta) = import_directory(&store, &src, &CommitModifier::new()).unwrap();

        let top = DirTree::decode(&store.open_object(ObjectKind::DirTree, &root_tree).unwrap()).unwrap();
        assert_eq!(top.files[0].name, "README");
        let bin = top.dirs.iter().find(|d| d.name == "bin").unwrap();
        let bin_tree = DirTree::decode(&store.open_object(ObjectKind::DirTree, &bin.tree_checksum).unwrap()).unwrap();
        assert_eq!(bin_tree.files.len(), 2);
    }

    #[test]
    fn canonicalize_permissions_forces_bare_user_only_clean_modes() {
        let dir = crate::tests::new_temp_dir();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("data"), b"hi").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            fs::set_permissions(src.join("data"), fs::Permissions::from_mode(0o100777)).unwrap();
        }

        let store_dir = dir.path().join("objects-repo");
        let store = ObjectStore::create(&store_dir, RepoMode::BareUserOnly).unwrap();
        let modifier = CommitModifier::new().canonicalize_permissions(true);
        let (root_tree, _root_meta) = import_directory(&store, &src, &modifier).unwrap();

        let top = DirTree::decode(&store.open_object(ObjectKind::DirTree, &root_tree).unwrap()).unwrap();
        let file = FileObject::decode(&store.open_object(ObjectKind::File, &top.files[0].checksum).unwrap()).unwrap();
        assert_eq!(file.mode, 0o100755);
    }

    #[test]
    fn filter_skips_matching_entries() {
        let dir = crate::tests::new_temp_dir();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("keep"), b"a").unwrap();
        fs::write(src.join("skip"), b"b").unwrap();

        let store_dir = dir.path().join("objects-repo");
        let store = ObjectStore::create(&store_dir, RepoMode::Bare).unwrap();
        let modifier = CommitModifier::new()
            .with_filter(|path, _| if path == "skip" { FilterDecision::Skip } else { FilterDecision::Allow });
        let (root_tree, _root_meta) = import_directory(&store, &src, &modifier).unwrap();

        let top = DirTree::decode(&store.open_object(ObjectKind::DirTree, &root_tree).unwrap()).unwrap();
        assert_eq!(top.files.len(), 1);
        assert_eq!(top.files[0].name, "keep");
    }
}
