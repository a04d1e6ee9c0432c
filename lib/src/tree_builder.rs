//! The mutable, in-memory tree overlay (spec §4.2) used while assembling a
//! commit. A [`MutableTree`] is edited freely and then [`finalize`]d
//! depth-first into immutable `dirtree`/`dirmeta` objects.
//!
//! [`finalize`]: MutableTree::finalize

use std::collections::BTreeMap;

use crate::checksum::Checksum;
use crate::error::OstreeError;
use crate::error::OstreeResult;
use crate::object_store::ObjectKind;
use crate::object_store::ObjectStore;
use crate::tree::DirEntry;
use crate::tree::DirMeta;
use crate::tree::DirTree;
use crate::tree::FileEntry;

/// A directory under construction: already-finalized file checksums, nested
/// mutable subdirectories, and metadata pending a [`finalize`] call.
///
/// [`finalize`]: MutableTree::finalize
#[derive(Debug, Clone, Default)]
pub struct MutableTree {
    files: BTreeMap<String, Checksum>,
    dirs: BTreeMap<String, MutableTree>,
    meta: Option<DirMeta>,
}

/// What a [`CommitModifier`] filter yields for a candidate path: commit it,
/// or leave it out of the finalized tree entirely (spec §4.2: "a filter
/// callback ... allow or skip").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Allow,
    Skip,
}

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Per-entry policy applied while a directory is imported into a
/// [`MutableTree`] (spec §4.2's commit-modifier contract): an allow/skip
/// filter, a uid/gid override, and the permission canonicalisation and
/// xattr stripping `bare-user-only` requires of anything landing in its
/// object store.
#[derive(Default)]
pub struct CommitModifier {
    filter: Option<Box<dyn Fn(&str, bool) -> FilterDecision>>,
    uid_gid_override: Option<(u32, u32)>,
    canonicalize_permissions: bool,
    strip_xattrs: bool,
}

impl CommitModifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `filter(relative_path, is_dir)` decides whether an entry is imported.
    /// `relative_path` is slash-separated and rooted at the import's top
    /// directory.
    pub fn with_filter(mut self, filter: impl Fn(&str, bool) -> FilterDecision + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_uid_gid_override(mut self, uid: u32, gid: u32) -> Self {
        self.uid_gid_override = Some((uid, gid));
        self
    }

    /// Strips setuid/setgid and forces a canonical 0755 (dirs, executables,
    /// symlinks) or 0644 (other files) permission, as `bare-user-only`
    /// requires (spec §4.2).
    pub fn canonicalize_permissions(mut self, enabled: bool) -> Self {
        self.canonicalize_permissions = enabled;
        self
    }

    pub fn strip_xattrs(mut self, enabled: bool) -> Self {
        self.strip_xattrs = enabled;
        self
    }

    pub(crate) fn decide(&self, relative_path: &str, is_dir: bool) -> FilterDecision {
        self.filter.as_ref().map(|f| f(relative_path, is_dir)).unwrap_or(FilterDecision::Allow)
    }

    pub(crate) fn apply_uid_gid(&self, uid: u32, gid: u32) -> (u32, u32) {
        self.uid_gid_override.unwrap_or((uid, gid))
    }

    /// Canonicalizes `mode`'s permission bits, preserving the file-type bits
    /// (`S_IFMT`) untouched. A no-op unless [`Self::canonicalize_permissions`]
    /// was enabled.
    pub(crate) fn apply_mode(&self, mode: u32) -> u32 {
        if !self.canonicalize_permissions {
            return mode;
        }
        let file_type = mode & S_IFMT;
        let perm = if file_type == S_IFLNK || file_type == S_IFDIR || mode & 0o111 != 0 {
            0o755
        } else {
            0o644
        };
        file_type | perm
    }

    pub(crate) fn apply_xattrs(&self, xattrs: Vec<crate::tree::Xattr>) -> Vec<crate::tree::Xattr> {
        if self.strip_xattrs { Vec::new() } else { xattrs }
    }
}

impl MutableTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mutable copy of an already-finalized `dirtree`/`dirmeta`
    /// pair, so existing content can be edited incrementally (spec §4.2:
    /// mutable trees are built from a base commit's root plus overrides).
    pub fn from_dirtree(store: &ObjectStore, tree: &Checksum, meta: &Checksum) -> OstreeResult<Self> {
        let tree_bytes = store.open_object(ObjectKind::DirTree, tree)?;
        let dirtree = DirTree::decode(&tree_bytes)?;
        let meta_bytes = store.open_object(ObjectKind::DirMeta, meta)?;
        let dirmeta = DirMeta::decode(&meta_bytes)?;

        let mut files = BTreeMap::new();
        for entry in dirtree.files {
            files.insert(entry.name, entry.checksum);
        }
        let mut dirs = BTreeMap::new();
        for entry in dirtree.dirs {
            dirs.insert(entry.name, Self::from_dirtree(store, &entry.tree_checksum, &entry.meta_checksum)?);
        }
        Ok(Self { files, dirs, meta: Some(dirmeta) })
    }

    pub fn set_metadata(&mut self, meta: DirMeta) {
        self.meta = Some(meta);
    }

    /// Replaces or inserts a file's content checksum. The checksummed `file`
    /// object must already exist in the store by the time [`finalize`] is
    /// called.
    ///
    /// [`finalize`]: MutableTree::finalize
    pub fn replace_file(&mut self, name: impl Into<String>, checksum: Checksum) {
        let name = name.into();
        self.dirs.remove(&name);
        self.files.insert(name, checksum);
    }

    pub fn remove(&mut self, name: &str) {
        self.files.remove(name);
        self.dirs.remove(name);
    }

    /// Gets or creates a mutable subdirectory, removing any file entry of
    /// the same name.
    pub fn ensure_dir(&mut self, name: impl Into<String>) -> &mut MutableTree {
        let name = name.into();
        self.files.remove(&name);
        self.dirs.entry(name).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// Finalizes this subtree depth-first: children are written first, then
    /// this directory's own `dirmeta` and `dirtree` objects (spec §4.2 steps
    /// 1-4). Returns `(dirtree checksum, dirmeta checksum)`.
    pub fn finalize(&self, store: &ObjectStore) -> OstreeResult<(Checksum, Checksum)> {
        let mut file_entries = Vec::with_capacity(self.files.len());
        for (name, checksum) in &self.files {
            file_entries.push(FileEntry { name: name.clone(), checksum: *checksum });
        }

        let mut dir_entries = Vec::with_capacity(self.dirs.len());
        for (name, child) in &self.dirs {
            let (tree_checksum, meta_checksum) = child.finalize(store)?;
            dir_entries.push(DirEntry { name: name.clone(), tree_checksum, meta_checksum });
        }

        let dirtree = DirTree::from_entries(file_entries, dir_entries)?;
        let meta = self
            .meta
            .clone()
            .ok_or_else(|| OstreeError::InvalidTree("directory has no dirmeta set".into()))?;

        let meta_checksum = store.put_object(ObjectKind::DirMeta, &meta.encode())?;
        let tree_checksum = store.put_object(ObjectKind::DirTree, &dirtree.encode())?;
        Ok((tree_checksum, meta_checksum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::RepoMode;
    use crate::tree::FileObject;

    fn new_store() -> (tempfile::TempDir, ObjectStore) {
        let dir = crate::tests::new_temp_dir();
        let store = ObjectStore::create(dir.path(), RepoMode::BareUserOnly).unwrap();
        (dir, store)
    }

    fn root_meta() -> DirMeta {
        DirMeta::new(0, 0, 0o040755, vec![])
    }

    fn put_file(store: &ObjectStore, content: &[u8]) -> Checksum {
        let file = FileObject {
            uid: 0,
            gid: 0,
            mode: 0o100644,
            rdev: 0,
            symlink_target: String::new(),
            xattrs: vec![],
            content: content.to_vec(),
        };
        store.put_object(ObjectKind::File, &file.encode()).unwrap()
    }

    #[test]
    fn finalize_empty_root_succeeds() {
        let (_dir, store) = new_store();
        let mut tree = MutableTree::new();
        tree.set_metadata(root_meta());
        let (tree_csum, meta_csum) = tree.finalize(&store).unwrap();
        let decoded = DirTree::decode(&store.open_object(ObjectKind::DirTree, &tree_csum).unwrap()).unwrap();
        assert!(decoded.is_empty());
        assert!(store.has_object(ObjectKind::DirMeta, &meta_csum).unwrap());
    }

    #[test]
    fn finalize_is_depth_first_and_deterministic() {
        let (_dir, store) = new_store();
        let csum = put_file(&store, b"hi");

        let mut a = MutableTree::new();
        a.set_metadata(root_meta());
        a.replace_file("z.txt", csum);
        a.ensure_dir("sub").set_metadata(root_meta());
        a.ensure_dir("sub").replace_file("nested.txt", csum);

        let mut b = a.clone();

        let (tree_a, meta_a) = a.finalize(&store).unwrap();
        let (tree_b, meta_b) = b.finalize(&store).unwrap();
        assert_eq!(tree_a, tree_b);
        assert_eq!(meta_a, meta_b);

        let decoded = DirTree::decode(&store.open_object(ObjectKind::DirTree, &tree_a).unwrap()).unwrap();
        assert_eq!(decoded.files[0].name, "z.txt");
        assert_eq!(decoded.dirs[0].name, "sub");
        b.remove("sub");
        assert!(b.dirs.is_empty());
    }

    #[test]
    fn finalize_without_metadata_fails() {
        let (_dir, store) = new_store();
        let tree = MutableTree::new();
        assert!(tree.finalize(&store).is_err());
    }

    #[test]
    fn commit_modifier_canonicalizes_permissions_by_file_type() {
        let modifier = CommitModifier::new().canonicalize_permissions(true);
        assert_eq!(modifier.apply_mode(0o100644 | 0o4000), 0o100644);
        assert_eq!(modifier.apply_mode(0o100755), 0o100755);
        assert_eq!(modifier.apply_mode(0o100640), 0o100644);
        assert_eq!(modifier.apply_mode(0o040750), 0o040755);
        assert_eq!(modifier.apply_mode(0o120600), 0o120755);
    }

    #[test]
    fn commit_modifier_disabled_leaves_mode_untouched() {
        let modifier = CommitModifier::new();
        assert_eq!(modifier.apply_mode(0o100640), 0o100640);
    }

    #[test]
    fn commit_modifier_filter_defaults_to_allow() {
        let modifier = CommitModifier::new();
        assert_eq!(modifier.decide("a/b", false), FilterDecision::Allow);

        let skipping = CommitModifier::new().with_filter(|path, _| {
            if path == "skip-me" { FilterDecision::Skip } else { FilterDecision::Allow }
        });
        assert_eq!(skipping.decide("skip-me", false), FilterDecision::Skip);
        assert_eq!(skipping.decide("keep-me", false), FilterDecision::Allow);
    }

    #[test]
    fn round_trips_through_from_dirtree() {
        let (_dir, store) = new_store();
        let csum = put_file(&store, b"content");
        let mut original = MutableTree::new();
        original.set_metadata(root_meta());
        original.replace_file("a.txt", csum);
        let (tree_csum, meta_csum) = original.finalize(&store).unwrap();

        let reloaded = MutableTree::from_dirtree(&store, &tree_csum, &meta_csum).unwrap();
        let (tree_csum2, meta_csum2) = reloaded.finalize(&store).unwrap();
        assert_eq!(tree_csum, tree_csum2);
        assert_eq!(meta_csum, meta_csum2);
    }
}
