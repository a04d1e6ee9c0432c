//! Static-delta generation (spec §4.6): flattens both commits' trees and
//! emits one part per changed file, using a greedy common-prefix/suffix
//! match in place of a true bsdiff (see the module-level doc comment).

use std::collections::BTreeMap;

use crate::checksum::Checksum;
use crate::commit::Commit;
use crate::delta::FallbackEntry;
use crate::delta::Opcode;
use crate::delta::Part;
use crate::delta::PartLocation;
use crate::delta::Superblock;
use crate::error::OstreeResult;
use crate::object_store::ObjectKind;
use crate::object_store::ObjectStore;
use crate::tree::DirTree;
use crate::tree::FileObject;

/// Tuning knobs for delta generation (spec §4.6: deltas MAY fall back to
/// whole-object transfer for files too large or dissimilar to diff cheaply).
#[derive(Debug, Clone)]
pub struct DeltaOptions {
    /// Files larger than this, in either version, skip the matcher and
    /// become `Write`-only parts (still inline, just no `BsDiff`).
    pub max_bsdiff_size: u64,
    /// Files larger than this become fallback entries instead of parts.
    pub max_inline_size: u64,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self { max_bsdiff_size: 16 * 1024 * 1024, max_inline_size: 64 * 1024 * 1024 }
    }
}

fn flatten_tree(
    store: &ObjectStore,
    tree: &Checksum,
    prefix: &str,
    out: &mut BTreeMap<String, Checksum>,
) -> OstreeResult<()> {
    let bytes = store.open_object(ObjectKind::DirTree, tree)?;
    let dirtree = DirTree::decode(&bytes)?;
    for file in &dirtree.files {
        out.insert(format!("{prefix}/{}", file.name), file.checksum);
    }
    for dir in &dirtree.dirs {
        flatten_tree(store, &dir.tree_checksum, &format!("{prefix}/{}", dir.name), out)?;
    }
    Ok(())
}

/// Finds the longest common prefix and, within what remains, the longest
/// common suffix between `old` and `new`. The two never overlap.
fn common_prefix_suffix(old: &[u8], new: &[u8]) -> (usize, usize) {
    let max_prefix = old.len().min(new.len());
    let prefix = (0..max_prefix).take_while(|&i| old[i] == new[i]).count();

    let old_rest = &old[prefix..];
    let new_rest = &new[prefix..];
    let max_suffix = old_rest.len().min(new_rest.len());
    let suffix = (0..max_suffix)
        .take_while(|&i| old_rest[old_rest.len() - 1 - i] == new_rest[new_rest.len() - 1 - i])
        .count();
    (prefix, suffix)
}

/// Builds the opcode sequence reconstructing `new_bytes` given `old_bytes`
/// already loaded into the machine's `source` buffer via an `Open` opcode.
fn diff_opcodes(old_bytes: &[u8], new_bytes: &[u8], payload: &mut Vec<u8>) -> Vec<Opcode> {
    let (prefix, suffix) = common_prefix_suffix(old_bytes, new_bytes);
    let mut opcodes = Vec::new();

    if prefix > 0 {
        opcodes.push(Opcode::Copy { src_offset: 0, len: prefix });
    }

    let old_mid = &old_bytes[prefix..old_bytes.len() - suffix];
    let new_mid = &new_bytes[prefix..new_bytes.len() - suffix];
    if !new_mid.is_empty() {
        if !old_mid.is_empty() {
            let diff_len = new_mid.len();
            let offset = payload.len();
            for i in 0..diff_len {
                let old_byte = if i < old_mid.len() { old_mid[i] } else { 0 };
                payload.push(new_mid[i].wrapping_sub(old_byte));
            }
            opcodes.push(Opcode::BsDiff {
                payload_offset: offset,
                len: diff_len,
                src_offset: prefix,
                src_len: old_mid.len(),
            });
        } else {
            let offset = payload.len();
            payload.extend_from_slice(new_mid);
            opcodes.push(Opcode::Write { payload_offset: offset, len: new_mid.len() });
        }
    }

    if suffix > 0 {
        opcodes.push(Opcode::Copy { src_offset: old_bytes.len() - suffix, len: suffix });
    }

    opcodes
}

/// Builds the superblock carrying every file changed between `from` (absent
/// for an initial pull) and `to` (spec §4.6, §4.5 step 2).
pub fn generate_delta(
    store: &ObjectStore,
    from: Option<&Commit>,
    to: &Commit,
    options: &DeltaOptions,
) -> OstreeResult<Superblock> {
    let mut from_files = BTreeMap::new();
    if let Some(from_commit) = from {
        flatten_tree(store, &from_commit.root_tree, "", &mut from_files)?;
    }
    let mut to_files = BTreeMap::new();
    flatten_tree(store, &to.root_tree, "", &mut to_files)?;

    let mut parts = Vec::new();
    let mut fallback = Vec::new();

    for (path, new_checksum) in &to_files {
        let old_checksum = from_files.get(path);
        if old_checksum == Some(new_checksum) {
            continue;
        }

        let new_bytes = store.open_object(ObjectKind::File, new_checksum)?;
        let new_file = FileObject::decode(&new_bytes)?;

        if new_file.size() > options.max_inline_size {
            fallback.push(FallbackEntry { kind: ObjectKind::File, checksum: *new_checksum, size: new_file.size() });
            continue;
        }

        let mut opcodes = Vec::new();
        let mut payload = Vec::new();

        if let Some(old_checksum) = old_checksum {
            let old_bytes = store.open_object(ObjectKind::File, old_checksum)?;
            let old_file = FileObject::decode(&old_bytes)?;
            opcodes.push(Opcode::Open(*old_checksum));
            if old_file.content.len() as u64 <= options.max_bsdiff_size
                && new_file.content.len() as u64 <= options.max_bsdiff_size
            {
                opcodes.extend(diff_opcodes(&old_file.content, &new_file.content, &mut payload));
            } else {
                let offset = payload.len();
                payload.extend_from_slice(&new_file.content);
                opcodes.push(Opcode::Write { payload_offset: offset, len: new_file.content.len() });
            }
        } else {
            let offset = payload.len();
            payload.extend_from_slice(&new_file.content);
            opcodes.push(Opcode::Write { payload_offset: offset, len: new_file.content.len() });
        }

        opcodes.push(Opcode::SetMode { mode: new_file.mode, uid: new_file.uid, gid: new_file.gid });
        opcodes.push(Opcode::Close(*new_checksum));

        parts.push(PartLocation::Inline(Part { opcodes, payload }));
    }

    Ok(Superblock {
        from: from.map(|c| c.checksum()),
        to: to.checksum(),
        timestamp: to.timestamp,
        big_endian: false,
        fallback,
        parts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::RepoMode;

    fn new_store() -> (tempfile::TempDir, ObjectStore) {
        let dir = crate::tests::new_temp_dir();
        let store = ObjectStore::create(dir.path(), RepoMode::BareUserOnly).unwrap();
        (dir, store)
    }

    #[test]
    fn common_prefix_suffix_finds_non_overlapping_match() {
        let (prefix, suffix) = common_prefix_suffix(b"hello world", b"hello brave world");
        assert_eq!(prefix, 6);
        assert_eq!(suffix, 6);
    }

    #[test]
    fn diff_opcodes_reconstructs_via_bsdiff_when_old_present() {
        let mut payload = Vec::new();
        let ops = diff_opcodes(b"aaaXXXzzz", b"aaaYYYYzzz", &mut payload);
        assert!(ops.iter().any(|op| matches!(op, Opcode::BsDiff { .. })));
    }

    #[test]
    fn generate_delta_emits_a_fallback_entry_for_oversized_files() {
        let (_dir, store) = new_store();
        let big_content = vec![7u8; 128];
        let file = FileObject {
            uid: 0,
            gid: 0,
            mode: 0o100644,
            rdev: 0,
            symlink_target: String::new(),
            xattrs: vec![],
            content: big_content,
        };
        let checksum = store.put_object(ObjectKind::File, &file.encode()).unwrap();

        let mut tree = crate::tree_builder::MutableTree::new();
        tree.set_metadata(crate::tree::DirMeta::new(0, 0, 0o040755, vec![]));
        tree.replace_file("big.bin", checksum);
        let (root_tree, root_meta) = tree.finalize(&store).unwrap();

        let commit = Commit {
            metadata: crate::commit::Metadata::new(),
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
        store.put_object(ObjectKind::Commit, &commit.encode()).unwrap();

        let options = DeltaOptions { max_bsdiff_size: 16 * 1024 * 1024, max_inline_size: 64 };
        let superblock = generate_delta(&store, None, &commit, &options).unwrap();
        assert_eq!(superblock.fallback.len(), 1);
        assert!(superblock.parts.is_empty());
    }
}
