//! The delta reconstruction machine (spec §4.6): three buffers (source,
//! payload, scratch) driven by a part's opcode sequence.

use crate::checksum::Checksum;
use crate::delta::DeltaError;
use crate::delta::Opcode;
use crate::delta::Part;
use crate::delta::PartLocation;
use crate::delta::Superblock;
use crate::error::OstreeResult;
use crate::object_store::ObjectKind;
use crate::object_store::ObjectStore;
use crate::tree::FileObject;

struct Machine<'a> {
    source_store: &'a ObjectStore,
    source: Vec<u8>,
    scratch: Vec<u8>,
    mode: u32,
    uid: u32,
    gid: u32,
}

fn slice_or_err<'a>(buf: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8], DeltaError> {
    buf.get(offset..offset + len)
        .ok_or_else(|| DeltaError::OffsetOutOfRange(format!("range {offset}..{}  exceeds buffer of {}", offset + len, buf.len())))
}

impl<'a> Machine<'a> {
    fn new(source_store: &'a ObjectStore) -> Self {
        Self { source_store, source: Vec::new(), scratch: Vec::new(), mode: 0o100644, uid: 0, gid: 0 }
    }

    fn run_opcode(&mut self, op: &Opcode, payload: &[u8], dest: &ObjectStore) -> OstreeResult<()> {
        match op {
            Opcode::Open(csum) => {
                self.source = self.source_store.open_object(ObjectKind::File, csum).and_then(|bytes| {
                    Ok(crate::tree::FileObject::decode(&bytes)?.content)
                })?;
            }
            Opcode::Copy { src_offset, len } => {
                self.scratch.extend_from_slice(slice_or_err(&self.source, *src_offset, *len)?);
            }
            Opcode::Write { payload_offset, len } => {
                self.scratch.extend_from_slice(slice_or_err(payload, *payload_offset, *len)?);
            }
            Opcode::SetMode { mode, uid, gid } => {
                self.mode = *mode;
                self.uid = *uid;
                self.gid = *gid;
            }
            Opcode::BsDiff { payload_offset, len, src_offset, src_len } => {
                let diff = slice_or_err(payload, *payload_offset, *len)?;
                let src_available = (*src_len).min(self.source.len().saturating_sub(*src_offset));
                for i in 0..*len {
                    let old_byte = if i < src_available { self.source[src_offset + i] } else { 0 };
                    self.scratch.push(old_byte.wrapping_add(diff[i]));
                }
            }
            Opcode::Close(expected) => {
                let file = FileObject {
                    uid: self.uid,
                    gid: self.gid,
                    mode: self.mode,
                    rdev: 0,
                    symlink_target: String::new(),
                    xattrs: vec![],
                    content: std::mem::take(&mut self.scratch),
                };
                let encoded = file.encode();
                let observed = Checksum::of(&encoded);
                if observed != *expected {
                    return Err(DeltaError::PartChecksumMismatch { expected: *expected, observed }.into());
                }
                dest.put_object(ObjectKind::File, &encoded)?;
                self.mode = 0o100644;
                self.uid = 0;
                self.gid = 0;
            }
        }
        Ok(())
    }
}

fn apply_part(part: &Part, source_store: &ObjectStore, dest: &ObjectStore) -> OstreeResult<()> {
    let mut machine = Machine::new(source_store);
    for op in &part.opcodes {
        machine.run_opcode(op, &part.payload, dest)?;
    }
    Ok(())
}

/// Applies every part of `superblock` in order, writing reconstructed
/// objects into `dest` (spec §4.5 step 4). `source_store` supplies objects
/// named by `Open` opcodes — ordinarily the local repository, which already
/// holds the delta's `from` commit.
///
/// External parts must already be decoded by the caller (the pull engine,
/// after fetching `part-<k>`) and supplied via `external_parts` in order;
/// inline parts are applied directly from the superblock.
pub fn apply_delta(
    superblock: &Superblock,
    external_parts: &[Part],
    source_store: &ObjectStore,
    dest: &ObjectStore,
) -> OstreeResult<()> {
    let mut external_iter = external_parts.iter();
    for part_location in &superblock.parts {
        match part_location {
            PartLocation::Inline(part) => apply_part(part, source_store, dest)?,
            PartLocation::External { .. } => {
                let part = external_iter.next().ok_or_else(|| {
                    crate::error::OstreeError::DeltaError(DeltaError::MalformedSuperblock(
                        "fewer external parts supplied than the superblock declares".into(),
                    ))
                })?;
                apply_part(part, source_store, dest)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::generate::DeltaOptions;
    use crate::delta::generate::generate_delta;
    use crate::tree::FileObject;

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
    fn bsdiff_opcode_reconstructs_exact_bytes() {
        let dir = crate::tests::new_temp_dir();
        let store = ObjectStore::create(dir.path(), crate::object_store::RepoMode::BareUserOnly).unwrap();
        let old_csum = put_file(&store, b"hello world, this is a test");
        let new_content = b"hello world, THIS is a test!";

        let payload: Vec<u8> = b"hello world, this is a test"
            .iter()
            .zip(new_content.iter())
            .map(|(o, n)| n.wrapping_sub(*o))
            .collect();
        let part = Part {
            opcodes: vec![
                Opcode::Open(old_csum),
                Opcode::BsDiff { payload_offset: 0, len: 28, src_offset: 0, src_len: 28 },
                Opcode::Write { payload_offset: 28, len: 1 },
                Opcode::SetMode { mode: 0o100644, uid: 0, gid: 0 },
                Opcode::Close(Checksum::of(&FileObject {
                    uid: 0,
                    gid: 0,
                    mode: 0o100644,
                    rdev: 0,
                    symlink_target: String::new(),
                    xattrs: vec![],
                    content: new_content.to_vec(),
                }.encode())),
            ],
            payload: [payload, vec![b'!']].concat(),
        };

        let dest_dir = crate::tests::new_temp_dir();
        let dest = ObjectStore::create(dest_dir.path(), crate::object_store::RepoMode::BareUserOnly).unwrap();
        apply_part(&part, &store, &dest).unwrap();

        let new_checksum = Checksum::of(&FileObject {
            uid: 0,
            gid: 0,
            mode: 0o100644,
            rdev: 0,
            symlink_target: String::new(),
            xattrs: vec![],
            content: new_content.to_vec(),
        }.encode());
        let decoded = FileObject::decode(&dest.open_object(ObjectKind::File, &new_checksum).unwrap()).unwrap();
        assert_eq!(decoded.content, new_content);
    }

    #[test]
    fn generate_then_apply_round_trips_a_single_file_commit() {
        let dir = crate::tests::new_temp_dir();
        let store = ObjectStore::create(dir.path(), crate::object_store::RepoMode::BareUserOnly).unwrap();

        let old_file = put_file(&store, b"version one of the file contents");
        let mut old_tree = crate::tree_builder::MutableTree::new();
        old_tree.set_metadata(crate::tree::DirMeta::new(0, 0, 0o040755, vec![]));
        old_tree.replace_file("a.txt", old_file);
        let (old_root_tree, old_root_meta) = old_tree.finalize(&store).unwrap();
        let old_commit = crate::commit::Commit {
            metadata: crate::commit::Metadata::new(),
            parent: None,
            subject: "first".into(),
            body: String::new(),
            timestamp: 1,
            root_tree: old_root_tree,
            root_meta: old_root_meta,
            ref_bindings: vec![],
            collection_binding: None,
            signatures: vec![],
        };
        store.put_object(ObjectKind::Commit, &old_commit.encode()).unwrap();

        let new_file = put_file(&store, b"version TWO of the file contents, slightly longer");
        let mut new_tree = crate::tree_builder::MutableTree::from_dirtree(&store, &old_root_tree, &old_root_meta).unwrap();
        new_tree.replace_file("a.txt", new_file);
        let (new_root_tree, new_root_meta) = new_tree.finalize(&store).unwrap();
        let new_commit = crate::commit::Commit {
            parent: Some(old_commit.checksum()),
            root_tree: new_root_tree,
            root_meta: new_root_meta,
            subject: "second".into(),
            timestamp: 2,
            ..old_commit.clone()
        };
        store.put_object(ObjectKind::Commit, &new_commit.encode()).unwrap();

        let superblock =
            generate_delta(&store, Some(&old_commit), &new_commit, &DeltaOptions::default()).unwrap();

        let dest_dir = crate::tests::new_temp_dir();
        let dest = ObjectStore::create(dest_dir.path(), crate::object_store::RepoMode::BareUserOnly).unwrap();
        dest.put_object(ObjectKind::File, &FileObject::decode(&store.open_object(ObjectKind::File, &old_file).unwrap()).unwrap().encode()).unwrap();

        apply_delta(&superblock, &[], &store, &dest).unwrap();
        let reconstructed = dest.open_object(ObjectKind::File, &new_file).unwrap();
        assert_eq!(FileObject::decode(&reconstructed).unwrap().content, b"version TWO of the file contents, slightly longer");
    }
}
