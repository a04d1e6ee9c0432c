//! The tree model (spec §3, §4.2): `dirmeta`, `dirtree`, and `file` objects,
//! plus the xattr list both directory and file metadata carry.
//!
//! These are the immutable, on-disk-encoded counterparts of the in-memory
//! [`crate::tree_builder::MutableTree`]. Checksums are computed by
//! [`crate::object_store::ObjectStore::put_object`] over the bytes these
//! types serialize to; the types themselves only know how to encode and
//! decode, not how to hash or where to live on disk.

use crate::canonical::Reader;
use crate::canonical::Writer;
use crate::checksum::Checksum;
use crate::error::OstreeError;

/// An extended attribute as a raw name/value pair, sorted by name in every
/// encoded list (spec §6: `xattrs:[(name, value)] sorted by name`).
pub type Xattr = (Vec<u8>, Vec<u8>);

fn encode_xattrs(w: &mut Writer, xattrs: &[Xattr]) {
    w.write_seq(xattrs, |w, (name, value)| {
        w.write_bytes(name);
        w.write_bytes(value);
    });
}

fn decode_xattrs(r: &mut Reader) -> Result<Vec<Xattr>, OstreeError> {
    r.read_seq(|r| Ok((r.read_bytes()?, r.read_bytes()?)))
}

fn is_sorted_by_name(xattrs: &[Xattr]) -> bool {
    xattrs.windows(2).all(|w| w[0].0 <= w[1].0)
}

/// Directory mode/uid/gid/xattrs (spec §3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirMeta {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub xattrs: Vec<Xattr>,
}

impl DirMeta {
    pub fn new(uid: u32, gid: u32, mode: u32, mut xattrs: Vec<Xattr>) -> Self {
        xattrs.sort_by(|a, b| a.0.cmp(&b.0));
        Self { uid, gid, mode, xattrs }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u32(self.uid);
        w.write_u32(self.gid);
        w.write_u32(self.mode);
        encode_xattrs(&mut w, &self.xattrs);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OstreeError> {
        let mut r = Reader::new(bytes);
        let uid = r.read_u32()?;
        let gid = r.read_u32()?;
        let mode = r.read_u32()?;
        let xattrs = decode_xattrs(&mut r)?;
        r.finish()?;
        if !is_sorted_by_name(&xattrs) {
            return Err(OstreeError::InvalidTree("dirmeta xattrs not sorted".into()));
        }
        Ok(Self { uid, gid, mode, xattrs })
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::of(&self.encode())
    }
}

/// A regular file or symlink's metadata + content (spec §3, §6). Content is
/// empty for symlinks; `symlink_target` is empty for regular files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileObject {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub rdev: u32,
    pub symlink_target: String,
    pub xattrs: Vec<Xattr>,
    pub content: Vec<u8>,
}

impl FileObject {
    pub fn is_symlink(&self) -> bool {
        !self.symlink_target.is_empty()
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u64(self.size());
        w.write_u32(self.uid);
        w.write_u32(self.gid);
        w.write_u32(self.mode);
        w.write_u32(self.rdev);
        w.write_string(&self.symlink_target);
        encode_xattrs(&mut w, &self.xattrs);
        w.write_bytes(&self.content);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OstreeError> {
        let mut r = Reader::new(bytes);
        let size = r.read_u64()?;
        let uid = r.read_u32()?;
        let gid = r.read_u32()?;
        let mode = r.read_u32()?;
        let rdev = r.read_u32()?;
        let symlink_target = r.read_string()?;
        let xattrs = decode_xattrs(&mut r)?;
        let content = r.read_bytes()?;
        r.finish()?;
        if content.len() as u64 != size {
            return Err(OstreeError::InvalidTree("file size field doesn't match content".into()));
        }
        if !symlink_target.is_empty() && !content.is_empty() {
            return Err(OstreeError::InvalidTree("symlink carries non-empty content".into()));
        }
        Ok(Self { uid, gid, mode, rdev, symlink_target, xattrs, content })
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::of(&self.encode())
    }
}

/// One entry in a dirtree's file list: `(name, file-checksum)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub checksum: Checksum,
}

/// One entry in a dirtree's subdirectory list: `(name, dirtree-csum,
/// dirmeta-csum)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub tree_checksum: Checksum,
    pub meta_checksum: Checksum,
}

/// Two sorted sequences of files and subdirectories (spec §3, §6).
/// Lexicographic ordering within each sequence is required for byte-identical
/// encoding across implementations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirTree {
    pub files: Vec<FileEntry>,
    pub dirs: Vec<DirEntry>,
}

impl DirTree {
    /// Builds a `DirTree` from unsorted entries, sorting them and rejecting
    /// duplicate names within a single directory (spec §4.2: "Duplicate names
    /// within the same directory fail `InvalidTree`").
    pub fn from_entries(
        mut files: Vec<FileEntry>,
        mut dirs: Vec<DirEntry>,
    ) -> Result<Self, OstreeError> {
        files.sort_by(|a, b| a.name.cmp(&b.name));
        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        let mut all_names: Vec<&str> =
            files.iter().map(|f| f.name.as_str()).chain(dirs.iter().map(|d| d.name.as_str())).collect();
        all_names.sort_unstable();
        if all_names.windows(2).any(|w| w[0] == w[1]) {
            return Err(OstreeError::InvalidTree(format!(
                "duplicate name in directory entries: {:?}",
                all_names
            )));
        }
        Ok(Self { files, dirs })
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_seq(&self.files, |w, f| {
            w.write_string(&f.name);
            w.write_checksum(&f.checksum);
        });
        w.write_seq(&self.dirs, |w, d| {
            w.write_string(&d.name);
            w.write_checksum(&d.tree_checksum);
            w.write_checksum(&d.meta_checksum);
        });
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OstreeError> {
        let mut r = Reader::new(bytes);
        let files = r.read_seq(|r| {
            Ok(FileEntry { name: r.read_string()?, checksum: r.read_checksum()? })
        })?;
        let dirs = r.read_seq(|r| {
            Ok(DirEntry {
                name: r.read_string()?,
                tree_checksum: r.read_checksum()?,
                meta_checksum: r.read_checksum()?,
            })
        })?;
        r.finish()?;
        if !files.windows(2).all(|w| w[0].name < w[1].name) {
            return Err(OstreeError::InvalidTree("dirtree files not sorted".into()));
        }
        if !dirs.windows(2).all(|w| w[0].name < w[1].name) {
            return Err(OstreeError::InvalidTree("dirtree dirs not sorted".into()));
        }
        Ok(Self { files, dirs })
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::of(&self.encode())
    }
}
