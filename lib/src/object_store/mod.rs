//! Object store (spec §4.1): create/open/enumerate/read/verify for the four
//! object kinds, bucketed by the first two hex characters of their checksum.

use std::collections::HashSet;
use std::fs;
use std::io::Read as _;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use tempfile::NamedTempFile;
use tracing::debug;
use tracing::trace;

use crate::canonical::Reader;
use crate::canonical::Writer;
use crate::checksum::Checksum;
use crate::checksum::StreamingHasher;
use crate::error::IoResultExt as _;
use crate::error::OstreeError;
use crate::error::OstreeResult;
use crate::file_util;
use crate::transaction::FsyncPolicy;
use crate::tree::FileObject;

mod mode;

pub use mode::RepoMode;

/// Which of the four object kinds (spec §3) a checksum names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    File,
    DirTree,
    DirMeta,
    Commit,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 4] = [Self::File, Self::DirTree, Self::DirMeta, Self::Commit];

    pub fn label(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::DirTree => "dirtree",
            Self::DirMeta => "dirmeta",
            Self::Commit => "commit",
        }
    }

    /// The on-disk/wire file extension for this kind under `mode` (spec §3:
    /// `.filez` for compressed archive-mode files, `.file`/`.dirtree`/
    /// `.dirmeta`/`.commit` otherwise). Used both for local paths and to
    /// build the pull engine's object URLs (spec §6).
    pub fn extension(self, mode: RepoMode) -> &'static str {
        match (self, mode) {
            (Self::File, RepoMode::Archive) => "filez",
            (Self::File, _) => "file",
            (Self::DirTree, _) => "dirtree",
            (Self::DirMeta, _) => "dirmeta",
            (Self::Commit, _) => "commit",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "file" | "filez" => Some(Self::File),
            "dirtree" => Some(Self::DirTree),
            "dirmeta" => Some(Self::DirMeta),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }
}

/// Extended attribute name the `bare-user*` modes encode real ownership
/// into, since the on-disk file is owned by the invoking unprivileged user
/// (spec §4.1: "original uid/gid/mode encoded in a trailing xattr").
const USER_OSTREEMETA_XATTR: &str = "user.ostreemeta";

/// A content-addressed store of `file`/`dirtree`/`dirmeta`/`commit` objects
/// rooted at `<repo>/objects`, with `<repo>/tmp` as its staging area.
pub struct ObjectStore {
    objects_root: PathBuf,
    tmp_root: PathBuf,
    mode: RepoMode,
    fsync: FsyncPolicy,
    negative_cache: Mutex<HashSet<(ObjectKind, Checksum)>>,
}

impl ObjectStore {
    /// Lays out `objects/` and `tmp/` under a fresh repository root, syncing
    /// every write per [`FsyncPolicy::default`]. [`crate::repo::Repository`]
    /// uses [`Self::create_with_fsync`] instead, once it knows the
    /// repository's configured policy.
    pub fn create(repo_root: &Path, mode: RepoMode) -> OstreeResult<Self> {
        Self::create_with_fsync(repo_root, mode, FsyncPolicy::default())
    }

    pub fn create_with_fsync(repo_root: &Path, mode: RepoMode, fsync: FsyncPolicy) -> OstreeResult<Self> {
        let objects_root = repo_root.join("objects");
        let tmp_root = repo_root.join("tmp");
        file_util::create_or_reuse_dir(&objects_root).path_context(&objects_root)?;
        file_util::create_or_reuse_dir(&tmp_root).path_context(&tmp_root)?;
        Ok(Self::open_with_fsync(repo_root, mode, fsync))
    }

    /// Attaches to an existing repository root; `objects/` and `tmp/` are
    /// assumed to already exist (callers open through [`crate::repo::Repository`],
    /// which validates the repo layout first).
    pub fn open(repo_root: &Path, mode: RepoMode) -> Self {
        Self::open_with_fsync(repo_root, mode, FsyncPolicy::default())
    }

    pub fn open_with_fsync(repo_root: &Path, mode: RepoMode, fsync: FsyncPolicy) -> Self {
        Self {
            objects_root: repo_root.join("objects"),
            tmp_root: repo_root.join("tmp"),
            mode,
            fsync,
            negative_cache: Mutex::new(HashSet::new()),
        }
    }

    pub fn mode(&self) -> RepoMode {
        self.mode
    }

    fn bucket_dir(&self, checksum: &Checksum) -> PathBuf {
        let (bucket, _) = checksum.bucket_split();
        self.objects_root.join(bucket)
    }

    fn object_path(&self, kind: ObjectKind, checksum: &Checksum) -> PathBuf {
        let (bucket, rest) = checksum.bucket_split();
        self.objects_root.join(bucket).join(format!("{rest}.{}", kind.extension(self.mode)))
    }

    /// Writes a canonically-encoded object, returning its checksum. A
    /// pre-existing object with the same checksum short-circuits the write
    /// (spec §4.1).
    pub fn put_object(&self, kind: ObjectKind, canonical_bytes: &[u8]) -> OstreeResult<Checksum> {
        self.put_object_with_fsync(kind, canonical_bytes, self.fsync)
    }

    /// Like [`Self::put_object`], but fsyncs the object under `fsync`
    /// instead of the store's own ambient policy. Pull uses this to honor
    /// `PullOptions::per_object_fsync`, which lets one transfer relax (or
    /// force) durability independently of the destination repo's
    /// `core.fsync` (spec §4.5).
    pub fn put_object_with_fsync(&self, kind: ObjectKind, canonical_bytes: &[u8], fsync: FsyncPolicy) -> OstreeResult<Checksum> {
        if kind == ObjectKind::File {
            validate_file_object(self.mode, canonical_bytes)?;
        }

        let checksum = Checksum::of(canonical_bytes);
        if self.has_object(kind, &checksum)? {
            trace!(kind = kind.label(), checksum = %checksum, "object already present");
            return Ok(checksum);
        }

        let bucket_dir = self.bucket_dir(&checksum);
        file_util::create_or_reuse_dir(&bucket_dir).path_context(&bucket_dir)?;

        let mut temp_file = NamedTempFile::new_in(&self.tmp_root).path_context(&self.tmp_root)?;
        let on_disk_bytes = self.encode_for_disk(kind, canonical_bytes)?;
        temp_file.write_all(&on_disk_bytes).path_context(&self.tmp_root)?;

        let target = self.object_path(kind, &checksum);
        file_util::persist_content_addressed_temp_file(temp_file, &target, fsync).path_context(&target)?;

        self.negative_cache.lock().unwrap().remove(&(kind, checksum));
        debug!(kind = kind.label(), checksum = %checksum, "wrote object");
        Ok(checksum)
    }

    fn encode_for_disk(&self, kind: ObjectKind, canonical_bytes: &[u8]) -> OstreeResult<Vec<u8>> {
        if kind == ObjectKind::File && self.mode == RepoMode::Archive {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(canonical_bytes).map_err(|e| OstreeError::io(&self.tmp_root, e))?;
            encoder.finish().map_err(|e| OstreeError::io(&self.tmp_root, e))
        } else {
            Ok(canonical_bytes.to_vec())
        }
    }

    fn decode_from_disk(&self, kind: ObjectKind, on_disk_bytes: Vec<u8>) -> OstreeResult<Vec<u8>> {
        if kind == ObjectKind::File && self.mode == RepoMode::Archive {
            let mut decoder = ZlibDecoder::new(on_disk_bytes.as_slice());
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|e| OstreeError::io(&self.objects_root, e))?;
            Ok(out)
        } else {
            Ok(on_disk_bytes)
        }
    }

    /// Decodes bytes fetched verbatim off the wire (or from another store's
    /// disk layout) into this store's canonical encoding, so the pull
    /// engine can feed them to [`Self::put_object`] (spec §4.5 step 3: the
    /// wire protocol serves exactly what's on disk, e.g. zlib-compressed
    /// `.filez` payloads in `archive` mode).
    pub fn canonical_bytes_from_wire(&self, kind: ObjectKind, wire_bytes: Vec<u8>) -> OstreeResult<Vec<u8>> {
        self.decode_from_disk(kind, wire_bytes)
    }

    /// Reads an object's canonical bytes without checksum verification.
    pub fn open_object(&self, kind: ObjectKind, checksum: &Checksum) -> OstreeResult<Vec<u8>> {
        let path = self.object_path(kind, checksum);
        let on_disk = fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                OstreeError::ObjectNotFound { kind: kind.label(), checksum: *checksum }
            } else {
                OstreeError::io(&path, source)
            }
        })?;
        self.decode_from_disk(kind, on_disk)
    }

    /// Like [`Self::open_object`], but recomputes the hash and fails
    /// `CorruptObject` on mismatch (spec §4.1).
    pub fn open_object_verified(&self, kind: ObjectKind, checksum: &Checksum) -> OstreeResult<Vec<u8>> {
        let bytes = self.open_object(kind, checksum)?;
        let mut hasher = StreamingHasher::new();
        hasher.update(&bytes);
        let observed = hasher.finalize();
        if observed != *checksum {
            return Err(OstreeError::CorruptObject {
                kind: kind.label(),
                checksum: *checksum,
                expected: *checksum,
                observed,
            });
        }
        Ok(bytes)
    }

    pub fn has_object(&self, kind: ObjectKind, checksum: &Checksum) -> OstreeResult<bool> {
        if self.negative_cache.lock().unwrap().contains(&(kind, *checksum)) {
            return Ok(false);
        }
        let present = self.object_path(kind, checksum).exists();
        if !present {
            self.negative_cache.lock().unwrap().insert((kind, *checksum));
        }
        Ok(present)
    }

    /// Walks `objects/<aa>/*`, yielding every `(kind, checksum)` pair found.
    pub fn iter_objects(&self) -> OstreeResult<impl Iterator<Item = OstreeResult<(ObjectKind, Checksum)>> + '_> {
        let top = fs::read_dir(&self.objects_root).path_context(&self.objects_root)?;
        Ok(top.filter_map(Result::ok).filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false)).flat_map(
            move |bucket_entry| {
                let bucket_hex = bucket_entry.file_name().to_string_lossy().into_owned();
                let entries = fs::read_dir(bucket_entry.path()).into_iter().flatten().filter_map(Result::ok);
                entries
                    .map(move |file_entry| parse_object_filename(&bucket_hex, &file_entry.file_name().to_string_lossy()))
                    .collect::<Vec<_>>()
            },
        ))
    }

    /// Copies (or hardlinks, when safe) an object from this store into
    /// `dest` (spec §4.1, used by pull-local).
    pub fn copy_into(&self, dest: &ObjectStore, kind: ObjectKind, checksum: &Checksum) -> OstreeResult<()> {
        if dest.has_object(kind, checksum)? {
            return Ok(());
        }

        let can_hardlink = self.mode == dest.mode && kind != ObjectKind::Commit
            && (kind != ObjectKind::File || !Self::is_symlink_object(self, kind, checksum)?);

        if can_hardlink {
            let dest_bucket = dest.bucket_dir(checksum);
            file_util::create_dir_all_reuse(&dest_bucket).path_context(&dest_bucket)?;
            let src = self.object_path(kind, checksum);
            let dst = dest.object_path(kind, checksum);
            match fs::hard_link(&src, &dst) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(()),
                Err(_) => {}
            }
        }

        let bytes = self.open_object(kind, checksum)?;
        dest.put_object(kind, &bytes)?;
        Ok(())
    }

    /// Size in bytes of an object's on-disk representation (post-compression
    /// in `archive` mode), used by [`crate::prune`] to report reclaimed
    /// space without re-inflating every deleted object.
    pub fn object_disk_size(&self, kind: ObjectKind, checksum: &Checksum) -> OstreeResult<u64> {
        let path = self.object_path(kind, checksum);
        Ok(fs::metadata(&path).path_context(&path)?.len())
    }

    /// Deletes an object's on-disk file, used only by [`crate::prune`]'s
    /// sweep phase. Missing objects are not an error (already swept, or
    /// never existed).
    pub fn remove_object(&self, kind: ObjectKind, checksum: &Checksum) -> OstreeResult<()> {
        let path = self.object_path(kind, checksum);
        match fs::remove_file(&path) {
            Ok(()) => {
                self.negative_cache.lock().unwrap().insert((kind, *checksum));
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OstreeError::io(&path, e)),
        }
    }

    fn is_symlink_object(&self, kind: ObjectKind, checksum: &Checksum) -> OstreeResult<bool> {
        if kind != ObjectKind::File {
            return Ok(false);
        }
        let bytes = self.open_object(kind, checksum)?;
        Ok(FileObject::decode(&bytes)?.is_symlink())
    }
}

fn parse_object_filename(bucket_hex: &str, filename: &str) -> OstreeResult<(ObjectKind, Checksum)> {
    let (rest, ext) = filename.split_once('.').ok_or_else(|| {
        OstreeError::InvalidTree(format!("malformed object filename: {filename}"))
    })?;
    let kind = ObjectKind::from_extension(ext)
        .ok_or_else(|| OstreeError::InvalidTree(format!("unknown object extension: {ext}")))?;
    let checksum = Checksum::from_hex(&format!("{bucket_hex}{rest}"))?;
    Ok((kind, checksum))
}

/// Encodes `(uid, gid, mode)` into the `user.ostreemeta` xattr payload used
/// by `bare-user*` modes.
pub fn encode_ostreemeta_xattr(uid: u32, gid: u32, mode: u32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_u32(uid);
    w.write_u32(gid);
    w.write_u32(mode);
    w.into_bytes()
}

pub fn decode_ostreemeta_xattr(bytes: &[u8]) -> OstreeResult<(u32, u32, u32)> {
    let mut r = Reader::new(bytes);
    let uid = r.read_u32()?;
    let gid = r.read_u32()?;
    let mode = r.read_u32()?;
    r.finish()?;
    Ok((uid, gid, mode))
}

const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;
const S_IFMT: u32 = 0o170000;
const S_IFCHR: u32 = 0o020000;
const S_IFBLK: u32 = 0o060000;
const S_IWGRP: u32 = 0o0020;
const S_IWOTH: u32 = 0o0002;

/// `bare-user-only` refuses suid bits, device nodes, and group/world-writable
/// root-owned files (spec.md:54, spec.md:167: "group-writable world-writable
/// combinations that make sense only as root").
fn validate_file_object(mode: RepoMode, canonical_bytes: &[u8]) -> OstreeResult<()> {
    if mode != RepoMode::BareUserOnly {
        return Ok(());
    }
    let file = FileObject::decode(canonical_bytes)?;
    if file.mode & (S_ISUID | S_ISGID) != 0 {
        return Err(OstreeError::InvalidTree("bare-user-only forbids setuid/setgid bits".into()));
    }
    let file_type = file.mode & S_IFMT;
    if file_type == S_IFCHR || file_type == S_IFBLK {
        return Err(OstreeError::InvalidTree("bare-user-only forbids device nodes".into()));
    }
    if file.uid == 0 && file.mode & (S_IWGRP | S_IWOTH) != 0 {
        return Err(OstreeError::InvalidTree(
            "bare-user-only forbids group/world-writable root-owned files".into(),
        ));
    }
    Ok(())
}
