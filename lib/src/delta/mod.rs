//! Static-delta codec (spec §4.6): a superblock plus one or more parts, each
//! a sequence of opcodes over a reconstruction machine with three buffers
//! (source, payload, scratch).
//!
//! Generation uses a simplified greedy common-prefix/common-suffix matcher
//! in place of a true bsdiff (no bsdiff crate exists among this workspace's
//! dependencies); see `DESIGN.md`. The opcode set and interpreter are
//! otherwise structurally complete against the spec.

mod codec;
mod generate;
mod interp;

use thiserror::Error;

use crate::checksum::Checksum;
use crate::object_store::ObjectKind;

pub use codec::decode_superblock;
pub use codec::encode_superblock;
pub use generate::DeltaOptions;
pub use generate::generate_delta;
pub use interp::apply_delta;

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("unsupported endianness flag {0:#x}")]
    UnsupportedEndianness(u8),
    #[error("malformed superblock: {0}")]
    MalformedSuperblock(String),
    #[error("part checksum mismatch: expected {expected}, got {observed}")]
    PartChecksumMismatch { expected: Checksum, observed: Checksum },
    #[error("opcode references out-of-range offset: {0}")]
    OffsetOutOfRange(String),
    #[error("close with no open object in progress")]
    CloseWithoutOpen,
}

/// An object too large or dissimilar to include in a delta's parts; fetched
/// by the pull engine through its ordinary object URL (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackEntry {
    pub kind: ObjectKind,
    pub checksum: Checksum,
    pub size: u64,
}

/// One reconstruction instruction (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opcode {
    /// Loads a source object's content into the `source` buffer.
    Open(Checksum),
    /// Appends `source[src_offset..src_offset+len]` to `scratch`.
    Copy { src_offset: usize, len: usize },
    /// Appends `payload[payload_offset..payload_offset+len]` to `scratch`.
    Write { payload_offset: usize, len: usize },
    /// Sets the file metadata fields of the object under construction.
    SetMode { mode: u32, uid: u32, gid: u32 },
    /// Finalizes `scratch` into a `file` object, asserting its checksum.
    Close(Checksum),
    /// Reconstructs `len` bytes by adding `payload[payload_offset..]` to
    /// `source[src_offset..src_offset+src_len]` element-wise (bsdiff's
    /// "add" control operation), zero-extending the source if it's shorter.
    BsDiff { payload_offset: usize, len: usize, src_offset: usize, src_len: usize },
}

/// A part: opcodes plus the raw bytes `Write`/`BsDiff` opcodes index into.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Part {
    pub opcodes: Vec<Opcode>,
    pub payload: Vec<u8>,
}

/// Whether a part's bytes live inside the superblock or in a sibling
/// `part-<k>` file (spec §4.6: "Deltas MAY be 'inline' ... or 'external'").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartLocation {
    Inline(Part),
    External { declared_size: u64 },
}

/// Delta metadata (spec §4.6): from/to commits, timestamp, declared
/// endianness, and the fallback object list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub from: Option<Checksum>,
    pub to: Checksum,
    pub timestamp: u64,
    pub big_endian: bool,
    pub fallback: Vec<FallbackEntry>,
    pub parts: Vec<PartLocation>,
}

impl Superblock {
    /// The sum of every part's declared size, used by the pull planner's
    /// delta-vs-per-object comparison (spec §4.5 step 2).
    pub fn declared_total_size(&self) -> u64 {
        self.parts
            .iter()
            .map(|p| match p {
                PartLocation::Inline(part) => part.payload.len() as u64,
                PartLocation::External { declared_size } => *declared_size,
            })
            .sum::<u64>()
            + self.fallback.iter().map(|f| f.size).sum::<u64>()
    }
}

pub use codec::decode_part;
pub use codec::encode_part;
