//! Explicit-endianness wire encoding for superblocks and parts (spec §4.6:
//! "Byte ordering is declared in the superblock; implementations MUST
//! byteswap on mismatch").

use crate::checksum::Checksum;
use crate::delta::DeltaError;
use crate::delta::FallbackEntry;
use crate::delta::Opcode;
use crate::delta::Part;
use crate::delta::PartLocation;
use crate::delta::Superblock;
use crate::object_store::ObjectKind;

struct EndianWriter {
    buf: Vec<u8>,
    big: bool,
}

impl EndianWriter {
    fn new(big: bool) -> Self {
        Self { buf: Vec::new(), big }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        if self.big { self.buf.extend_from_slice(&v.to_be_bytes()) } else { self.buf.extend_from_slice(&v.to_le_bytes()) }
    }

    fn u64(&mut self, v: u64) {
        if self.big { self.buf.extend_from_slice(&v.to_be_bytes()) } else { self.buf.extend_from_slice(&v.to_le_bytes()) }
    }

    fn bytes(&mut self, data: &[u8]) {
        self.u32(data.len() as u32);
        self.buf.extend_from_slice(data);
    }

    fn checksum(&mut self, csum: &Checksum) {
        self.buf.extend_from_slice(csum.as_bytes());
    }

    fn optional_checksum(&mut self, csum: Option<&Checksum>) {
        match csum {
            Some(c) => {
                self.u8(1);
                self.checksum(c);
            }
            None => self.u8(0),
        }
    }

    fn seq<T>(&mut self, items: &[T], mut write_elem: impl FnMut(&mut Self, &T)) {
        self.u32(items.len() as u32);
        for item in items {
            write_elem(self, item);
        }
    }
}

struct EndianReader<'a> {
    buf: &'a [u8],
    pos: usize,
    big: bool,
}

impl<'a> EndianReader<'a> {
    fn new(buf: &'a [u8], big: bool) -> Self {
        Self { buf, pos: 0, big }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DeltaError> {
        if self.pos + len > self.buf.len() {
            return Err(DeltaError::MalformedSuperblock("truncated delta encoding".into()));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DeltaError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DeltaError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(if self.big { u32::from_be_bytes(bytes) } else { u32::from_le_bytes(bytes) })
    }

    fn u64(&mut self) -> Result<u64, DeltaError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(if self.big { u64::from_be_bytes(bytes) } else { u64::from_le_bytes(bytes) })
    }

    fn bytes(&mut self) -> Result<Vec<u8>, DeltaError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn checksum(&mut self) -> Result<Checksum, DeltaError> {
        let bytes = self.take(32)?;
        Ok(Checksum::from_bytes(bytes.try_into().unwrap()))
    }

    fn optional_checksum(&mut self) -> Result<Option<Checksum>, DeltaError> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.checksum()?)),
            other => Err(DeltaError::MalformedSuperblock(format!("bad optional-checksum tag {other}"))),
        }
    }

    fn seq<T>(&mut self, mut read_elem: impl FnMut(&mut Self) -> Result<T, DeltaError>) -> Result<Vec<T>, DeltaError> {
        let len = self.u32()? as usize;
        let mut out = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            out.push(read_elem(self)?);
        }
        Ok(out)
    }

    fn finish(self) -> Result<(), DeltaError> {
        if self.pos != self.buf.len() {
            return Err(DeltaError::MalformedSuperblock("trailing bytes in delta encoding".into()));
        }
        Ok(())
    }
}

fn object_kind_tag(kind: ObjectKind) -> u8 {
    match kind {
        ObjectKind::File => 0,
        ObjectKind::DirTree => 1,
        ObjectKind::DirMeta => 2,
        ObjectKind::Commit => 3,
    }
}

fn object_kind_from_tag(tag: u8) -> Result<ObjectKind, DeltaError> {
    match tag {
        0 => Ok(ObjectKind::File),
        1 => Ok(ObjectKind::DirTree),
        2 => Ok(ObjectKind::DirMeta),
        3 => Ok(ObjectKind::Commit),
        other => Err(DeltaError::MalformedSuperblock(format!("unknown object kind tag {other}"))),
    }
}

const OPCODE_OPEN: u8 = 0;
const OPCODE_COPY: u8 = 1;
const OPCODE_WRITE: u8 = 2;
const OPCODE_SET_MODE: u8 = 3;
const OPCODE_CLOSE: u8 = 4;
const OPCODE_BSDIFF: u8 = 5;

fn write_opcode(w: &mut EndianWriter, op: &Opcode) {
    match op {
        Opcode::Open(csum) => {
            w.u8(OPCODE_OPEN);
            w.checksum(csum);
        }
        Opcode::Copy { src_offset, len } => {
            w.u8(OPCODE_COPY);
            w.u64(*src_offset as u64);
            w.u64(*len as u64);
        }
        Opcode::Write { payload_offset, len } => {
            w.u8(OPCODE_WRITE);
            w.u64(*payload_offset as u64);
            w.u64(*len as u64);
        }
        Opcode::SetMode { mode, uid, gid } => {
            w.u8(OPCODE_SET_MODE);
            w.u32(*mode);
            w.u32(*uid);
            w.u32(*gid);
        }
        Opcode::Close(csum) => {
            w.u8(OPCODE_CLOSE);
            w.checksum(csum);
        }
        Opcode::BsDiff { payload_offset, len, src_offset, src_len } => {
            w.u8(OPCODE_BSDIFF);
            w.u64(*payload_offset as u64);
            w.u64(*len as u64);
            w.u64(*src_offset as u64);
            w.u64(*src_len as u64);
        }
    }
}

fn read_opcode(r: &mut EndianReader) -> Result<Opcode, DeltaError> {
    Ok(match r.u8()? {
        OPCODE_OPEN => Opcode::Open(r.checksum()?),
        OPCODE_COPY => Opcode::Copy { src_offset: r.u64()? as usize, len: r.u64()? as usize },
        OPCODE_WRITE => Opcode::Write { payload_offset: r.u64()? as usize, len: r.u64()? as usize },
        OPCODE_SET_MODE => Opcode::SetMode { mode: r.u32()?, uid: r.u32()?, gid: r.u32()? },
        OPCODE_CLOSE => Opcode::Close(r.checksum()?),
        OPCODE_BSDIFF => Opcode::BsDiff {
            payload_offset: r.u64()? as usize,
            len: r.u64()? as usize,
            src_offset: r.u64()? as usize,
            src_len: r.u64()? as usize,
        },
        other => return Err(DeltaError::MalformedSuperblock(format!("unknown opcode tag {other}"))),
    })
}

pub fn encode_part(part: &Part, big_endian: bool) -> Vec<u8> {
    let mut w = EndianWriter::new(big_endian);
    w.seq(&part.opcodes, |w, op| write_opcode(w, op));
    w.bytes(&part.payload);
    w.buf
}

pub fn decode_part(bytes: &[u8], big_endian: bool) -> Result<Part, DeltaError> {
    let mut r = EndianReader::new(bytes, big_endian);
    let opcodes = r.seq(read_opcode)?;
    let payload = r.bytes()?;
    r.finish()?;
    Ok(Part { opcodes, payload })
}

pub fn encode_superblock(sb: &Superblock) -> Vec<u8> {
    let mut w = EndianWriter::new(sb.big_endian);
    w.u8(u8::from(sb.big_endian));
    w.optional_checksum(sb.from.as_ref());
    w.checksum(&sb.to);
    w.u64(sb.timestamp);
    w.seq(&sb.fallback, |w, f| {
        w.u8(object_kind_tag(f.kind));
        w.checksum(&f.checksum);
        w.u64(f.size);
    });
    w.u32(sb.parts.len() as u32);
    for part in &sb.parts {
        match part {
            PartLocation::Inline(p) => {
                w.u8(0);
                let encoded = encode_part(p, sb.big_endian);
                w.bytes(&encoded);
            }
            PartLocation::External { declared_size } => {
                w.u8(1);
                w.u64(*declared_size);
            }
        }
    }
    w.buf
}

pub fn decode_superblock(bytes: &[u8]) -> Result<Superblock, DeltaError> {
    if bytes.is_empty() {
        return Err(DeltaError::MalformedSuperblock("empty superblock".into()));
    }
    let flag = bytes[0];
    let big_endian = match flag {
        0 => false,
        1 => true,
        other => return Err(DeltaError::UnsupportedEndianness(other)),
    };
    let mut r = EndianReader::new(&bytes[1..], big_endian);
    let from = r.optional_checksum()?;
    let to = r.checksum()?;
    let timestamp = r.u64()?;
    let fallback = r.seq(|r| {
        Ok(FallbackEntry { kind: object_kind_from_tag(r.u8()?)?, checksum: r.checksum()?, size: r.u64()? })
    })?;
    let part_count = r.u32()? as usize;
    let mut parts = Vec::with_capacity(part_count.min(1 << 16));
    for _ in 0..part_count {
        match r.u8()? {
            0 => {
                let encoded = r.bytes()?;
                parts.push(PartLocation::Inline(decode_part(&encoded, big_endian)?));
            }
            1 => parts.push(PartLocation::External { declared_size: r.u64()? }),
            other => return Err(DeltaError::MalformedSuperblock(format!("unknown part location tag {other}"))),
        }
    }
    r.finish()?;
    Ok(Superblock { from, to, timestamp, big_endian, fallback, parts })
}
