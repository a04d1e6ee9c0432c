//! The canonical, deterministic byte encoding object checksums are computed
//! over (spec §6). Every object kind is a little-endian length-prefixed
//! tuple; the single exception is the commit timestamp, which spec §3/§6
//! mandate is stored big-endian.
//!
//! This is intentionally a small hand-rolled codec rather than a generic
//! serialization framework: the wire format is dictated byte-for-byte by the
//! spec, and the four object kinds that use it are enumerated in
//! [`crate::object_store`].

use crate::checksum::Checksum;
use crate::error::OstreeError;

/// Appends canonically-encoded values to an in-memory buffer.
#[derive(Default)]
pub struct Writer(Vec<u8>);

impl Writer {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn write_u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64_be(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    /// Length-prefixed (u32 LE) raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.0.extend_from_slice(bytes);
    }

    /// Length-prefixed (u32 LE) UTF-8 string.
    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Fixed-size bytes with no length prefix (used for 32-byte checksums).
    pub fn write_fixed(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    pub fn write_checksum(&mut self, csum: &Checksum) {
        self.write_fixed(csum.as_bytes());
    }

    /// `bytes[0-or-32]`: writes a length byte (0 or 32) followed by that many
    /// bytes, used for the commit parent field which may be absent.
    pub fn write_optional_checksum(&mut self, csum: Option<&Checksum>) {
        match csum {
            Some(c) => {
                self.0.push(32);
                self.write_fixed(c.as_bytes());
            }
            None => self.0.push(0),
        }
    }

    /// Length-prefixed sequence, calling `write_elem` once per item.
    pub fn write_seq<T>(&mut self, items: &[T], mut write_elem: impl FnMut(&mut Self, &T)) {
        self.write_u32(items.len() as u32);
        for item in items {
            write_elem(self, item);
        }
    }
}

/// Reads canonically-encoded values back out of a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], OstreeError> {
        if self.pos + len > self.buf.len() {
            return Err(OstreeError::InvalidTree("truncated canonical encoding".into()));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32, OstreeError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64, OstreeError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_u64_be(&mut self) -> Result<u64, OstreeError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, OstreeError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String, OstreeError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| OstreeError::InvalidTree(e.to_string()))
    }

    pub fn read_fixed(&mut self, len: usize) -> Result<Vec<u8>, OstreeError> {
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_checksum(&mut self) -> Result<Checksum, OstreeError> {
        let bytes = self.take(32)?;
        let arr: [u8; 32] = bytes.try_into().unwrap();
        Ok(Checksum::from_bytes(arr))
    }

    pub fn read_optional_checksum(&mut self) -> Result<Option<Checksum>, OstreeError> {
        let len = self.take(1)?[0];
        match len {
            0 => Ok(None),
            32 => Ok(Some(self.read_checksum()?)),
            other => {
                Err(OstreeError::InvalidTree(format!("bad optional checksum length {other}")))
            }
        }
    }

    pub fn read_seq<T>(
        &mut self,
        mut read_elem: impl FnMut(&mut Self) -> Result<T, OstreeError>,
    ) -> Result<Vec<T>, OstreeError> {
        let len = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            out.push(read_elem(self)?);
        }
        Ok(out)
    }

    pub fn finish(self) -> Result<(), OstreeError> {
        if self.pos != self.buf.len() {
            return Err(OstreeError::InvalidTree("trailing bytes in canonical encoding".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars_and_seqs() {
        let mut w = Writer::new();
        w.write_u32(42);
        w.write_u64_be(0x0102030405060708);
        w.write_string("hello");
        w.write_seq(&[1u32, 2, 3], |w, v| w.write_u32(*v));
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), 42);
        assert_eq!(r.read_u64_be().unwrap(), 0x0102030405060708);
        assert_eq!(r.read_string().unwrap(), "hello");
        assert_eq!(r.read_seq(|r| r.read_u32()).unwrap(), vec![1, 2, 3]);
        r.finish().unwrap();
    }

    #[test]
    fn optional_checksum_round_trips_both_states() {
        let csum = Checksum::of(b"parent");
        let mut w = Writer::new();
        w.write_optional_checksum(Some(&csum));
        w.write_optional_checksum(None);
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_optional_checksum().unwrap(), Some(csum));
        assert_eq!(r.read_optional_checksum().unwrap(), None);
    }
}
