//! SHA-256 checksums (spec §3): 32 raw bytes, canonically represented as
//! 64-character lowercase hex.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use sha2::Digest as _;
use sha2::Sha256;

use crate::error::OstreeError;

/// A 32-byte SHA-256 checksum, the identity of every object in the store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Checksum([u8; 32]);

impl Checksum {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes the checksum of a byte slice directly (used for the trailing
    /// checksumming of streamed reads, and for ad hoc hashing such as the
    /// bootcsum in §4.8).
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short(&self) -> String {
        self.hex()[..12].to_string()
    }

    pub fn from_hex(s: &str) -> Result<Self, OstreeError> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(OstreeError::InvalidChecksum(s.to_string()));
        }
        let bytes: Vec<u8> =
            hex::decode(s).map_err(|_| OstreeError::InvalidChecksum(s.to_string()))?;
        let arr: [u8; 32] =
            bytes.try_into().map_err(|_| OstreeError::InvalidChecksum(s.to_string()))?;
        Ok(Self(arr))
    }

    /// Splits the hex representation into the two-character bucket directory
    /// and the remainder, per the `objects/<aa>/<rest>` layout policy.
    pub fn bucket_split(&self) -> (String, String) {
        let hex = self.hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Checksum").field(&self.hex()).finish()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl FromStr for Checksum {
    type Err = OstreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// A hasher that can be fed incrementally, used by streaming writers/readers
/// that need the final checksum without buffering the whole object.
#[derive(Default)]
pub struct StreamingHasher(Sha256);

impl StreamingHasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> Checksum {
        Checksum(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let csum = Checksum::of(b"hello\n");
        let hex = csum.hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Checksum::from_hex(&hex).unwrap(), csum);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(Checksum::from_hex("not-hex").is_err());
        assert!(Checksum::from_hex(&"a".repeat(63)).is_err());
        assert!(Checksum::from_hex(&"g".repeat(64)).is_err());
    }

    #[test]
    fn bucket_split_is_first_two_chars() {
        let csum = Checksum::of(b"x");
        let (bucket, rest) = csum.bucket_split();
        assert_eq!(bucket.len(), 2);
        assert_eq!(rest.len(), 62);
        assert_eq!(format!("{bucket}{rest}"), csum.hex());
    }
}
