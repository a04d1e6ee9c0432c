//! The `commit` object (spec §3, §6): metadata dictionary, parent pointer,
//! root tree, subject/body, timestamp, and optional ref-binding metadata.

use std::collections::BTreeMap;

use crate::canonical::Reader;
use crate::canonical::Writer;
use crate::checksum::Checksum;
use crate::error::OstreeError;

/// The metadata dictionary's value type. ostree metadata is GVariant, which
/// is open-ended; we support the handful of scalar shapes real commits
/// carry (`ostree.bootable` = bool, `ostree.linux` = string, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetadataValue {
    Bool(bool),
    I64(i64),
    Str(String),
    StrArray(Vec<String>),
    Bytes(Vec<u8>),
}

impl MetadataValue {
    fn tag(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::I64(_) => 1,
            Self::Str(_) => 2,
            Self::StrArray(_) => 3,
            Self::Bytes(_) => 4,
        }
    }

    fn encode(&self, w: &mut Writer) {
        w.write_fixed(&[self.tag()]);
        match self {
            Self::Bool(b) => w.write_fixed(&[u8::from(*b)]),
            Self::I64(v) => w.write_u64(*v as u64),
            Self::Str(s) => w.write_string(s),
            Self::StrArray(items) => w.write_seq(items, |w, s| w.write_string(s)),
            Self::Bytes(b) => w.write_bytes(b),
        }
    }

    fn decode(r: &mut Reader) -> Result<Self, OstreeError> {
        let tag = r.read_fixed(1)?[0];
        Ok(match tag {
            0 => Self::Bool(r.read_fixed(1)?[0] != 0),
            1 => Self::I64(r.read_u64()? as i64),
            2 => Self::Str(r.read_string()?),
            3 => Self::StrArray(r.read_seq(|r| r.read_string())?),
            4 => Self::Bytes(r.read_bytes()?),
            other => return Err(OstreeError::InvalidTree(format!("unknown metadata tag {other}"))),
        })
    }
}

/// A detached signature blob (GPG or ed25519), opaque to the commit codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    pub scheme: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata(pub BTreeMap<String, MetadataValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn is_bootable(&self) -> bool {
        matches!(self.get("ostree.bootable"), Some(MetadataValue::Bool(true)))
    }
}

/// The `commit` object (spec §3). `ref_bindings` is the sorted list of refs
/// this commit is intended to be written to (spec §4.2, §4.5 step 5); empty
/// means unbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub metadata: Metadata,
    pub parent: Option<Checksum>,
    pub subject: String,
    pub body: String,
    pub timestamp: u64,
    pub root_tree: Checksum,
    pub root_meta: Checksum,
    pub ref_bindings: Vec<String>,
    pub collection_binding: Option<String>,
    pub signatures: Vec<DetachedSignature>,
}

impl Commit {
    /// Encodes everything except detached signatures: signatures are
    /// produced and verified over this payload (spec §4.5 step 5), so they
    /// cannot be part of their own hash input.
    fn encode_signable(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_seq(&self.metadata.0.iter().collect::<Vec<_>>(), |w, (k, v)| {
            w.write_string(k);
            v.encode(w);
        });
        w.write_optional_checksum(self.parent.as_ref());
        w.write_string(&self.subject);
        w.write_string(&self.body);
        w.write_u64_be(self.timestamp);
        w.write_checksum(&self.root_tree);
        w.write_checksum(&self.root_meta);
        w.write_seq(&self.ref_bindings, |w, r| w.write_string(r));
        match &self.collection_binding {
            Some(c) => {
                w.write_fixed(&[1]);
                w.write_string(c);
            }
            None => w.write_fixed(&[0]),
        }
        w.into_bytes()
    }

    /// The full on-disk encoding, including detached signatures appended
    /// after the signable payload. The object checksum (spec invariant: "An
    /// object's file name equals hex(sha256(canonical_encoding(object)))")
    /// is computed over this full encoding, matching spec's `commit` row in
    /// §3's object kind table ("optional detached signatures" is part of
    /// the object's identity-bearing content, same as every other field).
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.encode_signable();
        let mut w = Writer::new();
        w.write_seq(&self.signatures, |w, s| {
            w.write_string(&s.scheme);
            w.write_bytes(&s.data);
        });
        bytes.extend(w.into_bytes());
        bytes
    }

    /// The payload signatures are computed and verified over.
    pub fn signable_bytes(&self) -> Vec<u8> {
        self.encode_signable()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OstreeError> {
        let mut r = Reader::new(bytes);
        let metadata_entries = r.read_seq(|r| Ok((r.read_string()?, MetadataValue::decode(r)?)))?;
        let parent = r.read_optional_checksum()?;
        let subject = r.read_string()?;
        let body = r.read_string()?;
        let timestamp = r.read_u64_be()?;
        let root_tree = r.read_checksum()?;
        let root_meta = r.read_checksum()?;
        let ref_bindings = r.read_seq(|r| r.read_string())?;
        let has_collection = r.read_fixed(1)?[0];
        let collection_binding = if has_collection == 1 { Some(r.read_string()?) } else { None };
        let signatures = r.read_seq(|r| {
            Ok(DetachedSignature { scheme: r.read_string()?, data: r.read_bytes()? })
        })?;
        r.finish()?;
        Ok(Self {
            metadata: Metadata(metadata_entries.into_iter().collect()),
            parent,
            subject,
            body,
            timestamp,
            root_tree,
            root_meta,
            ref_bindings,
            collection_binding,
            signatures,
        })
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::of(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Commit {
        let mut metadata = Metadata::new();
        metadata.insert("ostree.bootable", MetadataValue::Bool(true));
        metadata.insert("ostree.linux", MetadataValue::Str("6.1.0".into()));
        Commit {
            metadata,
            parent: None,
            subject: "initial import".into(),
            body: String::new(),
            timestamp: 1_700_000_000,
            root_tree: Checksum::of(b"tree"),
            root_meta: Checksum::of(b"meta"),
            ref_bindings: vec!["main".into()],
            collection_binding: Some("org.example.Os".into()),
            signatures: vec![],
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let commit = sample();
        let decoded = Commit::decode(&commit.encode()).unwrap();
        assert_eq!(commit, decoded);
    }

    #[test]
    fn signatures_do_not_change_signable_bytes() {
        let mut commit = sample();
        let signable_before = commit.signable_bytes();
        commit.signatures.push(DetachedSignature { scheme: "ed25519".into(), data: vec![1, 2, 3] });
        assert_eq!(signable_before, commit.signable_bytes());
        assert_ne!(commit.encode(), Commit { signatures: vec![], ..commit.clone() }.encode());
    }

    #[test]
    fn parent_absent_round_trips() {
        let commit = sample();
        assert!(commit.parent.is_none());
        let decoded = Commit::decode(&commit.encode()).unwrap();
        assert!(decoded.parent.is_none());
    }
}
