//! The `<repo>/summary` document (spec §3, §4.5): a signed index of refs
//! and available static deltas, so a pull can resolve refs without
//! fetching each ref file individually.

use crate::canonical::Reader;
use crate::canonical::Writer;
use crate::checksum::Checksum;
use crate::commit::DetachedSignature;
use crate::error::OstreeError;
use crate::error::OstreeResult;

/// One ref entry: name plus the commit checksum and its size in bytes (used
/// by the pull planner's delta-vs-per-object size comparison, spec §4.5
/// step 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRefEntry {
    pub name: String,
    pub checksum: Checksum,
    pub commit_size: u64,
}

/// One advertised static delta: `<from>-<to>` (from empty when `from` is
/// `None`) and its superblock's declared total size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryDeltaEntry {
    pub from: Option<Checksum>,
    pub to: Checksum,
    pub superblock_size: u64,
}

/// Unsigned summary content plus detached signatures (spec §3: "The summary
/// is a signed document").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub refs: Vec<SummaryRefEntry>,
    pub deltas: Vec<SummaryDeltaEntry>,
    pub signatures: Vec<DetachedSignature>,
}

impl Summary {
    pub fn new() -> Self {
        Self { refs: Vec::new(), deltas: Vec::new(), signatures: Vec::new() }
    }

    /// Looks up a ref's advertised commit checksum, failing if the summary
    /// carries no entry for it.
    pub fn resolve(&self, ref_name: &str) -> OstreeResult<Checksum> {
        self.refs
            .iter()
            .find(|r| r.name == ref_name)
            .map(|r| r.checksum)
            .ok_or_else(|| OstreeError::RefNotFound(ref_name.to_string()))
    }

    /// Finds the smallest-superblock delta ending at `to`, optionally
    /// starting from `from` (spec §4.5 step 2: prefer a delta whose
    /// declared size beats the per-object closure, ties favouring the
    /// delta).
    pub fn best_delta_to(&self, from: Option<&Checksum>, to: &Checksum) -> Option<&SummaryDeltaEntry> {
        self.deltas
            .iter()
            .filter(|d| &d.to == to && d.from.as_ref() == from)
            .min_by_key(|d| d.superblock_size)
    }

    fn encode_unsigned(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_seq(&self.refs, |w, r| {
            w.write_string(&r.name);
            w.write_checksum(&r.checksum);
            w.write_u64(r.commit_size);
        });
        w.write_seq(&self.deltas, |w, d| {
            w.write_optional_checksum(d.from.as_ref());
            w.write_checksum(&d.to);
            w.write_u64(d.superblock_size);
        });
        w.into_bytes()
    }

    pub fn signable_bytes(&self) -> Vec<u8> {
        self.encode_unsigned()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.encode_unsigned();
        let mut w = Writer::new();
        w.write_seq(&self.signatures, |w, s| {
            w.write_string(&s.scheme);
            w.write_bytes(&s.data);
        });
        bytes.extend(w.into_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> OstreeResult<Self> {
        let mut r = Reader::new(bytes);
        let refs = r.read_seq(|r| {
            Ok(SummaryRefEntry { name: r.read_string()?, checksum: r.read_checksum()?, commit_size: r.read_u64()? })
        })?;
        let deltas = r.read_seq(|r| {
            Ok(SummaryDeltaEntry {
                from: r.read_optional_checksum()?,
                to: r.read_checksum()?,
                superblock_size: r.read_u64()?,
            })
        })?;
        let signatures = r.read_seq(|r| Ok(DetachedSignature { scheme: r.read_string()?, data: r.read_bytes()? }))?;
        r.finish()?;
        Ok(Self { refs, deltas, signatures })
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let mut summary = Summary::new();
        summary.refs.push(SummaryRefEntry { name: "main".into(), checksum: Checksum::of(b"c"), commit_size: 128 });
        summary.deltas.push(SummaryDeltaEntry { from: None, to: Checksum::of(b"c"), superblock_size: 64 });
        let decoded = Summary::decode(&summary.encode()).unwrap();
        assert_eq!(summary, decoded);
    }

    #[test]
    fn resolve_finds_ref_by_name() {
        let mut summary = Summary::new();
        summary.refs.push(SummaryRefEntry { name: "main".into(), checksum: Checksum::of(b"c"), commit_size: 1 });
        assert_eq!(summary.resolve("main").unwrap(), Checksum::of(b"c"));
        assert!(summary.resolve("other").is_err());
    }

    #[test]
    fn best_delta_prefers_smallest_superblock() {
        let mut summary = Summary::new();
        let to = Checksum::of(b"to");
        summary.deltas.push(SummaryDeltaEntry { from: None, to, superblock_size: 500 });
        summary.deltas.push(SummaryDeltaEntry { from: None, to, superblock_size: 100 });
        let best = summary.best_delta_to(None, &to).unwrap();
        assert_eq!(best.superblock_size, 100);
    }
}
