//! `summary --update` (spec §3, §4.5): rebuilds `<repo>/summary` from the
//! repository's current heads and on-disk static deltas, optionally signed.
//!
//! The signing story here is ed25519 throughout (`ostree_core::signing`
//! documents why no GPG dependency is in this workspace's stack), so a
//! `--sign-key` points at the same hex-encoded-seed file format `pull`'s
//! `--key-path` trusted-keys list uses, just holding a signing key instead
//! of a verifying one.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use ed25519_dalek::SigningKey;
use ostree_core::delta;
use ostree_core::error::IoResultExt as _;
use ostree_core::error::OstreeError;
use ostree_core::error::OstreeResult;
use ostree_core::object_store::ObjectKind;
use ostree_core::refs::RefCategory;
use ostree_core::repo::Repository;
use ostree_core::signing::Ed25519Verifier;
use ostree_core::summary::Summary;
use ostree_core::summary::SummaryDeltaEntry;
use ostree_core::summary::SummaryRefEntry;

use super::context;

#[derive(Debug, Args)]
pub struct SummaryArgs {
    #[arg(long)]
    update: bool,
    #[arg(long)]
    sign_key: Option<PathBuf>,
}

fn load_signing_key(path: &std::path::Path) -> OstreeResult<SigningKey> {
    let text = fs::read_to_string(path).path_context(path)?;
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).ok_or_else(|| {
        OstreeError::Config(format!("{} contains no signing key", path.display()))
    })?;
    let bytes = hex::decode(line).map_err(|_| OstreeError::Config("malformed signing key hex".into()))?;
    let seed: [u8; 32] =
        bytes.try_into().map_err(|_| OstreeError::Config("signing key must be 32 bytes".into()))?;
    Ok(SigningKey::from_bytes(&seed))
}

fn collect_deltas(repo: &Repository) -> OstreeResult<Vec<SummaryDeltaEntry>> {
    let deltas_dir = repo.deltas_dir();
    if !deltas_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(&deltas_dir).path_context(&deltas_dir)? {
        let entry = entry.path_context(&deltas_dir)?;
        let superblock_path = entry.path().join("superblock");
        if !superblock_path.is_file() {
            continue;
        }
        let bytes = fs::read(&superblock_path).path_context(&superblock_path)?;
        let superblock = delta::decode_superblock(&bytes)?;
        out.push(SummaryDeltaEntry {
            from: superblock.from,
            to: superblock.to,
            superblock_size: superblock.declared_total_size(),
        });
    }
    Ok(out)
}

pub fn run(repo_path: Option<PathBuf>, args: SummaryArgs) -> OstreeResult<()> {
    if !args.update {
        return Err(OstreeError::Config("summary: pass --update".into()));
    }
    let repo = context::open_repo(repo_path.as_deref())?;

    let mut refs = Vec::new();
    for (name, checksum) in repo.refs().list(&RefCategory::Heads, "")? {
        let commit_size = repo.store().object_disk_size(ObjectKind::Commit, &checksum)?;
        refs.push(SummaryRefEntry { name, checksum, commit_size });
    }

    let mut summary = Summary::new();
    summary.refs = refs;
    summary.deltas = collect_deltas(&repo)?;

    if let Some(key_path) = &args.sign_key {
        let key = load_signing_key(key_path)?;
        summary.signatures.push(Ed25519Verifier::sign(&key, &summary.signable_bytes()));
    }

    let path = repo.root().join("summary");
    fs::write(&path, summary.encode()).path_context(&path)?;
    println!("wrote summary: {} refs, {} deltas", summary.refs.len(), summary.deltas.len());
    Ok(())
}
