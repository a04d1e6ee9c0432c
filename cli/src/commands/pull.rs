use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use clap::Args;
use ed25519_dalek::VerifyingKey;
use indicatif::ProgressBar;
use indicatif::ProgressStyle;
use ostree_core::error::OstreeError;
use ostree_core::error::OstreeResult;
use ostree_core::progress::Observer;
use ostree_core::progress::Phase;
use ostree_core::pull::HttpTransport;
use ostree_core::pull::LocalTransport;
use ostree_core::pull::PullOptions;
use ostree_core::pull::RemoteDescriptor;
use ostree_core::pull::Transport;
use ostree_core::pull::pull_ref;
use ostree_core::refs::RefCategory;
use ostree_core::repo::Repository;
use ostree_core::signing::Ed25519Verifier;

use super::context;

#[derive(Debug, Args)]
pub struct PullArgs {
    remote: String,
    refs: Vec<String>,
    #[arg(long)]
    mirror: bool,
    #[arg(long)]
    commit_only: bool,
    #[arg(long = "subdir")]
    subdirs: Vec<String>,
    #[arg(long)]
    depth: Option<u32>,
    #[arg(long)]
    disable_static_deltas: bool,
    #[arg(long)]
    require_static_deltas: bool,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
pub struct PullLocalArgs {
    src_repo: PathBuf,
    refs: Vec<String>,
}

/// A progress bar driven by [`ostree_core::progress::Observer`] callbacks,
/// the seam SPEC_FULL.md §10.2 describes ("`indicatif` drives the CLI's
/// progress bars from the same observer callbacks the library exposes").
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
        Self { bar }
    }
}

impl Observer for CliObserver {
    fn phase_started(&self, phase: Phase) {
        self.bar.set_message(phase.label().to_string());
    }

    fn bytes_transferred(&self, phase: Phase, delta: u64) {
        self.bar.inc(delta);
        self.bar.set_message(format!("{} ({} bytes)", phase.label(), self.bar.position()));
    }

    fn object_completed(&self, _phase: Phase) {
        self.bar.tick();
    }

    fn phase_finished(&self, phase: Phase) {
        self.bar.set_message(format!("{} done", phase.label()));
    }
}

fn load_trusted_keys(path: &Path) -> OstreeResult<Vec<VerifyingKey>> {
    let text = fs::read_to_string(path).map_err(|e| OstreeError::io(path, e))?;
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let bytes = hex::decode(line).map_err(|_| OstreeError::Config(format!("malformed trusted key: {line}")))?;
            let arr: [u8; 32] =
                bytes.try_into().map_err(|_| OstreeError::Config(format!("trusted key wrong length: {line}")))?;
            VerifyingKey::from_bytes(&arr).map_err(|_| OstreeError::Config(format!("invalid ed25519 key: {line}")))
        })
        .collect()
}

fn build_verifier(remote: &RemoteDescriptor, gpg_home: Option<&Path>) -> OstreeResult<Ed25519Verifier> {
    if let Some(key_path) = &remote.key_path {
        return Ok(Ed25519Verifier::new(load_trusted_keys(key_path)?));
    }
    if let Some(gpg_home) = gpg_home {
        let default_keys = gpg_home.join("trusted.keys");
        if default_keys.is_file() {
            return Ok(Ed25519Verifier::new(load_trusted_keys(&default_keys)?));
        }
    }
    Ok(Ed25519Verifier::new(vec![]))
}

fn remote_descriptor(repo: &Repository, name: &str) -> OstreeResult<RemoteDescriptor> {
    let fields: BTreeMap<String, String> = repo.config().remote(name);
    let url = fields
        .get("url")
        .ok_or_else(|| OstreeError::UnconfiguredState(format!("remote {name:?} has no url")))?
        .clone();
    Ok(RemoteDescriptor {
        name: name.to_string(),
        url,
        gpg_verify: fields.get("gpg-verify").map(|v| v == "true").unwrap_or(true),
        collection_id: fields.get("collection-id").cloned(),
        key_path: fields.get("key-path").map(PathBuf::from),
    })
}

fn transport_for(url: &str) -> OstreeResult<Box<dyn Transport>> {
    if let Some(path) = url.strip_prefix("file://") {
        Ok(Box::new(LocalTransport::new(path)))
    } else {
        Ok(Box::new(HttpTransport::new(url.to_string(), vec![], 5)?))
    }
}

pub async fn run(repo_path: Option<PathBuf>, gpg_home: Option<PathBuf>, args: PullArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let remote = remote_descriptor(&repo, &args.remote)?;
    let gpg_home = context::resolve_gpg_home(gpg_home.as_deref());
    let verifier = build_verifier(&remote, gpg_home.as_deref())?;
    let transport = transport_for(&remote.url)?;

    let options = PullOptions {
        mirror: args.mirror,
        commit_only: args.commit_only,
        subdirs: args.subdirs,
        depth: args.depth,
        disable_static_deltas: args.disable_static_deltas,
        require_static_deltas: args.require_static_deltas,
        dry_run: args.dry_run,
        ..PullOptions::default()
    };

    let refs = if args.refs.is_empty() { vec!["main".to_string()] } else { args.refs };
    let observer = CliObserver::new();
    for ref_name in &refs {
        let outcome =
            pull_ref(&repo, &remote, transport.as_ref(), ref_name, &options, &[], &verifier, &observer).await?;
        println!(
            "{}: {} ({} objects, {} bytes)",
            outcome.ref_name, outcome.commit.hex(), outcome.objects_fetched, outcome.bytes_fetched
        );
    }
    Ok(())
}

pub async fn run_local(repo_path: Option<PathBuf>, args: PullLocalArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let transport = LocalTransport::new(&args.src_repo);
    let remote = RemoteDescriptor {
        name: "local".into(),
        url: format!("file://{}", args.src_repo.display()),
        gpg_verify: false,
        collection_id: None,
        key_path: None,
    };
    let verifier = Ed25519Verifier::new(vec![]);
    let refs = if args.refs.is_empty() { vec!["main".to_string()] } else { args.refs };

    for ref_name in &refs {
        let outcome = ostree_core::pull::pull_ref_quiet(
            &repo,
            &remote,
            &transport,
            ref_name,
            &PullOptions::default(),
            &[],
            &verifier,
        )
        .await?;
        let local_category = RefCategory::Remote(remote.name.clone());
        let head = repo.refs().resolve(&local_category, ref_name)?;
        repo.refs().set(&RefCategory::Heads, ref_name, head)?;
        println!("{}: {}", outcome.ref_name, outcome.commit.hex());
    }
    Ok(())
}
