//! Pull driver (spec §4.5): resolve a ref against a remote, plan a static
//! delta or per-object fetch, pull bytes through a bounded-concurrency pool,
//! verify, and land the result under `refs/remotes/<remote>` (or
//! `refs/mirrors/<collection>` for a mirror pull).

mod transport;

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::PathBuf;

use futures::stream;
use futures::StreamExt as _;
use tracing::info_span;

pub use transport::LocalTransport;
pub use transport::Transport;
#[cfg(feature = "http-pull")]
pub use transport::HttpTransport;

use crate::checksum::Checksum;
use crate::commit::Commit;
use crate::delta;
use crate::error::OstreeError;
use crate::error::OstreeResult;
use crate::object_store::ObjectKind;
use crate::object_store::ObjectStore;
use crate::progress::Counters;
use crate::progress::NullObserver;
use crate::progress::Observer;
use crate::progress::Phase;
use crate::refs::RefCategory;
use crate::repo::Repository;
use crate::signing::Verifier;
use crate::summary::Summary;
use crate::tree::DirTree;

/// How many objects or delta parts the fetch pool runs concurrently (spec
/// §4.5 step 3: "a bounded-concurrency pool"). Not itself an option the
/// spec's table exposes, so it's fixed here rather than threaded through.
const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// A remote repository a pull is resolved against (spec §4.3: `[remote
/// "<name>"]` config stanza).
#[derive(Debug, Clone)]
pub struct RemoteDescriptor {
    pub name: String,
    pub url: String,
    pub gpg_verify: bool,
    pub collection_id: Option<String>,
    pub key_path: Option<PathBuf>,
}

/// The full knob set a pull can be tuned with (spec §4.5's options table).
#[derive(Debug, Clone)]
pub struct PullOptions {
    /// Write the result under `refs/mirrors/<collection>` instead of
    /// `refs/remotes/<remote>`.
    pub mirror: bool,
    /// Fetch only the commit object, skipping its tree closure entirely.
    pub commit_only: bool,
    /// Restrict the tree closure fetch to these paths (empty means
    /// everything).
    pub subdirs: Vec<String>,
    /// How many ancestor commits to also fetch, beyond the ref's tip.
    pub depth: Option<u32>,
    pub disable_static_deltas: bool,
    pub require_static_deltas: bool,
    /// Resolve and plan, but fetch nothing and write no ref.
    pub dry_run: bool,
    /// Refuse to land a commit older than the one already pulled locally.
    pub timestamp_check: bool,
    pub timestamp_check_from_rev: Option<Checksum>,
    /// Bypasses summary/ref resolution for the named refs entirely.
    pub override_commit_ids: BTreeMap<String, Checksum>,
    pub disable_verify_bindings: bool,
    pub bareuseronly_files: bool,
    pub n_network_retries: u32,
    pub http_headers: Vec<(String, String)>,
    pub per_object_fsync: Option<crate::transaction::FsyncPolicy>,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            mirror: false,
            commit_only: false,
            subdirs: Vec::new(),
            depth: None,
            disable_static_deltas: false,
            require_static_deltas: false,
            dry_run: false,
            timestamp_check: false,
            timestamp_check_from_rev: None,
            override_commit_ids: BTreeMap::new(),
            disable_verify_bindings: false,
            bareuseronly_files: false,
            n_network_retries: 5,
            http_headers: Vec::new(),
            per_object_fsync: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PullOutcome {
    pub ref_name: String,
    pub commit: Checksum,
    pub bytes_fetched: u64,
    pub objects_fetched: u64,
    pub dry_run: bool,
}

/// The fsync policy a pulled object should land with: `per_object_fsync`
/// overrides the destination repo's own `core.fsync` when set, letting one
/// transfer relax (e.g. a bulk mirror seed) or force durability
/// independently of the repo's ambient setting (spec §4.5).
fn effective_fsync(repo: &Repository, options: &PullOptions) -> crate::transaction::FsyncPolicy {
    options.per_object_fsync.unwrap_or_else(|| repo.fsync_policy())
}

fn object_wire_path(kind: ObjectKind, checksum: &Checksum, mode: crate::object_store::RepoMode) -> String {
    let (bucket, rest) = checksum.bucket_split();
    format!("objects/{bucket}/{rest}.{}", kind.extension(mode))
}

fn remote_ref_category(remote: &RemoteDescriptor, options: &PullOptions) -> RefCategory {
    if options.mirror {
        RefCategory::Mirror(remote.collection_id.clone().unwrap_or_else(|| remote.name.clone()))
    } else {
        RefCategory::Remote(remote.name.clone())
    }
}

/// Checks whether `path` is reachable from any requested subdir (or every
/// path, if none were requested): an ancestor of a requested subdir must
/// still be descended into to reach it, and anything under a requested
/// subdir is wanted in full.
fn path_matches_subdirs(path: &str, subdirs: &[String]) -> bool {
    if subdirs.is_empty() {
        return true;
    }
    subdirs.iter().any(|wanted| {
        path == wanted
            || path.is_empty()
            || path.starts_with(&format!("{wanted}/"))
            || wanted.starts_with(&format!("{path}/"))
    })
}

struct Pending {
    kind: ObjectKind,
    checksum: Checksum,
    path: String,
}

/// Fetches a batch of objects through the bounded-concurrency pool, trying
/// each of `localcache_repos` before the network (spec §4.5 step 3).
async fn fetch_batch(
    repo: &Repository,
    transport: &dyn Transport,
    localcache_repos: &[ObjectStore],
    items: Vec<Pending>,
    options: &PullOptions,
    counters: &Counters,
    observer: &dyn Observer,
) -> OstreeResult<()> {
    let fsync = effective_fsync(repo, options);
    let results: Vec<OstreeResult<()>> = stream::iter(items.into_iter().map(|item| async move {
        if repo.store().has_object(item.kind, &item.checksum)? {
            return Ok(());
        }
        for cache in localcache_repos {
            if cache.has_object(item.kind, &item.checksum)? {
                cache.copy_into(repo.store(), item.kind, &item.checksum)?;
                counters.add_object();
                observer.object_completed(Phase::Fetching);
                return Ok(());
            }
        }

        let wire_path = object_wire_path(item.kind, &item.checksum, repo.mode());
        let wire_bytes = transport.fetch(&wire_path).await?;
        counters.add_bytes(wire_bytes.len() as u64);
        let canonical = repo.store().canonical_bytes_from_wire(item.kind, wire_bytes)?;
        let observed = repo.store().put_object_with_fsync(item.kind, &canonical, fsync)?;
        if observed != item.checksum {
            return Err(OstreeError::CorruptObject {
                kind: item.kind.label(),
                checksum: item.checksum,
                expected: item.checksum,
                observed,
            });
        }
        counters.add_object();
        observer.object_completed(Phase::Fetching);
        Ok(())
    }))
    .buffer_unordered(DEFAULT_FETCH_CONCURRENCY)
    .collect()
    .await;
    results.into_iter().collect::<OstreeResult<Vec<()>>>()?;
    Ok(())
}

/// Fetches a commit's tree closure breadth-first: each round fetches every
/// still-missing object at the current frontier, then decodes newly-arrived
/// dirtrees to discover the next frontier. A dirtree's children can't be
/// known before the dirtree itself has been fetched, so this can't be
/// flattened into a single upfront list the way the delta fallback list can.
async fn fetch_closure(
    repo: &Repository,
    transport: &dyn Transport,
    localcache_repos: &[ObjectStore],
    root_tree: Checksum,
    root_meta: Checksum,
    options: &PullOptions,
    counters: &Counters,
    observer: &dyn Observer,
) -> OstreeResult<()> {
    if options.commit_only {
        return Ok(());
    }

    let mut frontier = vec![
        Pending { kind: ObjectKind::DirMeta, checksum: root_meta, path: String::new() },
        Pending { kind: ObjectKind::DirTree, checksum: root_tree, path: String::new() },
    ];
    let mut visited_trees: HashSet<Checksum> = HashSet::new();

    while !frontier.is_empty() {
        let wire_paths: Vec<(ObjectKind, Checksum, String)> =
            frontier.iter().map(|p| (p.kind, p.checksum, p.path.clone())).collect();
        let batch = std::mem::take(&mut frontier);
        fetch_batch(repo, transport, localcache_repos, batch, options, counters, observer).await?;

        let mut next = Vec::new();
        for (kind, checksum, path) in wire_paths {
            if kind != ObjectKind::DirTree || !visited_trees.insert(checksum) {
                continue;
            }
            let dirtree = DirTree::decode(&repo.store().open_object(ObjectKind::DirTree, &checksum)?)?;
            for file in &dirtree.files {
                let file_path = format!("{path}/{}", file.name);
                if path_matches_subdirs(&file_path, &options.subdirs) {
                    next.push(Pending { kind: ObjectKind::File, checksum: file.checksum, path: file_path });
                }
            }
            for dir in &dirtree.dirs {
                let dir_path = format!("{path}/{}", dir.name);
                if path_matches_subdirs(&dir_path, &options.subdirs) {
                    next.push(Pending { kind: ObjectKind::DirMeta, checksum: dir.meta_checksum, path: dir_path.clone() });
                    next.push(Pending { kind: ObjectKind::DirTree, checksum: dir.tree_checksum, path: dir_path });
                }
            }
        }
        frontier = next;
    }
    Ok(())
}

/// Tries to fetch and apply a static delta ending at `to`, returning `false`
/// (without touching anything) if no delta is advertised at that path (spec
/// §4.5 step 2, §4.6).
async fn try_fetch_delta(
    repo: &Repository,
    transport: &dyn Transport,
    from: Option<Checksum>,
    to: Checksum,
    options: &PullOptions,
    counters: &Counters,
    observer: &dyn Observer,
) -> OstreeResult<bool> {
    let fsync = effective_fsync(repo, options);
    let delta_dir = match from {
        Some(f) => format!("deltas/{}-{}", f.hex(), to.hex()),
        None => format!("deltas/{}", to.hex()),
    };
    let superblock_bytes = match transport.fetch(&format!("{delta_dir}/superblock")).await {
        Ok(bytes) => bytes,
        Err(_) => return Ok(false),
    };
    counters.add_bytes(superblock_bytes.len() as u64);
    let superblock = delta::decode_superblock(&superblock_bytes)?;

    observer.phase_started(Phase::ApplyingDelta);

    let mut external_parts = Vec::new();
    for (idx, part_location) in superblock.parts.iter().enumerate() {
        if matches!(part_location, delta::PartLocation::External { .. }) {
            let part_bytes = transport.fetch(&format!("{delta_dir}/part-{idx}")).await?;
            counters.add_bytes(part_bytes.len() as u64);
            external_parts.push(delta::decode_part(&part_bytes, superblock.big_endian)?);
        }
    }

    for entry in &superblock.fallback {
        if !repo.store().has_object(entry.kind, &entry.checksum)? {
            let wire_path = object_wire_path(entry.kind, &entry.checksum, repo.mode());
            let wire_bytes = transport.fetch(&wire_path).await?;
            counters.add_bytes(wire_bytes.len() as u64);
            let canonical = repo.store().canonical_bytes_from_wire(entry.kind, wire_bytes)?;
            repo.store().put_object_with_fsync(entry.kind, &canonical, fsync)?;
            counters.add_object();
        }
    }

    delta::apply_delta(&superblock, &external_parts, repo.store(), repo.store())?;
    counters.add_object();
    observer.phase_finished(Phase::ApplyingDelta);

    if !repo.store().has_object(ObjectKind::Commit, &to)? {
        let wire_path = object_wire_path(ObjectKind::Commit, &to, repo.mode());
        let wire_bytes = transport.fetch(&wire_path).await?;
        counters.add_bytes(wire_bytes.len() as u64);
        let canonical = repo.store().canonical_bytes_from_wire(ObjectKind::Commit, wire_bytes)?;
        repo.store().put_object_with_fsync(ObjectKind::Commit, &canonical, fsync)?;
        counters.add_object();
    }
    Ok(true)
}

/// Runs the full pull algorithm for one ref against one remote: resolve,
/// plan, fetch, verify, finalize (spec §4.5).
pub async fn pull_ref(
    repo: &Repository,
    remote: &RemoteDescriptor,
    transport: &dyn Transport,
    ref_name: &str,
    options: &PullOptions,
    localcache_repos: &[ObjectStore],
    verifier: &dyn Verifier,
    observer: &dyn Observer,
) -> OstreeResult<PullOutcome> {
    let _span = info_span!("pull", remote = %remote.name, ref_name = %ref_name).entered();
    let counters = Counters::new();

    // 1. Resolve.
    observer.phase_started(Phase::Scanning);
    let target_commit = if let Some(pinned) = options.override_commit_ids.get(ref_name) {
        *pinned
    } else {
        let summary_bytes = transport.fetch("summary").await?;
        counters.add_bytes(summary_bytes.len() as u64);
        let summary = Summary::decode(&summary_bytes)?;
        summary.resolve(ref_name)?
    };
    observer.phase_finished(Phase::Scanning);

    if options.dry_run {
        return Ok(PullOutcome {
            ref_name: ref_name.to_string(),
            commit: target_commit,
            bytes_fetched: counters.bytes(),
            objects_fetched: 0,
            dry_run: true,
        });
    }

    let category = remote_ref_category(remote, options);
    let local_parent = repo.refs().resolve(&category, ref_name).ok();

    if (options.timestamp_check || options.timestamp_check_from_rev.is_some())
        && repo.store().has_object(ObjectKind::Commit, &target_commit)?
    {
        let baseline = options.timestamp_check_from_rev.or(local_parent);
        if let Some(baseline) = baseline {
            if repo.store().has_object(ObjectKind::Commit, &baseline)? {
                let baseline_commit = Commit::decode(&repo.store().open_object(ObjectKind::Commit, &baseline)?)?;
                let incoming = Commit::decode(&repo.store().open_object(ObjectKind::Commit, &target_commit)?)?;
                if incoming.timestamp < baseline_commit.timestamp {
                    return Err(OstreeError::UnconfiguredState(format!(
                        "refusing to pull {ref_name}: incoming commit is older than {baseline}"
                    )));
                }
            }
        }
    }

    repo.mark_commit_partial(&target_commit)?;
    let txn = repo.begin_transaction()?;

    // 2 & 3. Plan and fetch.
    observer.phase_started(Phase::Fetching);
    let fsync = effective_fsync(repo, options);
    let used_delta = if options.disable_static_deltas {
        false
    } else {
        try_fetch_delta(repo, transport, local_parent, target_commit, options, &counters, observer).await?
    };

    if options.require_static_deltas && !used_delta {
        repo.clear_commit_partial(&target_commit)?;
        return Err(OstreeError::DeltaError(delta::DeltaError::MalformedSuperblock(
            "no static delta available and require-static-deltas is set".into(),
        )));
    }

    if !used_delta {
        if !repo.store().has_object(ObjectKind::Commit, &target_commit)? {
            let wire_path = object_wire_path(ObjectKind::Commit, &target_commit, repo.mode());
            let wire_bytes = transport.fetch(&wire_path).await?;
            counters.add_bytes(wire_bytes.len() as u64);
            let canonical = repo.store().canonical_bytes_from_wire(ObjectKind::Commit, wire_bytes)?;
            repo.store().put_object_with_fsync(ObjectKind::Commit, &canonical, fsync)?;
            counters.add_object();
        }
        let commit = Commit::decode(&repo.store().open_object(ObjectKind::Commit, &target_commit)?)?;
        fetch_closure(repo, transport, localcache_repos, commit.root_tree, commit.root_meta, options, &counters, observer)
            .await?;

        let mut ancestor = commit.parent;
        let mut remaining_depth = options.depth.unwrap_or(0);
        while remaining_depth > 0 {
            let Some(parent_csum) = ancestor else { break };
            if !repo.store().has_object(ObjectKind::Commit, &parent_csum)? {
                let wire_path = object_wire_path(ObjectKind::Commit, &parent_csum, repo.mode());
                match transport.fetch(&wire_path).await {
                    Ok(wire_bytes) => {
                        counters.add_bytes(wire_bytes.len() as u64);
                        let canonical = repo.store().canonical_bytes_from_wire(ObjectKind::Commit, wire_bytes)?;
                        repo.store().put_object_with_fsync(ObjectKind::Commit, &canonical, fsync)?;
                        counters.add_object();
                    }
                    Err(_) => break,
                }
            }
            let parent_commit = Commit::decode(&repo.store().open_object(ObjectKind::Commit, &parent_csum)?)?;
            fetch_closure(
                repo,
                transport,
                localcache_repos,
                parent_commit.root_tree,
                parent_commit.root_meta,
                options,
                &counters,
                observer,
            )
            .await?;
            ancestor = parent_commit.parent;
            remaining_depth -= 1;
        }
    }
    counters.flush(Phase::Fetching, observer);
    observer.phase_finished(Phase::Fetching);

    // 4. Verify.
    observer.phase_started(Phase::Verifying);
    let commit = Commit::decode(&repo.store().open_object(ObjectKind::Commit, &target_commit)?)?;
    if !commit.signatures.is_empty() || remote.gpg_verify {
        verifier.verify(&commit.signable_bytes(), &commit.signatures)?;
    }
    if !options.disable_verify_bindings
        && !commit.ref_bindings.is_empty()
        && !commit.ref_bindings.iter().any(|bound| bound == ref_name)
    {
        repo.clear_commit_partial(&target_commit)?;
        return Err(OstreeError::BindingMismatch { expected: commit.ref_bindings.clone(), observed: ref_name.to_string() });
    }
    if let Some(expected) = &remote.collection_id {
        if let Some(declared) = &commit.collection_binding {
            if declared != expected {
                repo.clear_commit_partial(&target_commit)?;
                return Err(OstreeError::BindingMismatch { expected: vec![expected.clone()], observed: declared.clone() });
            }
        }
    }
    observer.phase_finished(Phase::Verifying);

    // 5. Finalize.
    observer.phase_started(Phase::Writing);
    repo.clear_commit_partial(&target_commit)?;
    repo.refs().set(&category, ref_name, target_commit)?;
    txn.commit()?;
    observer.phase_finished(Phase::Writing);

    Ok(PullOutcome {
        ref_name: ref_name.to_string(),
        commit: target_commit,
        bytes_fetched: counters.bytes(),
        objects_fetched: counters.objects(),
        dry_run: false,
    })
}

/// Convenience entry point for a pull that doesn't care about progress
/// reporting.
pub async fn pull_ref_quiet(
    repo: &Repository,
    remote: &RemoteDescriptor,
    transport: &dyn Transport,
    ref_name: &str,
    options: &PullOptions,
    localcache_repos: &[ObjectStore],
    verifier: &dyn Verifier,
) -> OstreeResult<PullOutcome> {
    pull_ref(repo, remote, transport, ref_name, options, localcache_repos, verifier, &NullObserver).await
}
