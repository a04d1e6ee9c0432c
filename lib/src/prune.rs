//! Reachability-based garbage collection (spec §4.7): mark every object
//! reachable from the ref set, then sweep `objects/` of everything else.
//!
//! The mark and sweep phases run under the repository's exclusive lock so
//! that a concurrent writer can never be observed moving an object into
//! place that the sweep would otherwise delete out from under it (spec §4.7,
//! §5).

use std::collections::HashSet;

use tracing::info;

use crate::checksum::Checksum;
use crate::commit::Commit;
use crate::error::OstreeResult;
use crate::object_store::ObjectKind;
use crate::object_store::ObjectStore;
use crate::refs::RefCategory;
use crate::repo::Repository;
use crate::tree::DirTree;

/// Tuning knobs for a prune run (spec §6 CLI surface: `prune [--refs-only]
/// [--depth=N] [--keep-younger-than=TS]`).
#[derive(Debug, Clone, Default)]
pub struct PruneOptions {
    /// Only mark each ref's tip commit, ignoring its ancestor chain
    /// entirely — the named commits' full closures are still kept, just not
    /// their history.
    pub refs_only: bool,
    /// How many parents to walk past each ref's tip. `None` is unbounded.
    pub depth: Option<u32>,
    /// Ancestors at or past `depth` are still kept if their timestamp is at
    /// or above this cutoff (unix seconds).
    pub keep_younger_than: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub commits_kept: usize,
    pub objects_removed: usize,
    pub bytes_reclaimed: u64,
}

fn mark_tree_closure(
    store: &ObjectStore,
    tree: &Checksum,
    meta: &Checksum,
    marked: &mut HashSet<(ObjectKind, Checksum)>,
) -> OstreeResult<()> {
    if !marked.insert((ObjectKind::DirTree, *tree)) {
        return Ok(());
    }
    marked.insert((ObjectKind::DirMeta, *meta));

    let dirtree = DirTree::decode(&store.open_object(ObjectKind::DirTree, tree)?)?;
    for file in &dirtree.files {
        marked.insert((ObjectKind::File, file.checksum));
    }
    for dir in &dirtree.dirs {
        mark_tree_closure(store, &dir.tree_checksum, &dir.meta_checksum, marked)?;
    }
    Ok(())
}

/// Walks one ref's ancestor chain, marking every reachable object, and
/// returns how many commits were kept.
fn mark_from_ref(
    store: &ObjectStore,
    start: Checksum,
    options: &PruneOptions,
    marked: &mut HashSet<(ObjectKind, Checksum)>,
) -> OstreeResult<usize> {
    let effective_depth = if options.refs_only { Some(0) } else { options.depth };

    let mut current = Some(start);
    let mut depth = 0u32;
    let mut kept = 0usize;
    while let Some(csum) = current {
        if marked.contains(&(ObjectKind::Commit, csum)) {
            break;
        }
        let commit = Commit::decode(&store.open_object(ObjectKind::Commit, &csum)?)?;
        mark_tree_closure(store, &commit.root_tree, &commit.root_meta, marked)?;
        marked.insert((ObjectKind::Commit, csum));
        kept += 1;

        current = match commit.parent {
            None => None,
            Some(parent) => {
                let within_depth = effective_depth.map(|d| depth < d).unwrap_or(true);
                let kept_by_cutoff =
                    options.keep_younger_than.map(|cutoff| commit.timestamp >= cutoff).unwrap_or(false);
                if within_depth || kept_by_cutoff {
                    depth += 1;
                    Some(parent)
                } else {
                    None
                }
            }
        };
    }
    Ok(kept)
}

fn discover_mirror_collections(repo: &Repository) -> OstreeResult<Vec<String>> {
    let mirrors_dir = repo.root().join("refs").join("mirrors");
    if !mirrors_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut collections = Vec::new();
    for entry in std::fs::read_dir(&mirrors_dir).map_err(|e| crate::error::OstreeError::io(&mirrors_dir, e))? {
        let entry = entry.map_err(|e| crate::error::OstreeError::io(&mirrors_dir, e))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            collections.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    collections.sort();
    Ok(collections)
}

/// Marks every object reachable from every ref (heads, per-remote, and
/// per-collection mirrors), then deletes every unreachable object from the
/// store (spec §4.7).
pub fn prune(repo: &Repository, options: &PruneOptions) -> OstreeResult<PruneReport> {
    let _lock = repo.lock_exclusive()?;

    let mut marked = HashSet::new();
    let mut commits_kept = 0usize;

    let heads = repo.refs().list(&RefCategory::Heads, "")?;
    for (_, checksum) in &heads {
        commits_kept += mark_from_ref(repo.store(), *checksum, options, &mut marked)?;
    }
    for remote in repo.config().remotes() {
        for (_, checksum) in repo.refs().list(&RefCategory::Remote(remote), "")? {
            commits_kept += mark_from_ref(repo.store(), checksum, options, &mut marked)?;
        }
    }
    for collection in discover_mirror_collections(repo)? {
        for (_, checksum) in repo.refs().list(&RefCategory::Mirror(collection), "")? {
            commits_kept += mark_from_ref(repo.store(), checksum, options, &mut marked)?;
        }
    }

    let txn = repo.begin_transaction()?;
    let mut objects_removed = 0usize;
    let mut bytes_reclaimed = 0u64;
    for entry in repo.store().iter_objects()? {
        let (kind, checksum) = entry?;
        if marked.contains(&(kind, checksum)) {
            continue;
        }
        bytes_reclaimed += repo.store().object_disk_size(kind, &checksum).unwrap_or(0);
        repo.store().remove_object(kind, &checksum)?;
        objects_removed += 1;
    }
    txn.commit()?;

    info!(commits_kept, objects_removed, bytes_reclaimed, "prune complete");
    Ok(PruneReport { commits_kept, objects_removed, bytes_reclaimed })
}
