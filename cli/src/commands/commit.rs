use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use clap::Args;
use ostree_core::checksum::Checksum;
use ostree_core::commit::Commit;
use ostree_core::commit::Metadata;
use ostree_core::commit::MetadataValue;
use ostree_core::error::OstreeError;
use ostree_core::error::OstreeResult;
use ostree_core::import::import_directory;
use ostree_core::object_store::ObjectKind;
use ostree_core::object_store::RepoMode;
use ostree_core::refs::RefCategory;
use ostree_core::tree_builder::CommitModifier;

use super::context;

#[derive(Debug, Args)]
pub struct CommitArgs {
    #[arg(long)]
    branch: String,
    #[arg(long, default_value = "")]
    subject: String,
    #[arg(long, default_value = "")]
    body: String,
    /// Directory to import as the commit's tree; omit to reuse the parent's.
    #[arg(long)]
    tree: Option<PathBuf>,
    /// A checksum, or the literal `none` to force a parentless commit.
    /// Defaults to the branch's current tip, if any.
    #[arg(long)]
    parent: Option<String>,
    #[arg(long)]
    bootable: bool,
}

fn resolve_parent(repo: &ostree_core::repo::Repository, branch: &str, requested: Option<&str>) -> OstreeResult<Option<Checksum>> {
    match requested {
        Some("none") => Ok(None),
        Some(hex) => Ok(Some(Checksum::from_hex(hex)?)),
        None => match repo.refs().resolve(&RefCategory::Heads, branch) {
            Ok(csum) => Ok(Some(csum)),
            Err(OstreeError::RefNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        },
    }
}

pub fn run(repo_path: Option<PathBuf>, args: CommitArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let parent = resolve_parent(&repo, &args.branch, args.parent.as_deref())?;
    let parent_commit = parent
        .map(|csum| Commit::decode(&repo.store().open_object_verified(ObjectKind::Commit, &csum)?))
        .transpose()?;

    let txn = repo.begin_transaction()?;

    let (root_tree, root_meta) = if let Some(dir) = &args.tree {
        // bare-user-only can't store suid bits or non-canonical modes
        // (object_store::validate_file_object), so canonicalize on the way
        // in rather than rejecting the import (spec §4.2).
        let modifier = CommitModifier::new().canonicalize_permissions(repo.mode() == RepoMode::BareUserOnly);
        import_directory(repo.store(), dir, &modifier)?
    } else {
        let parent_commit = parent_commit.as_ref().ok_or_else(|| {
            OstreeError::Config("--tree omitted but there is no parent commit to reuse a tree from".into())
        })?;
        (parent_commit.root_tree, parent_commit.root_meta)
    };

    // skip-if-unchanged (spec §4.2): an unchanged root never fabricates a
    // new commit object, it just re-points the branch at the parent.
    if let (Some(parent_commit), Some(parent_csum)) = (&parent_commit, parent) {
        if parent_commit.root_tree == root_tree && parent_commit.root_meta == root_meta {
            repo.refs().set(&RefCategory::Heads, &args.branch, parent_csum)?;
            txn.commit()?;
            println!("{}", parent_csum.hex());
            return Ok(());
        }
    }

    let mut metadata = Metadata::new();
    if args.bootable {
        metadata.insert("ostree.bootable", MetadataValue::Bool(true));
    }

    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let commit = Commit {
        metadata,
        parent,
        subject: args.subject,
        body: args.body,
        timestamp,
        root_tree,
        root_meta,
        ref_bindings: vec![args.branch.clone()],
        collection_binding: repo.config().ini.get("core", "collection-id").map(str::to_string),
        signatures: vec![],
    };
    let checksum = repo.store().put_object(ObjectKind::Commit, &commit.encode())?;
    repo.refs().set(&RefCategory::Heads, &args.branch, checksum)?;
    txn.commit()?;
    println!("{}", checksum.hex());
    Ok(())
}
