//! `static-delta {list|show|delete|generate|apply-offline}` (spec §4.6,
//! §6). Deltas live on disk under `repo.deltas_dir()` using the same
//! `<to-hex>` / `<from-hex>-<to-hex>` naming [`ostree_core::pull`]'s puller
//! expects when fetching them from this repository as a remote.
//!
//! [`ostree_core::delta::generate_delta`] only ever emits
//! [`ostree_core::delta::PartLocation::Inline`] parts (no bsdiff library is
//! among this workspace's dependencies to make `External` worthwhile; see
//! `DESIGN.md`), so a generated delta is a single `superblock` file with no
//! sibling `part-<n>` files to manage.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use clap::Subcommand;
use ostree_core::checksum::Checksum;
use ostree_core::commit::Commit;
use ostree_core::delta;
use ostree_core::delta::DeltaOptions;
use ostree_core::error::IoResultExt as _;
use ostree_core::error::OstreeError;
use ostree_core::error::OstreeResult;
use ostree_core::object_store::ObjectKind;
use ostree_core::object_store::ObjectStore;
use ostree_core::repo::Repository;
use ostree_core::tree::DirTree;

use super::context;

#[derive(Debug, Subcommand)]
pub enum StaticDeltaCommand {
    List,
    Show(ShowArgs),
    Delete(DeleteArgs),
    Generate(GenerateArgs),
    ApplyOffline(ApplyOfflineArgs),
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    name: String,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    name: String,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long)]
    from: Option<Checksum>,
    to: Checksum,
}

#[derive(Debug, Args)]
pub struct ApplyOfflineArgs {
    src_repo: PathBuf,
    name: String,
}

fn delta_name(from: Option<&Checksum>, to: &Checksum) -> String {
    match from {
        Some(f) => format!("{}-{}", f.hex(), to.hex()),
        None => to.hex(),
    }
}

fn superblock_path(repo: &Repository, name: &str) -> PathBuf {
    repo.deltas_dir().join(name).join("superblock")
}

pub fn run(repo_path: Option<PathBuf>, cmd: StaticDeltaCommand) -> OstreeResult<()> {
    match cmd {
        StaticDeltaCommand::List => list(repo_path),
        StaticDeltaCommand::Show(args) => show(repo_path, args),
        StaticDeltaCommand::Delete(args) => delete(repo_path, args),
        StaticDeltaCommand::Generate(args) => generate(repo_path, args),
        StaticDeltaCommand::ApplyOffline(args) => apply_offline(repo_path, args),
    }
}

fn list(repo_path: Option<PathBuf>) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let deltas_dir = repo.deltas_dir();
    if !deltas_dir.is_dir() {
        return Ok(());
    }
    let mut names: Vec<String> = fs::read_dir(&deltas_dir)
        .path_context(&deltas_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().join("superblock").is_file())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn show(repo_path: Option<PathBuf>, args: ShowArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let path = superblock_path(&repo, &args.name);
    let bytes = fs::read(&path).path_context(&path)?;
    let superblock = delta::decode_superblock(&bytes)?;

    println!("name: {}", args.name);
    match &superblock.from {
        Some(from) => println!("from: {}", from.hex()),
        None => println!("from: (none)"),
    }
    println!("to: {}", superblock.to.hex());
    println!("timestamp: {}", superblock.timestamp);
    println!("parts: {}", superblock.parts.len());
    println!("fallback objects: {}", superblock.fallback.len());
    println!("declared total size: {} bytes", superblock.declared_total_size());
    Ok(())
}

fn delete(repo_path: Option<PathBuf>, args: DeleteArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let dir = repo.deltas_dir().join(&args.name);
    if dir.is_dir() {
        fs::remove_dir_all(&dir).path_context(&dir)?;
    }
    Ok(())
}

fn generate(repo_path: Option<PathBuf>, args: GenerateArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let store = repo.store();

    let from_commit = match &args.from {
        Some(csum) => Some(Commit::decode(&store.open_object_verified(ObjectKind::Commit, csum)?)?),
        None => None,
    };
    let to_commit = Commit::decode(&store.open_object_verified(ObjectKind::Commit, &args.to)?)?;

    let superblock = delta::generate_delta(store, from_commit.as_ref(), &to_commit, &DeltaOptions::default())?;
    let name = delta_name(args.from.as_ref(), &args.to);
    let dir = repo.deltas_dir().join(&name);
    fs::create_dir_all(&dir).path_context(&dir)?;
    let path = dir.join("superblock");
    fs::write(&path, delta::encode_superblock(&superblock)).path_context(&path)?;
    println!("{name}: {} bytes", superblock.declared_total_size());
    Ok(())
}

/// Copies the dirtree/dirmeta closure under `tree`/`meta` from `source`
/// into `dest`, mirroring the object kinds [`ostree_core::delta`] leaves
/// out of a superblock's parts (it only ever diffs file content).
fn copy_tree_metadata(source: &ObjectStore, dest: &ObjectStore, tree: Checksum, meta: Checksum) -> OstreeResult<()> {
    source.copy_into(dest, ObjectKind::DirMeta, &meta)?;
    source.copy_into(dest, ObjectKind::DirTree, &tree)?;
    let dirtree = DirTree::decode(&source.open_object(ObjectKind::DirTree, &tree)?)?;
    for dir in &dirtree.dirs {
        copy_tree_metadata(source, dest, dir.tree_checksum, dir.meta_checksum)?;
    }
    Ok(())
}

fn apply_offline(repo_path: Option<PathBuf>, args: ApplyOfflineArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let source_repo = Repository::open(&args.src_repo)?;
    let source = source_repo.store();
    let path = superblock_path(&repo, &args.name);
    let bytes = fs::read(&path).path_context(&path)?;
    let superblock = delta::decode_superblock(&bytes)?;

    if !superblock.fallback.is_empty() {
        return Err(OstreeError::Config(format!(
            "delta {:?} references {} fallback object(s); apply-offline needs a full source repo copy of them",
            args.name,
            superblock.fallback.len()
        )));
    }

    delta::apply_delta(&superblock, &[], source, repo.store())?;

    let to_commit = Commit::decode(&source.open_object(ObjectKind::Commit, &superblock.to)?)?;
    copy_tree_metadata(source, repo.store(), to_commit.root_tree, to_commit.root_meta)?;
    source.copy_into(repo.store(), ObjectKind::Commit, &superblock.to)?;

    println!(
        "applied {}: {} -> {}",
        args.name,
        superblock.from.map(|c| c.hex()).unwrap_or_default(),
        superblock.to.hex()
    );
    Ok(())
}
