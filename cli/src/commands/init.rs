use std::path::PathBuf;

use clap::Args;
use ostree_core::error::OstreeResult;
use ostree_core::object_store::RepoMode;
use ostree_core::repo::Repository;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// archive, bare, bare-user, or bare-user-only (spec §3).
    #[arg(long, default_value = "bare")]
    mode: RepoMode,
    #[arg(long = "collection-id")]
    collection_id: Option<String>,
}

pub fn run(repo_path: Option<PathBuf>, args: InitArgs) -> OstreeResult<()> {
    let path = Repository::resolve_path(repo_path.as_deref());
    Repository::init(&path, args.mode, args.collection_id.as_deref())?;
    println!("initialized {} repository at {}", args.mode, path.display());
    Ok(())
}
