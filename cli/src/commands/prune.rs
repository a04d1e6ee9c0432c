use std::path::PathBuf;

use clap::Args;
use ostree_core::error::OstreeResult;
use ostree_core::prune;
use ostree_core::prune::PruneOptions;

use super::context;

#[derive(Debug, Args)]
pub struct PruneArgs {
    #[arg(long)]
    refs_only: bool,
    #[arg(long)]
    depth: Option<u32>,
    #[arg(long)]
    keep_younger_than: Option<u64>,
}

pub fn run(repo_path: Option<PathBuf>, args: PruneArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let options = PruneOptions {
        refs_only: args.refs_only,
        depth: args.depth,
        keep_younger_than: args.keep_younger_than,
    };
    let report = prune::prune(&repo, &options)?;
    println!(
        "kept {} commits, removed {} objects ({} bytes reclaimed)",
        report.commits_kept, report.objects_removed, report.bytes_reclaimed
    );
    Ok(())
}
