use std::path::PathBuf;

use clap::Args;
use ostree_core::error::OstreeError;
use ostree_core::error::OstreeResult;
use ostree_core::fsck;
use ostree_core::fsck::FsckOptions;

use super::context;

#[derive(Debug, Args)]
pub struct FsckArgs {
    #[arg(long)]
    add_tombstones: bool,
    #[arg(long)]
    quiet: bool,
}

pub fn run(repo_path: Option<PathBuf>, args: FsckArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let options = FsckOptions { add_tombstones: args.add_tombstones, quiet: args.quiet };
    let report = fsck::fsck(&repo, &options)?;

    if !options.quiet {
        println!("checked {} commits", report.commits_checked);
        for missing in &report.missing {
            println!("missing: {} {}", missing.kind.label(), missing.checksum.hex());
        }
        for corrupt in &report.corrupt {
            println!("corrupt: {} {}", corrupt.kind.label(), corrupt.checksum.hex());
        }
        for stale in &report.stale_commitpartial_removed {
            println!("removed stale .commitpartial: {}", stale.hex());
        }
        for tombstone in &report.tombstones_written {
            println!("wrote tombstone for: {}", tombstone.hex());
        }
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(OstreeError::Config(format!(
            "fsck found {} missing and {} corrupt object(s)",
            report.missing.len(),
            report.corrupt.len()
        )))
    }
}
