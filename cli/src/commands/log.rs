use std::path::PathBuf;

use clap::Args;
use ostree_core::checksum::Checksum;
use ostree_core::commit::Commit;
use ostree_core::error::OstreeResult;
use ostree_core::object_store::ObjectKind;
use ostree_core::refs::RefCategory;

use super::context;

#[derive(Debug, Args)]
pub struct LogArgs {
    refspec: String,
}

pub fn run(repo_path: Option<PathBuf>, args: LogArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let mut next: Option<Checksum> = Some(repo.refs().resolve(&RefCategory::Heads, &args.refspec)?);

    while let Some(csum) = next {
        let commit = Commit::decode(&repo.store().open_object_verified(ObjectKind::Commit, &csum)?)?;
        println!("commit {}", csum.hex());
        if let Some(parent) = commit.parent {
            println!("Parent:  {}", parent.hex());
        }
        println!("Date:    {}", commit.timestamp);
        if commit.metadata.is_bootable() {
            println!("Bootable: yes");
        }
        println!("\n    {}\n", commit.subject);
        if !commit.body.is_empty() {
            for line in commit.body.lines() {
                println!("    {line}");
            }
            println!();
        }
        next = commit.parent;
    }
    Ok(())
}
