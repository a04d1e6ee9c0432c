//! `remote {add|delete|list|show-url|refs|gpg-import}` (spec §6): manages
//! the `remote "NAME"` sections [`ostree_core::config::RepoConfig`] stores
//! in the repository's `config` file.

use std::path::PathBuf;

use clap::Args;
use clap::Subcommand;
use ostree_core::error::IoResultExt as _;
use ostree_core::error::OstreeError;
use ostree_core::error::OstreeResult;
use ostree_core::refs::RefCategory;

use super::context;

#[derive(Debug, Subcommand)]
pub enum RemoteCommand {
    Add(AddArgs),
    Delete(DeleteArgs),
    List,
    ShowUrl(ShowUrlArgs),
    Refs(RefsArgs),
    GpgImport(GpgImportArgs),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    name: String,
    url: String,
    #[arg(long)]
    no_gpg_verify: bool,
    #[arg(long)]
    collection_id: Option<String>,
    #[arg(long)]
    key_path: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    name: String,
}

#[derive(Debug, Args)]
pub struct ShowUrlArgs {
    name: String,
}

#[derive(Debug, Args)]
pub struct RefsArgs {
    name: String,
}

#[derive(Debug, Args)]
pub struct GpgImportArgs {
    name: String,
    key_file: PathBuf,
}

pub fn run(repo_path: Option<PathBuf>, cmd: RemoteCommand) -> OstreeResult<()> {
    match cmd {
        RemoteCommand::Add(args) => add(repo_path, args),
        RemoteCommand::Delete(args) => delete(repo_path, args),
        RemoteCommand::List => list(repo_path),
        RemoteCommand::ShowUrl(args) => show_url(repo_path, args),
        RemoteCommand::Refs(args) => refs(repo_path, args),
        RemoteCommand::GpgImport(args) => gpg_import(repo_path, args),
    }
}

fn add(repo_path: Option<PathBuf>, args: AddArgs) -> OstreeResult<()> {
    let mut repo = context::open_repo(repo_path.as_deref())?;
    let config = repo.config_mut();
    config.set_remote(&args.name, "url", args.url);
    config.set_remote(&args.name, "gpg-verify", (!args.no_gpg_verify).to_string());
    if let Some(collection_id) = &args.collection_id {
        config.set_remote(&args.name, "collection-id", collection_id.clone());
    }
    if let Some(key_path) = &args.key_path {
        config.set_remote(&args.name, "key-path", key_path.display().to_string());
    }
    repo.save_config()
}

fn delete(repo_path: Option<PathBuf>, args: DeleteArgs) -> OstreeResult<()> {
    let mut repo = context::open_repo(repo_path.as_deref())?;
    repo.config_mut().remove_remote(&args.name);
    repo.save_config()
}

fn list(repo_path: Option<PathBuf>) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    for name in repo.config().remotes() {
        println!("{name}");
    }
    Ok(())
}

fn show_url(repo_path: Option<PathBuf>, args: ShowUrlArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let fields = repo.config().remote(&args.name);
    let url = fields
        .get("url")
        .ok_or_else(|| OstreeError::UnconfiguredState(format!("remote {:?} has no url", args.name)))?;
    println!("{url}");
    Ok(())
}

fn refs(repo_path: Option<PathBuf>, args: RefsArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let category = RefCategory::Remote(args.name);
    for (name, csum) in repo.refs().list(&category, "")? {
        println!("{name} {}", csum.hex());
    }
    Ok(())
}

fn gpg_import(repo_path: Option<PathBuf>, args: GpgImportArgs) -> OstreeResult<()> {
    let mut repo = context::open_repo(repo_path.as_deref())?;
    let dest_dir = repo.root().join("gpg-import");
    std::fs::create_dir_all(&dest_dir).path_context(&dest_dir)?;
    let dest = dest_dir.join(format!("{}.keys", args.name));
    std::fs::copy(&args.key_file, &dest).path_context(&args.key_file)?;
    repo.config_mut().set_remote(&args.name, "key-path", dest.display().to_string());
    repo.save_config()
}
