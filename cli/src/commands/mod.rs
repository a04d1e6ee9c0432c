//! Command dispatch (SPEC_FULL.md §6, §11.4): one module per verb or verb
//! group, each owning its `clap::Args`/`clap::Subcommand` types and a
//! `run` that returns [`ostree_core::error::OstreeResult<()>`].

pub mod admin;
pub mod checkout;
pub mod commit;
mod context;
pub mod fsck;
pub mod init;
pub mod log;
pub mod prune;
pub mod pull;
pub mod remote;
pub mod static_delta;
pub mod summary;

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use ostree_core::error::OstreeResult;

#[derive(Debug, Parser)]
#[command(name = "ostree", about = "A content-addressed object store and bootable-tree deployment engine")]
pub struct Cli {
    /// Path to the repository; defaults to `$OSTREE_REPO`, then `.`.
    #[arg(long, global = true)]
    repo: Option<PathBuf>,
    /// Path to the sysroot; defaults to `$OSTREE_SYSROOT`, then `/`.
    #[arg(long, global = true)]
    sysroot: Option<PathBuf>,
    /// Directory holding trusted-key material; defaults to `$OSTREE_GPG_HOME`.
    #[arg(long = "gpg-homedir", global = true)]
    gpg_home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init(init::InitArgs),
    Commit(commit::CommitArgs),
    Checkout(checkout::CheckoutArgs),
    Log(log::LogArgs),
    Fsck(fsck::FsckArgs),
    Prune(prune::PruneArgs),
    Pull(pull::PullArgs),
    PullLocal(pull::PullLocalArgs),
    Summary(summary::SummaryArgs),
    #[command(subcommand)]
    Remote(remote::RemoteCommand),
    #[command(name = "static-delta", subcommand)]
    StaticDelta(static_delta::StaticDeltaCommand),
    #[command(subcommand)]
    Admin(admin::AdminCommand),
}

pub async fn run(cli: Cli) -> OstreeResult<()> {
    match cli.command {
        Commands::Init(args) => init::run(cli.repo, args),
        Commands::Commit(args) => commit::run(cli.repo, args),
        Commands::Checkout(args) => checkout::run(cli.repo, args),
        Commands::Log(args) => log::run(cli.repo, args),
        Commands::Fsck(args) => fsck::run(cli.repo, args),
        Commands::Prune(args) => prune::run(cli.repo, args),
        Commands::Pull(args) => pull::run(cli.repo, cli.gpg_home, args).await,
        Commands::PullLocal(args) => pull::run_local(cli.repo, args).await,
        Commands::Summary(args) => summary::run(cli.repo, args),
        Commands::Remote(cmd) => remote::run(cli.repo, cmd),
        Commands::StaticDelta(cmd) => static_delta::run(cli.repo, cmd),
        Commands::Admin(cmd) => admin::run(cli.repo, cli.sysroot, cmd),
    }
}
