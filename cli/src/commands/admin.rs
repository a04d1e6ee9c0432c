//! `admin {init-fs|os-init|deploy|stage|finalize-staged|undeploy|upgrade|
//! switch|set-origin|cleanup|status|instutil}` (spec §4.8, §6): the sysroot
//! and deployment lifecycle, grounded in [`ostree_core::sysroot::Sysroot`].
//!
//! A refspec here is `REMOTE:REF` (resolved against that remote's mirrored
//! refs) or a bare local ref/checksum, matching `origin`'s own `refspec`
//! field (`ostree_core::sysroot::origin`).

use std::path::PathBuf;

use clap::Args;
use clap::Subcommand;
use ostree_core::checksum::Checksum;
use ostree_core::error::OstreeError;
use ostree_core::error::OstreeResult;
use ostree_core::refs::RefCategory;
use ostree_core::repo::Repository;
use ostree_core::sysroot::BlsBootloader;
use ostree_core::sysroot::KernelArgs;
use ostree_core::sysroot::Origin;
use ostree_core::sysroot::Sysroot;

use super::context;

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    InitFs,
    OsInit(OsInitArgs),
    Deploy(DeployArgs),
    Stage(DeployArgs),
    FinalizeStaged(StaterootArgs),
    Undeploy(UndeployArgs),
    Upgrade(StaterootArgs),
    Switch(DeployArgs),
    SetOrigin(SetOriginArgs),
    Cleanup(StaterootArgs),
    Status(StaterootArgs),
    /// Internal-utility grab bag; this implementation only supports the one
    /// subcommand it has a concrete use for (spec leaves the rest
    /// unspecified, see `DESIGN.md`).
    Instutil(InstutilArgs),
}

#[derive(Debug, Args)]
pub struct OsInitArgs {
    stateroot: String,
}

#[derive(Debug, Args)]
pub struct StaterootArgs {
    #[arg(long, default_value = "default")]
    stateroot: String,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    refspec: String,
    #[arg(long, default_value = "default")]
    stateroot: String,
    #[arg(long = "karg")]
    kargs: Vec<String>,
}

#[derive(Debug, Args)]
pub struct UndeployArgs {
    index: usize,
    #[arg(long, default_value = "default")]
    stateroot: String,
}

#[derive(Debug, Args)]
pub struct SetOriginArgs {
    #[arg(long, default_value = "default")]
    stateroot: String,
    #[arg(long)]
    index: usize,
    refspec: String,
}

#[derive(Debug, Args)]
pub struct InstutilArgs {
    #[command(subcommand)]
    sub: InstutilSub,
}

#[derive(Debug, Subcommand)]
pub enum InstutilSub {
    /// Writes `/run/ostree-booted`, the stamp the pivot helper normally
    /// leaves behind so userspace can detect it's running an
    /// ostree-managed root.
    SetBootedStamp,
}

pub fn run(repo_path: Option<PathBuf>, sysroot_path: Option<PathBuf>, cmd: AdminCommand) -> OstreeResult<()> {
    let sysroot = Sysroot::new(context::resolve_sysroot_path(sysroot_path.as_deref()));
    match cmd {
        AdminCommand::InitFs => sysroot.init_fs(),
        AdminCommand::OsInit(args) => sysroot.os_init(&args.stateroot),
        AdminCommand::Deploy(args) => deploy(&sysroot, repo_path, args, false),
        AdminCommand::Stage(args) => deploy(&sysroot, repo_path, args, true),
        AdminCommand::FinalizeStaged(args) => sysroot.finalize_staged(&args.stateroot),
        AdminCommand::Undeploy(args) => sysroot.undeploy(&args.stateroot, args.index, &BlsBootloader),
        AdminCommand::Upgrade(args) => upgrade(&sysroot, repo_path, args),
        AdminCommand::Switch(args) => deploy(&sysroot, repo_path, args, false),
        AdminCommand::SetOrigin(args) => set_origin(&sysroot, repo_path, args),
        AdminCommand::Cleanup(args) => sysroot.cleanup(&args.stateroot),
        AdminCommand::Status(args) => status(&sysroot, args),
        AdminCommand::Instutil(args) => instutil(&sysroot, args),
    }
}

/// Resolves `REMOTE:REF` against that remote's mirrored refs, otherwise a
/// local head, otherwise a bare checksum.
fn resolve_refspec(repo: &Repository, refspec: &str) -> OstreeResult<Checksum> {
    if let Some((remote, ref_name)) = refspec.split_once(':') {
        return repo.refs().resolve(&RefCategory::Remote(remote.to_string()), ref_name);
    }
    match repo.refs().resolve(&RefCategory::Heads, refspec) {
        Ok(csum) => Ok(csum),
        Err(OstreeError::RefNotFound(_)) => Checksum::from_hex(refspec),
        Err(e) => Err(e),
    }
}

fn build_kargs(raw: &[String]) -> KernelArgs {
    let mut kargs = KernelArgs::new();
    for arg in raw {
        kargs.append(arg.clone());
    }
    kargs
}

fn deploy(sysroot: &Sysroot, repo_path: Option<PathBuf>, args: DeployArgs, stage_only: bool) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let commit = resolve_refspec(&repo, &args.refspec)?;
    let origin = Origin::new(args.refspec.clone());
    let kargs = build_kargs(&args.kargs);

    let deployment = if stage_only {
        sysroot.stage(&repo, &args.stateroot, commit, origin, &kargs, &BlsBootloader)?
    } else {
        sysroot.deploy(&repo, &args.stateroot, commit, origin, &kargs, &BlsBootloader)?
    };
    println!("deployed {} ({})", deployment.directory_name(), deployment.stateroot);
    Ok(())
}

/// Re-deploys the stateroot's current origin against whatever commit its
/// refspec now resolves to (spec §4.8 `upgrade`: pull first, then this).
fn upgrade(sysroot: &Sysroot, repo_path: Option<PathBuf>, args: StaterootArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let current = sysroot
        .deployments(&args.stateroot)?
        .into_iter()
        .next()
        .ok_or_else(|| OstreeError::UnconfiguredState(format!("no deployments for {:?}", args.stateroot)))?;

    if let Some(state) = &current.origin.unconfigured_state {
        return Err(OstreeError::UnconfiguredState(state.clone()));
    }

    let commit = resolve_refspec(&repo, &current.origin.refspec)?;
    if commit == current.commit {
        println!("already up to date at {}", commit.hex());
        return Ok(());
    }

    let kargs = KernelArgs::new();
    let deployment =
        sysroot.deploy(&repo, &args.stateroot, commit, current.origin.clone(), &kargs, &BlsBootloader)?;
    println!("upgraded to {} ({})", deployment.directory_name(), deployment.stateroot);
    Ok(())
}

fn set_origin(sysroot: &Sysroot, repo_path: Option<PathBuf>, args: SetOriginArgs) -> OstreeResult<()> {
    let repo = context::open_repo(repo_path.as_deref())?;
    let deployments = sysroot.deployments(&args.stateroot)?;
    let deployment = deployments
        .get(args.index)
        .ok_or_else(|| OstreeError::DeploymentError(ostree_core::sysroot::DeploymentError::IndexOutOfRange(args.index)))?;

    let _ = resolve_refspec(&repo, &args.refspec)?;
    let mut origin = deployment.origin.clone();
    origin.refspec = args.refspec;
    let path = sysroot
        .root()
        .join("ostree/deploy")
        .join(&args.stateroot)
        .join("deploy")
        .join(format!("{}.{}.origin", deployment.commit.hex(), deployment.serial));
    origin.save(&path)
}

fn status(sysroot: &Sysroot, args: StaterootArgs) -> OstreeResult<()> {
    for status in sysroot.status(&args.stateroot)? {
        println!(
            "{}{} {} .{}{}",
            if status.booted { "* " } else { "  " },
            status.stateroot,
            status.commit.hex(),
            status.serial,
            if status.unlocked { " (unlocked)" } else { "" },
        );
        if let Some(state) = &status.unconfigured_state {
            println!("    unconfigured: {state}");
        }
    }
    Ok(())
}

fn instutil(sysroot: &Sysroot, args: InstutilArgs) -> OstreeResult<()> {
    match args.sub {
        InstutilSub::SetBootedStamp => {
            let stamp = sysroot.root().join("run/ostree-booted");
            if let Some(parent) = stamp.parent() {
                std::fs::create_dir_all(parent).map_err(|e| OstreeError::io(parent, e))?;
            }
            std::fs::write(&stamp, b"").map_err(|e| OstreeError::io(&stamp, e))
        }
    }
}
