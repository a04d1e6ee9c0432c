//! Early-boot helper (spec §4.9): reads `ostree=<path>` off the kernel
//! command line, resolves it to a deployment checkout, and pivots the
//! running mount namespace into it.

use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use ostree_prepare_root::cmdline;
use ostree_prepare_root::deployment;
use ostree_prepare_root::error::IoResultExt as _;
use ostree_prepare_root::error::PrepareRootError;
use ostree_prepare_root::error::PrepareRootResult;
use ostree_prepare_root::mount;
use ostree_prepare_root::mount::RealRoot;

const CMDLINE_PATH: &str = "/proc/cmdline";

fn real_root_location() -> PathBuf {
    if Path::new("/sysroot").is_dir() { PathBuf::from("/sysroot") } else { PathBuf::from("/") }
}

fn run() -> PrepareRootResult<()> {
    let cmdline = std::fs::read_to_string(CMDLINE_PATH).path_context(CMDLINE_PATH)?;
    let target = cmdline::parse_kernel_arg(&cmdline, "ostree").ok_or(PrepareRootError::MissingKernelArg)?;

    let sysroot = real_root_location();
    let real_root = RealRoot::detect(&sysroot);
    let new_root = deployment::resolve_deployment(&sysroot, Path::new(target))?;

    tracing::info!(new_root = %new_root.display(), ?real_root, "pivoting into deployment");

    mount::bind_mount_over_self(&new_root)?;
    mount::make_private(&new_root)?;

    if let Some(var_dir) = deployment::stateroot_var_dir(&new_root) {
        std::fs::create_dir_all(new_root.join("var")).path_context(new_root.join("var"))?;
        mount::bind_mount(&var_dir, &new_root.join("var"))?;
    }

    mount::install_new_root(real_root, &new_root)?;

    let usr = PathBuf::from("/usr");
    let ovl_work = PathBuf::from("/.usr-ovl-work");
    if ovl_work.is_dir() {
        let upper = PathBuf::from("/.usr-ovl-upper");
        std::fs::create_dir_all(&upper).path_context(&upper)?;
        mount::mount_usr_overlay(&usr, &upper, &ovl_work)?;
    } else {
        mount::bind_mount_over_self(&usr)?;
        mount::remount_readonly(&usr)?;
    }

    std::fs::create_dir_all("/run").path_context("/run")?;
    std::fs::File::create("/run/ostree-booted").path_context("/run/ostree-booted")?;

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ostree-prepare-root: {e}");
            ExitCode::FAILURE
        }
    }
}
