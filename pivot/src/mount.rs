//! Low-level mount-namespace surgery (spec §4.9). Every operation here
//! mutates kernel mount state and is the one place in this workspace that
//! does; there is no dry-run mode.

use std::path::Path;
use std::path::PathBuf;

use rustix::mount::MountFlags;
use rustix::mount::MountPropagationFlags;

use crate::error::PrepareRootError;
use crate::error::PrepareRootResult;

/// Whether the initramfs handed us the disk directly at `/`, or staged it
/// at `/sysroot` (the common dracut layout). Determines whether we can
/// `pivot_root` straight away or need the three-step `MS_MOVE` dance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealRoot {
    Root,
    Sysroot,
}

impl RealRoot {
    pub fn detect(sysroot: &Path) -> Self {
        if sysroot == Path::new("/") { Self::Root } else { Self::Sysroot }
    }
}

/// Bind-mounts `path` over itself, turning it into its own mount entry
/// detached from whatever filesystem its parent directory lives on. This
/// has to happen before the real-root `/sysroot` case below moves that
/// parent mount out from under it.
pub fn bind_mount_over_self(path: &Path) -> PrepareRootResult<()> {
    rustix::mount::mount_bind(path, path).map_err(|e| PrepareRootError::mount("bind", path, e))
}

pub fn bind_mount(source: &Path, target: &Path) -> PrepareRootResult<()> {
    rustix::mount::mount_bind(source, target).map_err(|e| PrepareRootError::mount("bind", target, e))
}

/// Remounts an existing bind mount read-only. Mount flags can't be set on
/// the initial bind in the same call; the kernel requires a second
/// `MS_REMOUNT` pass.
pub fn remount_readonly(target: &Path) -> PrepareRootResult<()> {
    rustix::mount::mount_remount(target, MountFlags::BIND | MountFlags::RDONLY, "")
        .map_err(|e| PrepareRootError::mount("remount-ro", target, e))
}

/// Mounts an overlayfs with `new_root/usr` as the read-only lower layer
/// and the deployment's `.usr-ovl-{upper,work}` directories as the
/// writable layer.
pub fn mount_usr_overlay(usr: &Path, upper: &Path, work: &Path) -> PrepareRootResult<()> {
    let data = format!("lowerdir={},upperdir={},workdir={}", usr.display(), upper.display(), work.display());
    rustix::mount::mount("overlay", usr, "overlay", MountFlags::empty(), data.as_str())
        .map_err(|e| PrepareRootError::mount("overlay", usr, e))
}

/// Moves `new_root` so that it becomes the process's `/`.
///
/// When the real root is already `/`, this is a plain `pivot_root`: the
/// old root ends up reachable at `new_root/sysroot` and is then
/// unmounted. When the real root is staged at `/sysroot`, `new_root`
/// lives underneath it; moving it straight onto `/` would move a
/// filesystem under itself (the kernel rejects this), so we park
/// `new_root` at a scratch mountpoint first, tuck the old `/sysroot`
/// mount inside it, and only then move the combined tree onto `/`.
pub fn install_new_root(real_root: RealRoot, new_root: &Path) -> PrepareRootResult<()> {
    match real_root {
        RealRoot::Root => pivot_root_into(new_root),
        RealRoot::Sysroot => move_root_into(new_root),
    }
}

fn pivot_root_into(new_root: &Path) -> PrepareRootResult<()> {
    let old_root = new_root.join("sysroot");
    std::fs::create_dir_all(&old_root).map_err(|e| PrepareRootError::io(&old_root, e))?;

    rustix::process::chdir(new_root).map_err(|e| PrepareRootError::mount("chdir", new_root, e))?;
    rustix::process::pivot_root(".", "sysroot").map_err(|e| PrepareRootError::mount("pivot_root", new_root, e))?;
    rustix::process::chdir("/").map_err(|e| PrepareRootError::mount("chdir", Path::new("/"), e))?;

    rustix::mount::unmount("/sysroot", rustix::mount::UnmountFlags::DETACH)
        .map_err(|e| PrepareRootError::mount("umount", Path::new("/sysroot"), e))?;
    Ok(())
}

fn move_root_into(new_root: &Path) -> PrepareRootResult<()> {
    let parking = PathBuf::from("/.ostree-new-root");
    std::fs::create_dir_all(&parking).map_err(|e| PrepareRootError::io(&parking, e))?;

    // Step 1: park new_root somewhere that isn't underneath /sysroot, so
    // the next move doesn't carry it along as a submount.
    rustix::mount::mount_move(new_root, &parking).map_err(|e| PrepareRootError::mount("move", new_root, e))?;

    // Step 2: tuck the old /sysroot mount inside the parked tree, at the
    // path it'll occupy once the parked tree becomes the new root.
    let parked_sysroot = parking.join("sysroot");
    std::fs::create_dir_all(&parked_sysroot).map_err(|e| PrepareRootError::io(&parked_sysroot, e))?;
    rustix::mount::mount_move(Path::new("/sysroot"), &parked_sysroot)
        .map_err(|e| PrepareRootError::mount("move", Path::new("/sysroot"), e))?;

    // Step 3: move the combined tree onto `/`.
    rustix::mount::mount_move(&parking, Path::new("/")).map_err(|e| PrepareRootError::mount("move", Path::new("/"), e))?;

    rustix::process::chroot(".").map_err(|e| PrepareRootError::mount("chroot", Path::new("."), e))?;
    rustix::process::chdir("/").map_err(|e| PrepareRootError::mount("chdir", Path::new("/"), e))?;
    Ok(())
}

/// Marks this mount's propagation private so later mounts under it (bind
/// mounts for `/var`, `/usr`) don't leak into the outer namespace.
pub fn make_private(path: &Path) -> PrepareRootResult<()> {
    rustix::mount::mount_change(path, MountPropagationFlags::PRIVATE)
        .map_err(|e| PrepareRootError::mount("make-private", path, e))
}
