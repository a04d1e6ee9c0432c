//! Bootloader entry writing (spec §4.8: deploy/undeploy regenerate
//! `loader.<n>/entries/`). The actual bootloader install/sync step (GRUB2,
//! systemd-boot, extlinux) is out of scope; this only emits the Boot Loader
//! Specification entry files those bootloaders read.

use std::fs;
use std::path::Path;

use crate::error::IoResultExt as _;
use crate::error::OstreeResult;
use crate::file_util;
use crate::sysroot::kargs::KernelArgs;

/// One boot menu entry for a single deployment.
#[derive(Debug, Clone)]
pub struct BootEntry {
    pub title: String,
    pub version: String,
    pub linux: String,
    pub initrd: String,
    pub options: KernelArgs,
}

pub trait BootloaderBackend: Send + Sync {
    /// Replaces the entire contents of `<loader_dir>/entries/` with one file
    /// per deployment, in boot-menu order.
    fn write_entries(&self, loader_dir: &Path, entries: &[BootEntry]) -> OstreeResult<()>;
}

/// Boot Loader Specification entries: the format both GRUB2's BLS support
/// and systemd-boot consume, one `ostree-<n>.conf` file per deployment.
pub struct BlsBootloader;

impl BootloaderBackend for BlsBootloader {
    fn write_entries(&self, loader_dir: &Path, entries: &[BootEntry]) -> OstreeResult<()> {
        let entries_dir = loader_dir.join("entries");
        if entries_dir.is_dir() {
            for existing in fs::read_dir(&entries_dir).path_context(&entries_dir)? {
                let existing = existing.path_context(&entries_dir)?;
                fs::remove_file(existing.path()).path_context(&entries_dir)?;
            }
        } else {
            file_util::create_dir_all_reuse(&entries_dir).path_context(&entries_dir)?;
        }

        for (index, entry) in entries.iter().enumerate() {
            let contents = format!(
                "title {}\nversion {}\nlinux {}\ninitrd {}\noptions {}\n",
                entry.title, entry.version, entry.linux, entry.initrd, entry.options.render(),
            );
            let path = entries_dir.join(format!("ostree-{index}.conf"));
            fs::write(&path, contents).path_context(&path)?;
        }
        Ok(())
    }
}
