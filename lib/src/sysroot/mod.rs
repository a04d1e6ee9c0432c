//! The sysroot/deployment manager (spec §4.8): a bootable tree of
//! deployments under `ostree/deploy/<stateroot>/deploy/`, each one a
//! checked-out commit plus a merged `/etc` and an origin file, selected by a
//! two-slot `boot/loader.<n>` scheme that makes publishing a new boot menu
//! atomic with respect to power loss (the last durable step is always a
//! single symlink rename).
//!
//! Unlike ostree proper, this store's objects are always encoded (metadata
//! + content wrapped together, even in archive mode), so a deployment
//! checkout can't be a tree of hardlinks into the object store the way
//! ostree's bare mode does it. `deploy`/`stage` instead decode each object
//! and materialize real files; see [`checkout_commit`].

mod bootloader;
mod etcmerge;
mod kargs;
mod origin;

pub use bootloader::BlsBootloader;
pub use bootloader::BootEntry;
pub use bootloader::BootloaderBackend;
pub use etcmerge::EtcMergeReport;
pub use kargs::KernelArgs;
pub use origin::Origin;

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::checksum::Checksum;
use crate::commit::Commit;
use crate::error::IoResultExt as _;
use crate::error::OstreeError;
use crate::error::OstreeResult;
use crate::file_util;
use crate::lock::LockGuard;
use crate::lock::lock_exclusive;
use crate::lock::lock_shared;
use crate::object_store::ObjectKind;
use crate::object_store::ObjectStore;
use crate::repo::Repository;
use crate::tree::DirMeta;
use crate::tree::DirTree;
use crate::tree::FileObject;

/// Errors specific to deployment management, folded into [`OstreeError`] via
/// `#[from]`.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("deployment index {0} is out of range")]
    IndexOutOfRange(usize),

    #[error("no staged deployment to finalize for stateroot {0:?}")]
    NothingStaged(String),

    #[error("malformed deployment index entry: {0}")]
    MalformedIndex(String),

    #[error("unexpected loader target {0:?}")]
    UnexpectedLoaderTarget(String),
}

/// Which of the two boot slots (`loader.0`/`loader.1`, `boot.0`/`boot.1`) is
/// currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootVersion(pub u8);

impl BootVersion {
    pub fn other(self) -> Self {
        BootVersion(1 - self.0)
    }

    fn loader_dir_name(self) -> String {
        format!("loader.{}", self.0)
    }

    fn boot_dir_name(self) -> String {
        format!("boot.{}", self.0)
    }
}

/// One deployed checkout: a stateroot, a commit, and a serial disambiguating
/// repeat deploys of the same commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub stateroot: String,
    pub commit: Checksum,
    pub serial: u32,
    pub origin: Origin,
}

impl Deployment {
    pub fn directory_name(&self) -> String {
        format!("{}.{}", self.commit.hex(), self.serial)
    }
}

/// Read-only deployment listing for `admin status` (SPEC_FULL.md §11.3).
#[derive(Debug, Clone)]
pub struct DeploymentStatus {
    pub stateroot: String,
    pub commit: Checksum,
    pub serial: u32,
    pub booted: bool,
    pub unlocked: bool,
    pub unconfigured_state: Option<String>,
}

/// The sysroot: a filesystem root containing `ostree/deploy/<stateroot>/`
/// and `boot/loader.{0,1}/`.
pub struct Sysroot {
    root: PathBuf,
}

impl Sysroot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_exclusive(&self) -> OstreeResult<LockGuard> {
        lock_exclusive(&self.root.join(".lock"))
    }

    pub fn lock_shared(&self) -> OstreeResult<LockGuard> {
        lock_shared(&self.root.join(".lock"))
    }

    /// Lays out an empty sysroot: deploy root, both loader/boot slots, and
    /// a `boot/loader` symlink defaulting to slot 0.
    pub fn init_fs(&self) -> OstreeResult<()> {
        for subdir in
            ["ostree/deploy", "boot/loader.0/entries", "boot/loader.1/entries", "boot/boot.0", "boot/boot.1"]
        {
            let path = self.root.join(subdir);
            file_util::create_dir_all_reuse(&path).path_context(&path)?;
        }
        let loader_link = self.root.join("boot/loader");
        if !loader_link.exists() {
            #[cfg(unix)]
            std::os::unix::fs::symlink("loader.0", &loader_link).path_context(&loader_link)?;
        }
        info!(root = %self.root.display(), "initialized sysroot");
        Ok(())
    }

    /// Creates an empty stateroot (spec §4.8: `os-init`), the unit a set of
    /// deployments share a `/var` and a deployment history under.
    pub fn os_init(&self, stateroot: &str) -> OstreeResult<()> {
        for subdir in ["deploy", "var"] {
            let path = self.stateroot_dir(stateroot).join(subdir);
            file_util::create_dir_all_reuse(&path).path_context(&path)?;
        }
        Ok(())
    }

    fn stateroot_dir(&self, stateroot: &str) -> PathBuf {
        self.root.join("ostree/deploy").join(stateroot)
    }

    fn deploy_dir(&self, stateroot: &str) -> PathBuf {
        self.stateroot_dir(stateroot).join("deploy")
    }

    fn deployment_path(&self, deployment: &Deployment) -> PathBuf {
        self.deploy_dir(&deployment.stateroot).join(deployment.directory_name())
    }

    fn current_index_path(&self, stateroot: &str) -> PathBuf {
        self.stateroot_dir(stateroot).join("current-deployments")
    }

    fn staged_index_path(&self, stateroot: &str) -> PathBuf {
        self.stateroot_dir(stateroot).join("staged-deployments")
    }

    /// Which slot `boot/loader` currently points at.
    pub fn current_boot_version(&self) -> OstreeResult<BootVersion> {
        let loader_link = self.root.join("boot/loader");
        let target = fs::read_link(&loader_link).path_context(&loader_link)?;
        match target.to_string_lossy().as_ref() {
            "loader.0" => Ok(BootVersion(0)),
            "loader.1" => Ok(BootVersion(1)),
            other => {
                Err(OstreeError::DeploymentError(DeploymentError::UnexpectedLoaderTarget(other.to_string())))
            }
        }
    }

    /// The currently booted (index 0) and standby deployments for a
    /// stateroot, in boot-menu order.
    pub fn deployments(&self, stateroot: &str) -> OstreeResult<Vec<Deployment>> {
        self.read_index(stateroot, &self.current_index_path(stateroot))
    }

    fn read_index(&self, stateroot: &str, path: &Path) -> OstreeResult<Vec<Deployment>> {
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(path).path_context(path)?;
        let deploy_dir = self.deploy_dir(stateroot);
        let mut out = Vec::new();
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let malformed = || {
                OstreeError::DeploymentError(DeploymentError::MalformedIndex(line.to_string()))
            };
            let commit = Checksum::from_hex(parts.next().ok_or_else(malformed)?)?;
            let serial: u32 = parts.next().ok_or_else(malformed)?.parse().map_err(|_| malformed())?;
            let origin_path = deploy_dir.join(format!("{}.{}.origin", commit.hex(), serial));
            let origin = Origin::load(&origin_path)?;
            out.push(Deployment { stateroot: stateroot.to_string(), commit, serial, origin });
        }
        Ok(out)
    }

    fn write_index(&self, path: &Path, deployments: &[Deployment]) -> OstreeResult<()> {
        let mut contents = String::new();
        for d in deployments {
            contents.push_str(&format!("{} {}\n", d.commit.hex(), d.serial));
        }
        let parent = path.parent().expect("index path has a parent");
        file_util::create_dir_all_reuse(parent).path_context(parent)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent).path_context(path)?;
        use std::io::Write as _;
        temp.write_all(contents.as_bytes()).path_context(path)?;
        // The deployment index is boot-critical; fsync regardless of the
        // repo's own core.fsync setting.
        file_util::persist_temp_file(temp, path, crate::transaction::FsyncPolicy::Always).path_context(path)?;
        Ok(())
    }

    fn allocate_serial(&self, stateroot: &str, commit: Checksum) -> OstreeResult<u32> {
        let deploy_dir = self.deploy_dir(stateroot);
        if !deploy_dir.is_dir() {
            return Ok(0);
        }
        let prefix = format!("{}.", commit.hex());
        let mut max_serial = None;
        for entry in fs::read_dir(&deploy_dir).path_context(&deploy_dir)? {
            let entry = entry.path_context(&deploy_dir)?;
            if !entry.file_type().path_context(&deploy_dir)?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(serial_str) = name.strip_prefix(&prefix) {
                if let Ok(serial) = serial_str.parse::<u32>() {
                    max_serial = Some(max_serial.map_or(serial, |m: u32| m.max(serial)));
                }
            }
        }
        Ok(max_serial.map_or(0, |m| m + 1))
    }

    fn checkout_and_stage(
        &self,
        repo: &Repository,
        stateroot: &str,
        commit: Checksum,
        origin: Origin,
    ) -> OstreeResult<Deployment> {
        self.os_init(stateroot)?;
        let commit_obj = Commit::decode(&repo.store().open_object(ObjectKind::Commit, &commit)?)?;
        let serial = self.allocate_serial(stateroot, commit)?;
        let deploy_dir = self.deploy_dir(stateroot);
        file_util::create_dir_all_reuse(&deploy_dir).path_context(&deploy_dir)?;

        let checkout_path = deploy_dir.join(format!("{}.{}", commit.hex(), serial));
        checkout_commit(repo.store(), &commit_obj, &checkout_path)?;

        let new_pristine = checkout_path.join("usr/etc");
        let etc_path = checkout_path.join("etc");
        match self.deployments(stateroot)?.first() {
            Some(parent) => {
                let parent_checkout = self.deployment_path(parent);
                let old_pristine = parent_checkout.join("usr/etc");
                let user_modified = parent_checkout.join("etc");
                etcmerge::merge_etc(&old_pristine, &new_pristine, &user_modified, &etc_path)?;
            }
            None => copy_dir_contents(&new_pristine, &etc_path)?,
        }

        let origin_path = deploy_dir.join(format!("{}.{}.origin", commit.hex(), serial));
        origin.save(&origin_path)?;

        Ok(Deployment { stateroot: stateroot.to_string(), commit, serial, origin })
    }

    fn save_kargs(&self, deployment: &Deployment, kargs: &KernelArgs) -> OstreeResult<()> {
        let path = self.deploy_dir(&deployment.stateroot).join(format!(
            "{}.{}.kargs",
            deployment.commit.hex(),
            deployment.serial
        ));
        fs::write(&path, kargs.render()).path_context(&path)
    }

    fn load_kargs(&self, deployment: &Deployment) -> KernelArgs {
        let path = self.deploy_dir(&deployment.stateroot).join(format!(
            "{}.{}.kargs",
            deployment.commit.hex(),
            deployment.serial
        ));
        fs::read_to_string(&path).map(|s| KernelArgs::parse(&s)).unwrap_or_default()
    }

    fn write_loader_entries(
        &self,
        version: BootVersion,
        deployments: &[Deployment],
        bootloader: &dyn BootloaderBackend,
    ) -> OstreeResult<()> {
        let loader_dir = self.root.join("boot").join(version.loader_dir_name());
        let boot_dir = self.root.join("boot").join(version.boot_dir_name());
        file_util::create_dir_all_reuse(&boot_dir).path_context(&boot_dir)?;

        let mut entries = Vec::with_capacity(deployments.len());
        for deployment in deployments {
            let bootcsum = deployment.commit.short();
            let entry_boot_dir = boot_dir.join(&bootcsum);
            file_util::create_or_reuse_dir(&entry_boot_dir).path_context(&entry_boot_dir)?;

            let checkout_boot = self.deployment_path(deployment).join("boot");
            for name in ["vmlinuz", "initramfs.img"] {
                let src = checkout_boot.join(name);
                if src.is_file() {
                    fs::copy(&src, entry_boot_dir.join(name)).path_context(&entry_boot_dir)?;
                }
            }

            entries.push(BootEntry {
                title: format!("{} {}", deployment.stateroot, deployment.commit.short()),
                version: format!("{}.{}", deployment.commit.hex(), deployment.serial),
                linux: format!("/{}/{}/vmlinuz", version.boot_dir_name(), bootcsum),
                initrd: format!("/{}/{}/initramfs.img", version.boot_dir_name(), bootcsum),
                options: self.load_kargs(deployment),
            });
        }
        bootloader.write_entries(&loader_dir, &entries)
    }

    fn flip_loader(&self, version: BootVersion) -> OstreeResult<()> {
        let link_path = self.root.join("boot/loader");
        let tmp_path = self.root.join("boot/.loader-tmp");
        let _ = fs::remove_file(&tmp_path);
        #[cfg(unix)]
        std::os::unix::fs::symlink(version.loader_dir_name(), &tmp_path).path_context(&tmp_path)?;
        fs::rename(&tmp_path, &link_path).path_context(&link_path)
    }

    fn publish(
        &self,
        stateroot: &str,
        deployments: &[Deployment],
        bootloader: &dyn BootloaderBackend,
    ) -> OstreeResult<()> {
        let next_version = self.current_boot_version()?.other();
        self.write_loader_entries(next_version, deployments, bootloader)?;
        self.write_index(&self.current_index_path(stateroot), deployments)?;
        self.flip_loader(next_version)
    }

    /// Checks out `commit`, merges `/etc`, publishes a new boot menu, and
    /// flips `boot/loader` to make it the default (spec §4.8 `deploy`).
    pub fn deploy(
        &self,
        repo: &Repository,
        stateroot: &str,
        commit: Checksum,
        origin: Origin,
        kargs: &KernelArgs,
        bootloader: &dyn BootloaderBackend,
    ) -> OstreeResult<Deployment> {
        let _lock = self.lock_exclusive()?;
        let deployment = self.checkout_and_stage(repo, stateroot, commit, origin)?;
        self.save_kargs(&deployment, kargs)?;

        let mut deployments = self.deployments(stateroot)?;
        deployments.insert(0, deployment.clone());
        self.publish(stateroot, &deployments, bootloader)?;
        Ok(deployment)
    }

    /// Like [`Self::deploy`], but writes into the standby slot without
    /// flipping `boot/loader`; [`Self::finalize_staged`] commits it later
    /// (spec §4.8 `stage`/`finalize-staged`, used for offline upgrades that
    /// shouldn't take effect until next boot).
    pub fn stage(
        &self,
        repo: &Repository,
        stateroot: &str,
        commit: Checksum,
        origin: Origin,
        kargs: &KernelArgs,
        bootloader: &dyn BootloaderBackend,
    ) -> OstreeResult<Deployment> {
        let _lock = self.lock_exclusive()?;
        let deployment = self.checkout_and_stage(repo, stateroot, commit, origin)?;
        self.save_kargs(&deployment, kargs)?;

        let mut deployments = self.deployments(stateroot)?;
        deployments.insert(0, deployment.clone());
        let next_version = self.current_boot_version()?.other();
        self.write_loader_entries(next_version, &deployments, bootloader)?;
        self.write_index(&self.staged_index_path(stateroot), &deployments)?;
        Ok(deployment)
    }

    /// Flips `boot/loader` to the slot a prior [`Self::stage`] populated.
    pub fn finalize_staged(&self, stateroot: &str) -> OstreeResult<()> {
        let _lock = self.lock_exclusive()?;
        let staged_path = self.staged_index_path(stateroot);
        if !staged_path.is_file() {
            return Err(OstreeError::DeploymentError(DeploymentError::NothingStaged(stateroot.to_string())));
        }
        let deployments = self.read_index(stateroot, &staged_path)?;
        let next_version = self.current_boot_version()?.other();
        self.flip_loader(next_version)?;
        self.write_index(&self.current_index_path(stateroot), &deployments)?;
        fs::remove_file(&staged_path).path_context(&staged_path)
    }

    /// Removes the deployment at `index` from the boot menu (spec §4.8
    /// `undeploy`) and sweeps its checkout via [`Self::cleanup`].
    pub fn undeploy(
        &self,
        stateroot: &str,
        index: usize,
        bootloader: &dyn BootloaderBackend,
    ) -> OstreeResult<()> {
        let _lock = self.lock_exclusive()?;
        let mut deployments = self.deployments(stateroot)?;
        if index >= deployments.len() {
            return Err(OstreeError::DeploymentError(DeploymentError::IndexOutOfRange(index)));
        }
        deployments.remove(index);
        self.publish(stateroot, &deployments, bootloader)?;
        self.cleanup(stateroot)
    }

    /// Deletes any deployment checkout/origin/kargs files not referenced by
    /// the current or a staged deployment list (spec §4.8 `cleanup`).
    pub fn cleanup(&self, stateroot: &str) -> OstreeResult<()> {
        let deploy_dir = self.deploy_dir(stateroot);
        if !deploy_dir.is_dir() {
            return Ok(());
        }
        let mut referenced: HashSet<String> =
            self.deployments(stateroot)?.iter().map(Deployment::directory_name).collect();
        if let Ok(staged) = self.read_index(stateroot, &self.staged_index_path(stateroot)) {
            referenced.extend(staged.iter().map(Deployment::directory_name));
        }

        for entry in fs::read_dir(&deploy_dir).path_context(&deploy_dir)? {
            let entry = entry.path_context(&deploy_dir)?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let base = name.strip_suffix(".origin").or_else(|| name.strip_suffix(".kargs")).unwrap_or(&name);
            if referenced.contains(base) {
                continue;
            }
            if path.is_dir() {
                fs::remove_dir_all(&path).path_context(&path)?;
            } else {
                fs::remove_file(&path).path_context(&path)?;
            }
        }
        info!(stateroot, "cleaned up unreferenced deployment checkouts");
        Ok(())
    }

    /// Read-only listing for `admin status` (SPEC_FULL.md §11.3): every
    /// deployment, flagging index 0 as booted.
    pub fn status(&self, stateroot: &str) -> OstreeResult<Vec<DeploymentStatus>> {
        let _lock = self.lock_shared()?;
        Ok(self
            .deployments(stateroot)?
            .into_iter()
            .enumerate()
            .map(|(index, d)| DeploymentStatus {
                stateroot: d.stateroot,
                commit: d.commit,
                serial: d.serial,
                booted: index == 0,
                unlocked: d.origin.unlocked,
                unconfigured_state: d.origin.unconfigured_state,
            })
            .collect())
    }
}

fn copy_dir_contents(src: &Path, dst: &Path) -> OstreeResult<()> {
    file_util::create_dir_all_reuse(dst).path_context(dst)?;
    if !src.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(src).path_context(src)? {
        let entry = entry.path_context(src)?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().path_context(&from)?;
        if file_type.is_dir() {
            copy_dir_contents(&from, &to)?;
        } else if file_type.is_symlink() {
            #[cfg(unix)]
            {
                let target = fs::read_link(&from).path_context(&from)?;
                let _ = fs::remove_file(&to);
                std::os::unix::fs::symlink(target, &to).path_context(&to)?;
            }
        } else {
            fs::copy(&from, &to).path_context(&to)?;
        }
    }
    Ok(())
}

/// Materializes a commit's tree as real files under `dest` (see the module
/// doc for why this can't be a tree of hardlinks into the object store
/// here). Ownership beyond mode bits is left to the caller: `bare-user*`
/// repos keep real ownership in the `user.ostreemeta` xattr, not in the
/// checkout, so there is nothing universally correct to `chown` to.
fn checkout_commit(store: &ObjectStore, commit: &Commit, dest: &Path) -> OstreeResult<()> {
    checkout_tree(store, commit.root_tree, commit.root_meta, dest)
}

fn checkout_tree(store: &ObjectStore, tree: Checksum, meta: Checksum, dest: &Path) -> OstreeResult<()> {
    let dirmeta = DirMeta::decode(&store.open_object(ObjectKind::DirMeta, &meta)?)?;
    file_util::create_dir_all_reuse(dest).path_context(dest)?;
    set_mode(dest, dirmeta.mode);

    let dirtree = DirTree::decode(&store.open_object(ObjectKind::DirTree, &tree)?)?;
    for file in &dirtree.files {
        let file_obj = FileObject::decode(&store.open_object(ObjectKind::File, &file.checksum)?)?;
        checkout_file(&file_obj, &dest.join(&file.name))?;
    }
    for dir in &dirtree.dirs {
        checkout_tree(store, dir.tree_checksum, dir.meta_checksum, &dest.join(&dir.name))?;
    }
    Ok(())
}

fn checkout_file(file: &FileObject, dest: &Path) -> OstreeResult<()> {
    if file.is_symlink() {
        #[cfg(unix)]
        std::os::unix::fs::symlink(&file.symlink_target, dest).path_context(dest)?;
    } else {
        fs::write(dest, &file.content).path_context(dest)?;
        set_mode(dest, file.mode);
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::RepoMode;
    use crate::repo::Repository;
    use crate::tree_builder::MutableTree;

    fn commit_single_file(repo: &Repository, path: &str, content: &[u8]) -> Checksum {
        let file = FileObject {
            uid: 0,
            gid: 0,
            mode: 0o100644,
            rdev: 0,
            symlink_target: String::new(),
            xattrs: vec![],
            content: content.to_vec(),
        };
        let file_csum = repo.store().put_object(ObjectKind::File, &file.encode()).unwrap();

        let mut root = MutableTree::new();
        root.set_metadata(DirMeta::new(0, 0, 0o040755, vec![]));
        let mut cursor = &mut root;
        let mut components: Vec<&str> = path.split('/').collect();
        let file_name = components.pop().unwrap();
        for dir_name in components {
            cursor.set_metadata(DirMeta::new(0, 0, 0o040755, vec![]));
            cursor = cursor.ensure_dir(dir_name);
        }
        cursor.set_metadata(DirMeta::new(0, 0, 0o040755, vec![]));
        cursor.replace_file(file_name, file_csum);

        let (root_tree, root_meta) = root.finalize(repo.store()).unwrap();
        let commit = Commit {
            metadata: crate::commit::Metadata::default(),
            parent: None,
            subject: "test".into(),
            body: String::new(),
            timestamp: 0,
            root_tree,
            root_meta,
            ref_bindings: vec![],
            collection_binding: None,
            signatures: vec![],
        };
        repo.store().put_object(ObjectKind::Commit, &commit.encode()).unwrap()
    }

    #[test]
    fn first_deploy_has_no_parent_and_pristine_etc_becomes_live_etc() {
        let dir = crate::tests::new_temp_dir();
        let repo = Repository::init(&dir.path().join("repo"), RepoMode::BareUser, None).unwrap();
        let commit = commit_single_file(&repo, "usr/etc/hostname", b"box1\n");

        let sysroot = Sysroot::new(dir.path().join("sysroot"));
        sysroot.init_fs().unwrap();
        let deployment = sysroot
            .deploy(&repo, "default", commit, Origin::new("origin:main"), &KernelArgs::new(), &BlsBootloader)
            .unwrap();

        let etc_hostname = sysroot.deployment_path(&deployment).join("etc/hostname");
        assert_eq!(fs::read_to_string(etc_hostname).unwrap(), "box1\n");
        assert_eq!(sysroot.deployments("default").unwrap(), vec![deployment]);
    }

    #[test]
    fn second_deploy_merges_etc_and_flips_the_loader_slot() {
        let dir = crate::tests::new_temp_dir();
        let repo = Repository::init(&dir.path().join("repo"), RepoMode::BareUser, None).unwrap();
        let commit_a = commit_single_file(&repo, "usr/etc/hostname", b"box1\n");
        let commit_b = commit_single_file(&repo, "usr/etc/hostname", b"box2\n");

        let sysroot = Sysroot::new(dir.path().join("sysroot"));
        sysroot.init_fs().unwrap();
        let first = sysroot
            .deploy(&repo, "default", commit_a, Origin::new("origin:main"), &KernelArgs::new(), &BlsBootloader)
            .unwrap();
        let before = sysroot.current_boot_version().unwrap();

        // user never touched /etc/hostname, so the second deploy should
        // pick up the new commit's value.
        let second = sysroot
            .deploy(&repo, "default", commit_b, Origin::new("origin:main"), &KernelArgs::new(), &BlsBootloader)
            .unwrap();
        let after = sysroot.current_boot_version().unwrap();

        assert_ne!(before.0, after.0);
        let etc_hostname = sysroot.deployment_path(&second).join("etc/hostname");
        assert_eq!(fs::read_to_string(etc_hostname).unwrap(), "box2\n");

        let deployments = sysroot.deployments("default").unwrap();
        assert_eq!(deployments[0], second);
        assert_eq!(deployments[1], first);
    }

    #[test]
    fn undeploy_then_cleanup_removes_the_unreferenced_checkout() {
        let dir = crate::tests::new_temp_dir();
        let repo = Repository::init(&dir.path().join("repo"), RepoMode::BareUser, None).unwrap();
        let commit_a = commit_single_file(&repo, "usr/etc/hostname", b"box1\n");
        let commit_b = commit_single_file(&repo, "usr/etc/hostname", b"box2\n");

        let sysroot = Sysroot::new(dir.path().join("sysroot"));
        sysroot.init_fs().unwrap();
        let first = sysroot
            .deploy(&repo, "default", commit_a, Origin::new("origin:main"), &KernelArgs::new(), &BlsBootloader)
            .unwrap();
        sysroot
            .deploy(&repo, "default", commit_b, Origin::new("origin:main"), &KernelArgs::new(), &BlsBootloader)
            .unwrap();

        let stale_checkout = sysroot.deployment_path(&first);
        assert!(stale_checkout.is_dir());

        sysroot.undeploy("default", 1, &BlsBootloader).unwrap();
        assert!(!stale_checkout.is_dir());
        assert_eq!(sysroot.deployments("default").unwrap().len(), 1);
    }

    #[test]
    fn status_flags_index_zero_as_booted() {
        let dir = crate::tests::new_temp_dir();
        let repo = Repository::init(&dir.path().join("repo"), RepoMode::BareUser, None).unwrap();
        let commit = commit_single_file(&repo, "usr/etc/hostname", b"box1\n");

        let sysroot = Sysroot::new(dir.path().join("sysroot"));
        sysroot.init_fs().unwrap();
        sysroot
            .deploy(&repo, "default", commit, Origin::new("origin:main"), &KernelArgs::new(), &BlsBootloader)
            .unwrap();

        let status = sysroot.status("default").unwrap();
        assert_eq!(status.len(), 1);
        assert!(status[0].booted);
    }
}
