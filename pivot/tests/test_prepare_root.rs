//! End-to-end exercise of the path-resolution logic a real boot would run
//! before handing off to the mount syscalls (which need a disposable mount
//! namespace this test harness doesn't have).

use std::path::Path;

use ostree_prepare_root::cmdline::parse_kernel_arg;
use ostree_prepare_root::deployment::resolve_deployment;
use ostree_prepare_root::deployment::stateroot_var_dir;

#[test]
fn full_resolution_from_a_cmdline_string_to_a_var_directory() {
    let sysroot = tempfile::tempdir().unwrap();
    let deploy_dir = sysroot.path().join("ostree/deploy/default/deploy/abc123.0");
    std::fs::create_dir_all(&deploy_dir).unwrap();
    std::fs::create_dir_all(sysroot.path().join("ostree/deploy/default/var")).unwrap();
    std::os::unix::fs::symlink(&deploy_dir, sysroot.path().join("boot-link")).unwrap();

    let cmdline = "root=LABEL=/ ostree=/boot-link quiet splash\n";
    let target = parse_kernel_arg(cmdline, "ostree").unwrap();
    assert_eq!(target, "/boot-link");

    let new_root = resolve_deployment(sysroot.path(), Path::new(target)).unwrap();
    assert_eq!(new_root, deploy_dir.canonicalize().unwrap());

    let var_dir = stateroot_var_dir(&new_root).unwrap();
    assert_eq!(var_dir, sysroot.path().join("ostree/deploy/default/var").canonicalize().unwrap());
}

#[test]
fn missing_kernel_argument_is_reported_before_touching_the_filesystem() {
    let cmdline = "root=LABEL=/ quiet";
    assert!(parse_kernel_arg(cmdline, "ostree").is_none());
}
