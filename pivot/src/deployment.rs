//! Resolves the `ostree=<path>` kernel argument to a deployment checkout
//! directory (spec §4.9).

use std::path::Path;
use std::path::PathBuf;

use crate::error::IoResultExt as _;
use crate::error::PrepareRootError;
use crate::error::PrepareRootResult;

/// `target` is the path named by the `ostree=` kernel argument, relative to
/// `sysroot`. It MUST be a symlink whose resolved target passes through an
/// `ostree/deploy/` path component, which is the deployment's checkout
/// directory under the stateroot.
pub fn resolve_deployment(sysroot: &Path, target: &Path) -> PrepareRootResult<PathBuf> {
    let absolute = sysroot.join(target.strip_prefix("/").unwrap_or(target));
    let meta = std::fs::symlink_metadata(&absolute).path_context(&absolute)?;
    if !meta.file_type().is_symlink() {
        return Err(PrepareRootError::NotASymlink(absolute));
    }
    let link = std::fs::read_link(&absolute).path_context(&absolute)?;
    let resolved = if link.is_absolute() { link } else { absolute.parent().unwrap_or(sysroot).join(&link) };
    let resolved = resolved.canonicalize().path_context(&resolved)?;

    let is_deployment = resolved.components().collect::<Vec<_>>().windows(2).any(|pair| {
        pair[0].as_os_str() == "ostree" && pair[1].as_os_str() == "deploy"
    });
    if !is_deployment {
        return Err(PrepareRootError::NotADeployment { target: absolute, resolved });
    }
    Ok(resolved)
}

/// `ostree/deploy/<stateroot>/deploy/<csum>.<serial>` → `ostree/deploy/<stateroot>/var`.
pub fn stateroot_var_dir(new_root: &Path) -> Option<PathBuf> {
    let components: Vec<_> = new_root.components().collect();
    let deploy_idx = components.iter().rposition(|c| c.as_os_str() == "deploy")?;
    if deploy_idx == 0 { return None; }
    let stateroot_idx = deploy_idx - 1;
    let mut var_dir: PathBuf = components[..=stateroot_idx].iter().collect();
    var_dir.push("var");
    Some(var_dir)
}

#[cfg(test)]
mod stateroot_var_dir_tests {
    use super::*;

    #[test]
    fn finds_the_sibling_var_directory() {
        let new_root = Path::new("/sysroot/ostree/deploy/default/deploy/abc123.0");
        assert_eq!(stateroot_var_dir(new_root), Some(PathBuf::from("/sysroot/ostree/deploy/default/var")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_valid_deployment_symlink() {
        let sysroot = tempfile::tempdir().unwrap();
        let deploy_dir = sysroot.path().join("ostree/deploy/default/deploy/abc123.0");
        std::fs::create_dir_all(&deploy_dir).unwrap();
        std::os::unix::fs::symlink(&deploy_dir, sysroot.path().join("current")).unwrap();

        let resolved = resolve_deployment(sysroot.path(), Path::new("current")).unwrap();
        assert_eq!(resolved, deploy_dir.canonicalize().unwrap());
    }

    #[test]
    fn rejects_a_plain_directory() {
        let sysroot = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(sysroot.path().join("not-a-symlink")).unwrap();
        let err = resolve_deployment(sysroot.path(), Path::new("not-a-symlink")).unwrap_err();
        assert!(matches!(err, PrepareRootError::NotASymlink(_)));
    }

    #[test]
    fn rejects_a_symlink_outside_ostree_deploy() {
        let sysroot = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(sysroot.path().join("elsewhere")).unwrap();
        std::os::unix::fs::symlink(sysroot.path().join("elsewhere"), sysroot.path().join("current")).unwrap();
        let err = resolve_deployment(sysroot.path(), Path::new("current")).unwrap_err();
        assert!(matches!(err, PrepareRootError::NotADeployment { .. }));
    }
}
