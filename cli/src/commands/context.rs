//! Environment/argument resolution shared by every subcommand (SPEC_FULL.md
//! §10.3: "process-wide knobs are environment variables only").

use std::path::Path;
use std::path::PathBuf;

use ostree_core::repo::Repository;

pub const SYSROOT_PATH_ENV: &str = "OSTREE_SYSROOT";
pub const GPG_HOME_ENV: &str = "OSTREE_GPG_HOME";

/// Resolves the sysroot root the same way [`Repository::resolve_path`]
/// resolves a repository: an explicit `--sysroot`, else `$OSTREE_SYSROOT`,
/// else `/`.
pub fn resolve_sysroot_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(env_path) = std::env::var(SYSROOT_PATH_ENV) {
        return PathBuf::from(env_path);
    }
    PathBuf::from("/")
}

pub fn resolve_gpg_home(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(|| std::env::var(GPG_HOME_ENV).ok().map(PathBuf::from))
}

pub fn open_repo(explicit: Option<&Path>) -> ostree_core::error::OstreeResult<Repository> {
    Repository::open(&Repository::resolve_path(explicit))
}
