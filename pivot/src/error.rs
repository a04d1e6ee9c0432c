//! Error taxonomy for the pivot helper. Kept separate from
//! `ostree_core::error::OstreeError` since this binary runs standalone in
//! initramfs, before any repository is reachable.

use std::path::PathBuf;

use thiserror::Error;

pub type PrepareRootResult<T> = Result<T, PrepareRootError>;

#[derive(Debug, Error)]
pub enum PrepareRootError {
    #[error("no ostree= argument on the kernel command line")]
    MissingKernelArg,

    #[error("{0} is not a symlink")]
    NotASymlink(PathBuf),

    #[error("{target} does not resolve into ostree/deploy/...: {resolved}")]
    NotADeployment { target: PathBuf, resolved: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("mount failed ({action} on {target}): {source}")]
    Mount {
        action: &'static str,
        target: PathBuf,
        source: std::io::Error,
    },
}

impl PrepareRootError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn mount(action: &'static str, target: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        Self::Mount { action, target: target.into(), source: source.into() }
    }
}

pub trait IoResultExt<T> {
    fn path_context(self, path: impl Into<PathBuf>) -> PrepareRootResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn path_context(self, path: impl Into<PathBuf>) -> PrepareRootResult<T> {
        self.map_err(|source| PrepareRootError::io(path, source))
    }
}
