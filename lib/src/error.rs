//! Error taxonomy shared across every component (spec §7).
//!
//! Each component has its own error enum (see e.g. [`crate::object_store`]'s
//! `ObjectStoreError`, or [`crate::pull`]'s `PullError`); all of them convert
//! into [`OstreeError`] via `#[from]` so call sites can use `?` end to end and
//! the CLI has a single type to render.

use std::path::PathBuf;

use thiserror::Error;

use crate::checksum::Checksum;

pub type OstreeResult<T> = Result<T, OstreeError>;

/// The top-level error type. One variant per cause, matching spec §7
/// almost one for one.
#[derive(Debug, Error)]
pub enum OstreeError {
    #[error("object not found: {kind} {checksum}")]
    ObjectNotFound { kind: &'static str, checksum: Checksum },

    #[error("corrupt object {kind} {checksum}: expected {expected}, got {observed}")]
    CorruptObject {
        kind: &'static str,
        checksum: Checksum,
        expected: Checksum,
        observed: Checksum,
    },

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("ref already exists: {0}")]
    RefAlreadyExists(String),

    #[error("invalid tree: {0}")]
    InvalidTree(String),

    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("a transaction is already active on this repository")]
    TransactionAlreadyActive,

    #[error("no transaction is active on this repository")]
    NoTransaction,

    #[error("signature failure: {0}")]
    SignatureFailure(#[from] crate::signing::SignatureFailure),

    #[error("binding mismatch: commit is bound to {expected:?}, expected it to include {observed}")]
    BindingMismatch { expected: Vec<String>, observed: String },

    #[error("http error {status} fetching {url}")]
    RemoteHttpError { status: u16, url: String },

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("delta error: {0}")]
    DeltaError(#[from] crate::delta::DeltaError),

    #[error("deployment error: {0}")]
    DeploymentError(#[from] crate::sysroot::DeploymentError),

    #[error("unconfigured: {0}")]
    UnconfiguredState(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error on {path}: {source}")]
    IoError { path: PathBuf, source: std::io::Error },

    #[error("configuration error: {0}")]
    Config(String),
}

impl OstreeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError { path: path.into(), source }
    }
}

/// Helper for attaching a path to an [`std::io::Error`], mirroring the
/// `.context(path)` convention this codebase uses throughout for I/O calls.
pub trait IoResultExt<T> {
    fn path_context(self, path: impl Into<PathBuf>) -> Result<T, OstreeError>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn path_context(self, path: impl Into<PathBuf>) -> Result<T, OstreeError> {
        self.map_err(|source| OstreeError::io(path, source))
    }
}
