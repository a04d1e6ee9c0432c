//! Single test binary aggregating the integration suites below, compiled
//! once instead of as separate binaries per file.

#[path = "test_repo_roundtrip.rs"]
mod test_repo_roundtrip;

#[path = "test_sysroot_lifecycle.rs"]
mod test_sysroot_lifecycle;

#[path = "test_pull_and_prune.rs"]
mod test_pull_and_prune;
