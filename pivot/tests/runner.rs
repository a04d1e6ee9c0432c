//! Single test binary aggregating the integration suites below, compiled
//! once instead of as separate binaries per file.

#[path = "test_prepare_root.rs"]
mod test_prepare_root;
