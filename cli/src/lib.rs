//! Library half of the `ostree` binary: `main.rs` is a thin wrapper so
//! integration tests can drive subcommand handlers directly instead of
//! spawning the compiled binary.

pub mod commands;
