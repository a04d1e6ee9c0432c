//! Content-addressed object store and bootable-tree deployment engine for
//! Linux root filesystems.
//!
//! This crate implements the three tightly coupled subsystems that make up
//! an ostree-style system: the [`repo`] object store and transaction
//! manager, the [`pull`] / [`delta`] fetch pipeline, and the [`sysroot`]
//! deployment and boot-slot manager. The early-boot helper that assembles
//! the running root from a deployment lives in the separate
//! `ostree-prepare-root` crate (`pivot/`), since it runs standalone in
//! initramfs before any repository is reachable.

pub mod canonical;
pub mod checksum;
pub mod commit;
pub mod config;
pub mod delta;
pub mod error;
pub mod file_util;
pub mod fsck;
pub mod import;
pub mod lock;
pub mod object_store;
pub mod progress;
pub mod prune;
pub mod pull;
pub mod refs;
pub mod repo;
pub mod signing;
pub mod summary;
pub mod sysroot;
pub mod transaction;
pub mod tree;
pub mod tree_builder;
