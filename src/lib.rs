//! socket-patch - backup and restore engine for dependency patches
//!
//! Preserves the original bytes of every file a security patch rewrites,
//! restores them on demand, and records applied patches in a manifest a
//! team can commit.

pub mod atomic;
pub mod backup;
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod manifest;

pub use context::PatchContext;
pub use error::{PatchError, PatchResult};
