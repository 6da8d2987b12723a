//! Backups of files before they are patched
//!
//! The [`MetadataIndex`] records which files each patch touched; the
//! [`BackupEngine`] saves, restores and removes their original bytes.

pub mod engine;
pub mod metadata;

pub use engine::{derive_backup_key, BackedUpFile, BackupEngine, CleanupReport, RestoreReport};
pub use metadata::{BackupEntry, BackupMetadata, BackupStats, MetadataIndex};
