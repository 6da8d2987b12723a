//! Error types for socket-patch
//!
//! All modules use `PatchResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for socket-patch operations
pub type PatchResult<T> = Result<T, PatchError>;

/// All errors that can occur in socket-patch
#[derive(Error, Debug)]
pub enum PatchError {
    // Lookup errors
    #[error("Cache key not found: {0}")]
    CacheKeyNotFound(String),

    #[error("No backup found for patch {0}")]
    BackupNotFound(String),

    #[error("Patch not found in manifest: {0}")]
    PatchNotFound(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Integrity errors
    #[error("Integrity mismatch for {key}: expected {expected}, found {actual}")]
    IntegrityMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid integrity string: {0}")]
    InvalidIntegrity(String),

    // Validation errors
    #[error("Invalid manifest at {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Invalid backup metadata at {path}: {reason}")]
    MetadataInvalid { path: PathBuf, reason: String },

    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Restore errors
    #[error("Restore of patch {uuid} failed for {failed} of {total} file(s)")]
    RestoreIncomplete {
        uuid: String,
        failed: usize,
        total: usize,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PatchError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the error means "the thing asked for does not exist"
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::CacheKeyNotFound(_)
            | Self::BackupNotFound(_)
            | Self::PatchNotFound(_)
            | Self::PathNotFound(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether the error signals corrupted or tampered content
    pub fn is_integrity_mismatch(&self) -> bool {
        matches!(self, Self::IntegrityMismatch { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::BackupNotFound(_) => {
                Some("The patch was applied on another machine or its backups were cleaned up")
            }
            Self::IntegrityMismatch { .. } => {
                Some("The cached backup is corrupt. Reinstall the package to recover the original files")
            }
            Self::ManifestInvalid { .. } => Some("Fix or remove .socket/manifest.json and retry"),
            _ => None,
        }
    }
}
