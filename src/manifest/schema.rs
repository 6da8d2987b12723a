//! Manifest schema
//!
//! The manifest lives at `<project>/.socket/manifest.json`, is committed to
//! version control, and maps package identifiers (usually PURLs) to the
//! patch applied to that package.

use crate::backup::metadata::validate_uuid;
use crate::cache::integrity::looks_like_integrity;
use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Version written when a manifest omits one
pub const DEFAULT_VERSION: &str = "1.0.0";

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

/// Root manifest document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchManifest {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional project context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,

    /// Patches keyed by package identifier
    #[serde(default, deserialize_with = "unique_patches")]
    pub patches: BTreeMap<String, PatchRecord>,
}

impl Default for PatchManifest {
    fn default() -> Self {
        Self {
            version: default_version(),
            metadata: None,
            patches: BTreeMap::new(),
        }
    }
}

impl PatchManifest {
    /// Check the structure before it is written.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.version.trim().is_empty() {
            return Err("version is empty".to_string());
        }

        for (package_id, record) in &self.patches {
            if package_id.trim().is_empty() {
                return Err("patch with empty package identifier".to_string());
            }
            record
                .validate()
                .map_err(|reason| format!("patch {package_id:?}: {reason}"))?;
        }

        Ok(())
    }
}

/// One applied patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRecord {
    /// Joins back to the local backup metadata
    pub uuid: String,

    pub exported_at: DateTime<Utc>,

    /// Patched files keyed by path
    pub files: BTreeMap<String, FilePatch>,

    /// Advisories fixed by this patch keyed by advisory id
    #[serde(default)]
    pub vulnerabilities: BTreeMap<String, Vulnerability>,

    pub description: String,

    pub license: String,

    pub tier: Tier,
}

impl PatchRecord {
    /// Start a record with a fresh uuid
    pub fn new(description: impl Into<String>, license: impl Into<String>, tier: Tier) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            exported_at: Utc::now(),
            files: BTreeMap::new(),
            vulnerabilities: BTreeMap::new(),
            description: description.into(),
            license: license.into(),
            tier,
        }
    }

    /// Add a patched file
    pub fn with_file(
        mut self,
        path: impl Into<String>,
        before_hash: impl Into<String>,
        after_hash: impl Into<String>,
    ) -> Self {
        self.files.insert(
            path.into(),
            FilePatch {
                before_hash: before_hash.into(),
                after_hash: after_hash.into(),
            },
        );
        self
    }

    fn validate(&self) -> Result<(), String> {
        validate_uuid(&self.uuid).map_err(|e| e.to_string())?;

        for (path, file) in &self.files {
            if path.trim().is_empty() {
                return Err("file with empty path".to_string());
            }
            for (field, hash) in [("beforeHash", &file.before_hash), ("afterHash", &file.after_hash)]
            {
                if !looks_like_integrity(hash) {
                    return Err(format!("{path}: {field} {hash:?} is not an integrity string"));
                }
            }
        }

        Ok(())
    }
}

/// Hashes of a file before and after patching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePatch {
    pub before_hash: String,
    pub after_hash: String,
}

/// An advisory fixed by a patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    #[serde(default)]
    pub cves: Vec<String>,
    pub summary: String,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Patch licensing tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// Deserialize the patches map, rejecting duplicate package identifiers
fn unique_patches<'de, D>(deserializer: D) -> Result<BTreeMap<String, PatchRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    struct UniqueVisitor;

    impl<'de> Visitor<'de> for UniqueVisitor {
        type Value = BTreeMap<String, PatchRecord>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of package identifiers to patch records")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut patches = BTreeMap::new();
            while let Some((key, value)) = map.next_entry::<String, PatchRecord>()? {
                if patches.contains_key(&key) {
                    return Err(de::Error::custom(format!(
                        "duplicate patch for package {key:?}"
                    )));
                }
                patches.insert(key, value);
            }
            Ok(patches)
        }
    }

    deserializer.deserialize_map(UniqueVisitor)
}
