//! Integrity strings
//!
//! An integrity string is `<algorithm>-<base64 digest>`, e.g.
//! `sha256-LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=`. The legacy
//! `git-sha256-<hex digest>` form is accepted on read and normalised; new
//! writes always produce the base64 form.

use crate::error::{PatchError, PatchResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

const LEGACY_GIT_SHA256: &str = "git-sha256-";

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    /// Used for every file backup
    #[default]
    Sha256,
    /// Used for downloaded artifacts
    Sha512,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(PatchError::InvalidIntegrity(format!(
                "unsupported algorithm {other:?}"
            ))),
        }
    }
}

/// A parsed, normalised content hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Integrity {
    algorithm: Algorithm,
    digest: Vec<u8>,
}

impl Integrity {
    /// Hash `data` with `algorithm`
    pub fn compute(algorithm: Algorithm, data: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(data),
        }
    }

    /// Parse an integrity string, accepting the legacy git form
    pub fn parse(s: &str) -> PatchResult<Self> {
        let s = s.trim();

        if let Some(hex_digest) = s.strip_prefix(LEGACY_GIT_SHA256) {
            let digest = hex::decode(hex_digest).map_err(|e| {
                PatchError::InvalidIntegrity(format!("{s:?}: bad hex digest: {e}"))
            })?;
            return Self::from_parts(Algorithm::Sha256, digest, s);
        }

        let (algo, encoded) = s
            .split_once('-')
            .ok_or_else(|| PatchError::InvalidIntegrity(format!("{s:?}: missing algorithm")))?;
        let algorithm: Algorithm = algo.parse()?;
        let digest = BASE64.decode(encoded).map_err(|e| {
            PatchError::InvalidIntegrity(format!("{s:?}: bad base64 digest: {e}"))
        })?;
        Self::from_parts(algorithm, digest, s)
    }

    fn from_parts(algorithm: Algorithm, digest: Vec<u8>, raw: &str) -> PatchResult<Self> {
        if digest.len() != algorithm.digest_len() {
            return Err(PatchError::InvalidIntegrity(format!(
                "{raw:?}: expected {} digest bytes, found {}",
                algorithm.digest_len(),
                digest.len()
            )));
        }
        Ok(Self { algorithm, digest })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Lowercase hex digest, used to build content paths
    pub fn hex_digest(&self) -> String {
        hex::encode(&self.digest)
    }

    /// Whether `data` hashes to this integrity
    pub fn matches(&self, data: &[u8]) -> bool {
        self.algorithm.digest(data) == self.digest
    }

    /// Fail with `IntegrityMismatch` unless `data` hashes to this integrity
    pub fn check(&self, key: &str, data: &[u8]) -> PatchResult<()> {
        let actual = Self::compute(self.algorithm, data);
        if actual.digest != self.digest {
            return Err(PatchError::IntegrityMismatch {
                key: key.to_string(),
                expected: self.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm, BASE64.encode(&self.digest))
    }
}

impl FromStr for Integrity {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Integrity {
    type Error = PatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Integrity> for String {
    fn from(value: Integrity) -> Self {
        value.to_string()
    }
}

/// Syntactic check for a known algorithm prefix followed by a digest.
///
/// The digest itself is not decoded.
pub fn looks_like_integrity(s: &str) -> bool {
    [LEGACY_GIT_SHA256, "sha256-", "sha512-"]
        .iter()
        .any(|prefix| s.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty()))
}
