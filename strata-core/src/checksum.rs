//! Version-tagged content checksums.
//!
//! Stored checksums carry the version of the algorithm that produced them
//! (`"<version>:<hex>"`). A stored checksum is always validated with its own
//! algorithm version, so the current algorithm can evolve without
//! invalidating ledger history.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::{MigrateResult, MigrationError};

/// The algorithm version used for newly computed checksums.
pub const CURRENT_CHECKSUM_VERSION: u8 = 2;

/// A content checksum plus the version of the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    /// Algorithm version.
    pub version: u8,
    /// Hex-encoded digest.
    pub digest: String,
}

impl Checksum {
    /// Compute a checksum of `content` with the current algorithm.
    pub fn compute(content: &str) -> Self {
        Self::compute_versioned(CURRENT_CHECKSUM_VERSION, content)
    }

    /// Compute a checksum with a specific algorithm version.
    ///
    /// - v1 hashes the raw content bytes.
    /// - v2 hashes whitespace-normalized content, so reformatting a
    ///   changelog does not invalidate history.
    pub fn compute_versioned(version: u8, content: &str) -> Self {
        let digest = match version {
            1 => sha256_hex(content),
            _ => sha256_hex(&normalize(content)),
        };
        Self { version, digest }
    }

    /// Whether `content` hashes to this checksum under this checksum's own
    /// algorithm version.
    pub fn matches_content(&self, content: &str) -> bool {
        Self::compute_versioned(self.version, content).digest == self.digest
    }

    /// Whether this checksum was produced by an older algorithm version.
    pub fn is_outdated(&self) -> bool {
        self.version < CURRENT_CHECKSUM_VERSION
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.version, self.digest)
    }
}

impl FromStr for Checksum {
    type Err = MigrationError;

    fn from_str(s: &str) -> MigrateResult<Self> {
        let (version, digest) = s
            .split_once(':')
            .ok_or_else(|| MigrationError::other(format!("malformed checksum '{s}'")))?;
        let version = version
            .parse::<u8>()
            .map_err(|_| MigrationError::other(format!("malformed checksum version in '{s}'")))?;
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MigrationError::other(format!(
                "malformed checksum digest in '{s}'"
            )));
        }
        Ok(Self {
            version,
            digest: digest.to_ascii_lowercase(),
        })
    }
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Collapse whitespace runs to a single space and trim.
fn normalize(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_across_recompute() {
        let a = Checksum::compute("addColumn users bar INT");
        let b = Checksum::compute("addColumn users bar INT");
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_change_changes_digest() {
        let a = Checksum::compute("addColumn users bar INT");
        let b = Checksum::compute("addColumn users bar BIGINT");
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_v2_ignores_whitespace() {
        let a = Checksum::compute_versioned(2, "addColumn   users\n  bar INT");
        let b = Checksum::compute_versioned(2, "addColumn users bar INT");
        assert_eq!(a, b);
    }

    #[test]
    fn test_v1_is_whitespace_sensitive() {
        let a = Checksum::compute_versioned(1, "addColumn  users");
        let b = Checksum::compute_versioned(1, "addColumn users");
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_old_version_still_validates() {
        let content = "createTable users";
        let stored = Checksum::compute_versioned(1, content);
        assert!(stored.is_outdated());
        // Validated with its own algorithm, not recomputed with the new one.
        assert!(stored.matches_content(content));
    }

    #[test]
    fn test_roundtrip_string_form() {
        let checksum = Checksum::compute("x");
        let parsed: Checksum = checksum.to_string().parse().unwrap();
        assert_eq!(parsed, checksum);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("nocolon".parse::<Checksum>().is_err());
        assert!("9999:abc".parse::<Checksum>().is_err());
        assert!("2:not-hex!".parse::<Checksum>().is_err());
        assert!("2:".parse::<Checksum>().is_err());
    }
}
