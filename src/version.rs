//! Schema versioning

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checksum::Checksum;

/// One immutable snapshot of a schema specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Version number, starting at 1
    pub version: u32,
    /// Encoded schema definition (base64 on the wire), opaque to the store
    pub specification: String,
    /// SHA256 of `specification`
    #[serde(rename = "schema-hash")]
    pub hash: Checksum,
}

impl SchemaVersion {
    /// Create a new version, computing the hash of the specification
    pub fn new(version: u32, specification: impl Into<String>) -> Self {
        let specification = specification.into();
        let hash = Checksum::of(&specification);
        Self {
            version,
            specification,
            hash,
        }
    }

    /// The version that follows the highest one in `existing`
    pub fn next_number(existing: &[SchemaVersion]) -> u32 {
        existing.iter().map(|v| v.version).max().unwrap_or(0) + 1
    }

    /// Parse a version number as carried in the `versionId` attribute
    pub fn parse_number(version: &str) -> Option<u32> {
        version.trim().parse::<u32>().ok().filter(|v| *v > 0)
    }

    /// Verify the stored hash matches the specification
    pub fn verify_hash(&self) -> bool {
        self.hash.verify(&self.specification)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version)
    }
}
