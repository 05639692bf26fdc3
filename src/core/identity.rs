//! Composite file identity
//!
//! Files are referenced both by numeric id and by content hash. The pair is
//! carried as one value and checked against the catalog on every write.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    id: i64,
    hash: String,
}

impl FileIdentity {
    /// Build an identity; the hash is trimmed and lowercased.
    pub fn new(id: i64, hash: &str) -> Result<Self> {
        let hash = normalize_hash(hash)?;
        Ok(Self { id, hash })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Error describing a conflict between this identity and a recorded one.
    pub(crate) fn mismatch(&self, recorded_id: i64, recorded_hash: &str) -> Error {
        Error::IdentityMismatch {
            file_id: self.id,
            file_hash: self.hash.clone(),
            recorded_id,
            recorded_hash: recorded_hash.to_string(),
        }
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.id, self.hash)
    }
}

/// Hashes are hex digests (SHA1 in practice); anything non-hex is rejected.
pub fn normalize_hash(hash: &str) -> Result<String> {
    let trimmed = hash.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidHash(hash.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}
