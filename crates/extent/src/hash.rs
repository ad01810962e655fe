//! ExtentHash: the BLAKE3 digest of an extent's content (256 bits, 64 hex chars).
//!
//! The hash is the extent's identity. It is the key of the server's extent
//! table, the file name of a persisted extent, and the token that travels in
//! `put_extents` replies and `get_extents`/`poll_extent` requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a rendered hash in hex characters.
pub const HASH_HEX_LEN: usize = 64;

/// A content hash - the full 32-byte BLAKE3 digest, lowercase hex.
///
/// Deserializing validates the format, so a malformed token in a request
/// payload fails to decode instead of silently missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExtentHash(String);

/// Errors that can occur when parsing an extent hash.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("invalid hash length: expected 64 hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character in hash")]
    InvalidHex,
}

impl ExtentHash {
    /// Hash content and return its extent hash.
    pub fn of(content: &[u8]) -> Self {
        Self(hex::encode(blake3::hash(content).as_bytes()))
    }

    /// Create from an existing hash string (validates format).
    pub fn from_str_checked(s: &str) -> Result<Self, HashError> {
        if s.len() != HASH_HEX_LEN {
            return Err(HashError::InvalidLength(s.len()));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Whether `content` hashes to this value.
    pub fn matches(&self, content: &[u8]) -> bool {
        Self::of(content) == *self
    }

    /// Get the full hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ExtentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExtentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

impl TryFrom<String> for ExtentHash {
    type Error = HashError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str_checked(&s)
    }
}

impl From<ExtentHash> for String {
    fn from(hash: ExtentHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for ExtentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
