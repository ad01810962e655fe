//! Extent and ExtentRecipe value types.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::hash::ExtentHash;

/// An immutable chunk of file content, identified by the hash of its bytes.
///
/// The hash is always derived from the content; there is no way to build an
/// extent with a mismatched hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extent {
    hash: ExtentHash,
    content: Bytes,
}

impl Extent {
    pub fn new(content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            hash: ExtentHash::of(&content),
            content,
        }
    }

    pub fn hash(&self) -> &ExtentHash {
        &self.hash
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_parts(self) -> (ExtentHash, Bytes) {
        (self.hash, self.content)
    }
}

/// Raw extent bytes as they appear inside JSON payloads and extent files.
///
/// Serialized as a base64 string in human-readable formats so arbitrary
/// binary content survives a line-oriented JSON transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtentData(#[serde(with = "base64_bytes")] pub Bytes);

impl ExtentData {
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for ExtentData {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ExtentData {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl AsRef<[u8]> for ExtentData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The ordered list of extent hashes that reconstitutes a file's content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtentRecipe(Vec<ExtentHash>);

impl ExtentRecipe {
    pub fn new(hashes: Vec<ExtentHash>) -> Self {
        Self(hashes)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn hashes(&self) -> &[ExtentHash] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_hashes(self) -> Vec<ExtentHash> {
        self.0
    }
}

impl From<Vec<ExtentHash>> for ExtentRecipe {
    fn from(hashes: Vec<ExtentHash>) -> Self {
        Self(hashes)
    }
}

impl fmt::Display for ExtentRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} extents]", self.0.len())
    }
}

/// Base64 encoding for binary data in JSON
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            STANDARD.encode(bytes).serialize(serializer)
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            STANDARD
                .decode(&s)
                .map(Bytes::from)
                .map_err(serde::de::Error::custom)
        } else {
            serde_bytes::ByteBuf::deserialize(deserializer).map(|b| Bytes::from(b.into_vec()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extent_hash_is_derived_from_content() {
        let extent = Extent::new(Bytes::from_static(b"hello "));
        assert_eq!(extent.hash(), &ExtentHash::of(b"hello "));
        assert_eq!(extent.len(), 6);
    }

    #[test]
    fn equal_content_equal_extent() {
        assert_eq!(
            Extent::new(Bytes::from_static(b"same")),
            Extent::new(Bytes::copy_from_slice(b"same"))
        );
    }

    #[test]
    fn extent_data_is_base64_in_json() {
        let data = ExtentData::from(&b"MThd"[..]);
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, "\"TVRoZA==\"");
        let parsed: ExtentData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn binary_extent_data_stays_on_one_line() {
        let raw: Vec<u8> = (0..=255u8).collect();
        let json = serde_json::to_string(&vec![ExtentData::from(raw.as_slice())]).unwrap();
        assert!(!json.contains('\n'));
        let parsed: Vec<ExtentData> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].as_ref(), raw.as_slice());
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let result: Result<ExtentData, _> = serde_json::from_str("\"not base64!\"");
        assert!(result.is_err());
    }

    #[test]
    fn recipe_serializes_as_hash_array() {
        let recipe = ExtentRecipe::new(vec![ExtentHash::of(b"a"), ExtentHash::of(b"b")]);
        let json = serde_json::to_string(&recipe).unwrap();
        let expected = format!("[\"{}\",\"{}\"]", ExtentHash::of(b"a"), ExtentHash::of(b"b"));
        assert_eq!(json, expected);
        assert_eq!(recipe.to_string(), "[2 extents]");
    }
}
