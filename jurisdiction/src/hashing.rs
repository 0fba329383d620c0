//! Deterministic content hashing for artifacts and structured records.
//!
//! Every hash in the system is a lowercase hex SHA-256 digest. Structured
//! records are hashed over their canonical JSON encoding: object keys sorted
//! lexicographically at every depth, no insignificant whitespace. Two records
//! that serialize to the same canonical form always hash identically.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Error types for canonical encoding.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// The value could not be encoded as JSON
    #[error("Canonical encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A string did not have the shape of a SHA-256 hex digest
    #[error("Malformed content hash: {0}")]
    MalformedHash(String),
}

/// A SHA-256 digest rendered as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Length of a hex-encoded SHA-256 digest.
    pub const HEX_LEN: usize = 64;

    /// Parse a hex digest, rejecting anything that is not 64 lowercase hex chars.
    pub fn parse(value: impl Into<String>) -> Result<Self, HashError> {
        let value = value.into();
        let well_formed = value.len() == Self::HEX_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(value))
        } else {
            Err(HashError::MalformedHash(value))
        }
    }

    /// The hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for logs and headings.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Compute the SHA-256 hash of raw bytes.
pub fn hash_bytes(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    ContentHash(hex::encode(hasher.finalize()))
}

/// Encode a value as canonical JSON bytes.
///
/// Values are routed through `serde_json::Value`, whose object map is
/// ordered by key, so struct field order and map insertion order never leak
/// into the encoding.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    let tree = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&tree)?)
}

/// Hash the canonical JSON encoding of a value.
pub fn hash_canonical<T: Serialize + ?Sized>(value: &T) -> Result<ContentHash, HashError> {
    Ok(hash_bytes(&canonical_json(value)?))
}

/// Digest linking a ledger entry to its predecessor.
///
/// The first entry of a chain links to `None`, encoded as an empty prefix.
pub fn chain_digest(previous: Option<&ContentHash>, payload: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    if let Some(prev) = previous {
        hasher.update(prev.as_str().as_bytes());
    }
    hasher.update(b"\n");
    hasher.update(payload);
    ContentHash(hex::encode(hasher.finalize()))
}

/// Hash an ordered sequence of digests, newline separated.
///
/// Hex digests have a fixed width, so the joined form is unambiguous.
pub fn hash_sequence<'a, I>(parts: I) -> ContentHash
where
    I: IntoIterator<Item = &'a ContentHash>,
{
    let mut hasher = Sha256::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(part.as_str().as_bytes());
    }
    ContentHash(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_hash_bytes() {
        let hash1 = hash_bytes(b"hello");
        let hash2 = hash_bytes(b"hello");
        let hash3 = hash_bytes(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.as_str().len(), ContentHash::HEX_LEN);
        assert_eq!(
            hash1.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_canonical_json_ignores_insertion_order() {
        let mut a = HashMap::new();
        a.insert("zeta", 1);
        a.insert("alpha", 2);
        let mut b = HashMap::new();
        b.insert("alpha", 2);
        b.insert("zeta", 1);

        let encoded = canonical_json(&a).unwrap();
        assert_eq!(encoded, br#"{"alpha":2,"zeta":1}"#.to_vec());
        assert_eq!(hash_canonical(&a).unwrap(), hash_canonical(&b).unwrap());
    }

    #[test]
    fn test_content_hash_parse() {
        let good = hash_bytes(b"x");
        assert!(ContentHash::parse(good.as_str()).is_ok());
        assert!(ContentHash::parse("abc").is_err());
        assert!(ContentHash::parse(good.as_str().to_uppercase()).is_err());

        let json = serde_json::to_string(&good).unwrap();
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, good);
        assert!(serde_json::from_str::<ContentHash>("\"not-a-hash\"").is_err());
    }

    #[test]
    fn test_chain_digest_binds_predecessor() {
        let first = chain_digest(None, b"entry");
        let second_a = chain_digest(Some(&first), b"entry");
        let second_b = chain_digest(Some(&hash_bytes(b"other")), b"entry");

        assert_ne!(first, second_a);
        assert_ne!(second_a, second_b);
    }

    #[test]
    fn test_hash_sequence_is_order_sensitive() {
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        assert_ne!(hash_sequence([&a, &b]), hash_sequence([&b, &a]));
        assert_eq!(hash_sequence([&a, &b]), hash_sequence(vec![&a, &b]));
    }
}
