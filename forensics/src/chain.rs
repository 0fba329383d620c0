//! Append-only hash chains.
//!
//! Each entry's digest binds its index, its payload and the previous entry's
//! digest, so editing, dropping or reordering any entry breaks verification
//! from that point on.

use serde::{Deserialize, Serialize};

use jurisdiction::hashing::{canonical_json, chain_digest, ContentHash, HashError};

/// A chain entry failed verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("entry {index} has index {found}")]
    IndexMismatch { index: usize, found: u64 },

    #[error("entry {index} does not link to its predecessor")]
    BrokenLink { index: usize },

    #[error("entry {index} digest does not match its content")]
    DigestMismatch { index: usize },

    #[error("entry {index} could not be encoded: {detail}")]
    Encoding { index: usize, detail: String },
}

/// One link in a [`HashChain`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry<T> {
    pub index: u64,
    pub payload: T,
    pub prev: Option<ContentHash>,
    pub digest: ContentHash,
}

#[derive(Serialize)]
struct Link<'a, T> {
    index: u64,
    payload: &'a T,
}

fn link_digest<T: Serialize>(
    index: u64,
    payload: &T,
    prev: Option<&ContentHash>,
) -> Result<ContentHash, HashError> {
    let bytes = canonical_json(&Link { index, payload })?;
    Ok(chain_digest(prev, &bytes))
}

/// Append-only, hash-linked sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashChain<T> {
    entries: Vec<ChainEntry<T>>,
}

impl<T> Default for HashChain<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Serialize> HashChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload and return its digest.
    pub fn append(&mut self, payload: T) -> Result<ContentHash, HashError> {
        let index = self.entries.len() as u64;
        let prev = self.head().cloned();
        let digest = link_digest(index, &payload, prev.as_ref())?;
        self.entries.push(ChainEntry {
            index,
            payload,
            prev,
            digest: digest.clone(),
        });
        Ok(digest)
    }

    /// Digest of the last entry.
    pub fn head(&self) -> Option<&ContentHash> {
        self.entries.last().map(|e| &e.digest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChainEntry<T>] {
        &self.entries
    }

    /// Payloads in append order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.payload)
    }

    /// Recompute every link.
    pub fn verify(&self) -> Result<(), ChainError> {
        let mut prev: Option<&ContentHash> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.index != index as u64 {
                return Err(ChainError::IndexMismatch {
                    index,
                    found: entry.index,
                });
            }
            if entry.prev.as_ref() != prev {
                return Err(ChainError::BrokenLink { index });
            }
            let expected = link_digest(entry.index, &entry.payload, prev).map_err(|e| {
                ChainError::Encoding {
                    index,
                    detail: e.to_string(),
                }
            })?;
            if expected != entry.digest {
                return Err(ChainError::DigestMismatch { index });
            }
            prev = Some(&entry.digest);
        }
        Ok(())
    }
}
