//! Immutable ruleset records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clauses::ClauseMatch;
use crate::engine::{CompiledRules, RulesetInputs};
use crate::hashing::{hash_canonical, ContentHash, HashError};
use crate::matrix::PermissionMatrix;
use crate::types::{Action, Decision};

/// A compiled ruleset attached to a case.
///
/// The content hash covers the inputs and the compiled matrix only, so two
/// rulesets compiled from the same inputs carry the same hash regardless of
/// when or in which case they were created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    /// Unique identifier
    pub id: Uuid,
    /// Per-case version, starting at 1
    pub version: u64,
    /// What the matrix was compiled from
    pub inputs: RulesetInputs,
    /// The enforceable matrix
    pub matrix: PermissionMatrix,
    /// Standing-order clauses that tightened the matrix
    pub matched_clauses: Vec<ClauseMatch>,
    /// SHA-256 over the canonical (inputs, matrix) pair
    pub content_hash: ContentHash,
    /// When the ruleset was created
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct HashedContent<'a> {
    inputs: &'a RulesetInputs,
    matrix: &'a PermissionMatrix,
}

impl Ruleset {
    /// Build a ruleset record from a compilation.
    pub fn new(
        inputs: RulesetInputs,
        compiled: &CompiledRules,
        version: u64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, HashError> {
        let content_hash = Self::hash_content(&inputs, &compiled.matrix)?;
        Ok(Self {
            id: Uuid::new_v4(),
            version,
            inputs,
            matrix: compiled.matrix.clone(),
            matched_clauses: compiled.matched_clauses.clone(),
            content_hash,
            created_at,
        })
    }

    fn hash_content(inputs: &RulesetInputs, matrix: &PermissionMatrix) -> Result<ContentHash, HashError> {
        hash_canonical(&HashedContent { inputs, matrix })
    }

    /// Recompute the content hash and compare with the stored one.
    pub fn verify(&self) -> Result<bool, HashError> {
        Ok(Self::hash_content(&self.inputs, &self.matrix)? == self.content_hash)
    }

    /// Evaluate a cell under this ruleset.
    pub fn evaluate(&self, platform: &str, action: Action) -> Decision {
        self.matrix.evaluate(platform, action)
    }
}
