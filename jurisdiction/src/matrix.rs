//! The compiled permission matrix.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hashing::{hash_canonical, ContentHash, HashError};
use crate::types::{platform_key, Action, Decision};

/// A hard-blocked cell found holding something other than Blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardBlockBreach {
    pub platform: String,
    pub action: Action,
    pub found: Decision,
}

/// Mapping from (platform, action) to a [`Decision`].
///
/// Cells are keyed by normalised platform name and stored in ordered maps so
/// the serialized form is canonical. A matrix can only be produced by the
/// rules engine or by deserializing one; both paths check the hard-block
/// invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix")]
pub struct PermissionMatrix {
    cells: BTreeMap<String, BTreeMap<Action, Decision>>,
}

#[derive(Deserialize)]
struct RawMatrix {
    cells: BTreeMap<String, BTreeMap<Action, Decision>>,
}

impl TryFrom<RawMatrix> for PermissionMatrix {
    type Error = String;

    fn try_from(raw: RawMatrix) -> Result<Self, Self::Error> {
        let matrix = PermissionMatrix { cells: raw.cells };
        match matrix.hard_block_breaches().first() {
            Some(breach) => Err(format!(
                "hard-blocked cell ({}, {}) holds {}",
                breach.platform, breach.action, breach.found
            )),
            None => Ok(matrix),
        }
    }
}

impl PermissionMatrix {
    pub(crate) fn empty() -> Self {
        Self {
            cells: BTreeMap::new(),
        }
    }

    /// Pure lookup. Any cell that is not present is Blocked.
    pub fn evaluate(&self, platform: &str, action: Action) -> Decision {
        self.cells
            .get(&platform_key(platform))
            .and_then(|row| row.get(&action))
            .copied()
            .unwrap_or(Decision::Blocked)
    }

    /// Platform keys in the matrix.
    pub fn platforms(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(|k| k.as_str())
    }

    /// Whether the matrix has a row for this platform.
    pub fn contains_platform(&self, platform: &str) -> bool {
        self.cells.contains_key(&platform_key(platform))
    }

    /// Iterate every cell in canonical order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, Action, Decision)> {
        self.cells.iter().flat_map(|(platform, row)| {
            row.iter()
                .map(move |(action, decision)| (platform.as_str(), *action, *decision))
        })
    }

    /// Content hash of the canonical encoding.
    pub fn content_hash(&self) -> Result<ContentHash, HashError> {
        hash_canonical(self)
    }

    pub(crate) fn set(&mut self, platform_key: &str, action: Action, decision: Decision) {
        self.cells
            .entry(platform_key.to_string())
            .or_default()
            .insert(action, decision);
    }

    /// Tighten a cell, returning the resulting decision.
    pub(crate) fn tighten(&mut self, platform_key: &str, action: Action, to: Decision) -> Decision {
        let cell = self
            .cells
            .entry(platform_key.to_string())
            .or_default()
            .entry(action)
            .or_insert(Decision::Blocked);
        *cell = cell.tighten(to);
        *cell
    }

    pub(crate) fn get_cell(&self, platform_key: &str, action: Action) -> Option<Decision> {
        self.cells.get(platform_key).and_then(|row| row.get(&action)).copied()
    }

    /// Every hard-blocked action that is present and not Blocked.
    ///
    /// Absent cells already evaluate to Blocked and are not breaches.
    pub fn hard_block_breaches(&self) -> Vec<HardBlockBreach> {
        let mut breaches = Vec::new();
        for (platform, row) in &self.cells {
            for action in Action::HARD_BLOCKED {
                if let Some(found) = row.get(&action) {
                    if *found != Decision::Blocked {
                        breaches.push(HardBlockBreach {
                            platform: platform.clone(),
                            action,
                            found: *found,
                        });
                    }
                }
            }
        }
        breaches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PermissionMatrix {
        let mut matrix = PermissionMatrix::empty();
        matrix.set("x", Action::PassiveView, Decision::Allowed);
        matrix.set("x", Action::Message, Decision::Blocked);
        matrix
    }

    #[test]
    fn test_evaluate_fails_closed() {
        let matrix = sample();
        assert_eq!(matrix.evaluate("X", Action::PassiveView), Decision::Allowed);
        assert_eq!(matrix.evaluate("x", Action::Share), Decision::Blocked);
        assert_eq!(matrix.evaluate("unknown", Action::PassiveView), Decision::Blocked);
    }

    #[test]
    fn test_tighten_never_loosens() {
        let mut matrix = sample();
        assert_eq!(
            matrix.tighten("x", Action::PassiveView, Decision::NotificationRisk),
            Decision::NotificationRisk
        );
        assert_eq!(
            matrix.tighten("x", Action::PassiveView, Decision::Allowed),
            Decision::NotificationRisk
        );
    }

    #[test]
    fn test_serialization_is_canonical() {
        let matrix = sample();
        let json = serde_json::to_string(&matrix).unwrap();
        assert_eq!(
            json,
            r#"{"cells":{"x":{"passive_view":"allowed","message":"blocked"}}}"#
        );
        let back: PermissionMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, matrix);
        assert_eq!(back.content_hash().unwrap(), matrix.content_hash().unwrap());
    }

    #[test]
    fn test_deserialize_rejects_hard_block_breach() {
        let tampered = r#"{"cells":{"x":{"message":"allowed"}}}"#;
        let err = serde_json::from_str::<PermissionMatrix>(tampered).unwrap_err();
        assert!(err.to_string().contains("hard-blocked"));
    }
}
