//! Forensics ledgers and the convergence snapshot.
//!
//! Every ledger is append-only. The evidence view is derived state kept in a
//! sorted map next to the hash-chained update log it is built from; it is
//! never pruned.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use jurisdiction::hashing::{hash_canonical, ContentHash, HashError};

use crate::chain::{ChainError, HashChain};
use crate::event::{Phase, ProcessEvent};
use crate::types::Tick;

/// An authority assertion as recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityEntry {
    pub at: Tick,
    pub sequence: usize,
    pub excerpt: String,
}

/// One evidence reference as recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceUpdate {
    pub at: Tick,
    pub sequence: usize,
    pub evidence_id: String,
    pub resolution: bool,
}

/// Current state of one evidence item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceLedgerEntry {
    pub evidence_id: String,
    pub first_reference: Tick,
    pub last_reference: Tick,
    pub reference_count: u64,
    pub resolved: bool,
}

/// Count of open disagreement markers after a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DissentSample {
    pub at: Tick,
    pub open_markers: usize,
}

/// A phase change in the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub at: Tick,
    pub sequence: usize,
    pub from: Phase,
    pub to: Phase,
}

/// A disclosure as recorded: label, question and verbatim statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureEntry {
    pub at: Tick,
    pub sequence: usize,
    pub subject_label: String,
    pub question_id: Option<String>,
    pub statement: String,
}

/// All ledgers of a forensics run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledgers {
    pub timeline: HashChain<PhaseTransition>,
    pub authority: HashChain<AuthorityEntry>,
    pub evidence_updates: HashChain<EvidenceUpdate>,
    pub evidence: BTreeMap<String, EvidenceLedgerEntry>,
    pub dissent: HashChain<DissentSample>,
    pub open_disagreements: BTreeSet<String>,
    pub disclosures: HashChain<DisclosureEntry>,
}

impl Ledgers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transition(
        &mut self,
        event: &ProcessEvent,
        from: Phase,
        to: Phase,
    ) -> Result<(), HashError> {
        self.timeline.append(PhaseTransition {
            at: event.timestamp,
            sequence: event.sequence,
            from,
            to,
        })?;
        Ok(())
    }

    pub fn record_authority(&mut self, event: &ProcessEvent, excerpt: String) -> Result<(), HashError> {
        self.authority.append(AuthorityEntry {
            at: event.timestamp,
            sequence: event.sequence,
            excerpt,
        })?;
        Ok(())
    }

    /// Record a reference, updating the evidence view.
    pub fn record_evidence(
        &mut self,
        event: &ProcessEvent,
        evidence_id: &str,
        resolution: bool,
    ) -> Result<(), HashError> {
        self.evidence_updates.append(EvidenceUpdate {
            at: event.timestamp,
            sequence: event.sequence,
            evidence_id: evidence_id.to_string(),
            resolution,
        })?;

        let entry = self
            .evidence
            .entry(evidence_id.to_string())
            .or_insert_with(|| EvidenceLedgerEntry {
                evidence_id: evidence_id.to_string(),
                first_reference: event.timestamp,
                last_reference: event.timestamp,
                reference_count: 0,
                resolved: false,
            });
        entry.last_reference = event.timestamp;
        entry.reference_count += 1;
        entry.resolved |= resolution;
        Ok(())
    }

    /// Open or close a disagreement marker. A sample is taken only when the
    /// open set actually changes; returns whether it did.
    pub fn record_marker(
        &mut self,
        event: &ProcessEvent,
        marker_id: &str,
        open: bool,
    ) -> Result<bool, HashError> {
        let changed = if open {
            self.open_disagreements.insert(marker_id.to_string())
        } else {
            self.open_disagreements.remove(marker_id)
        };
        if changed {
            self.dissent.append(DissentSample {
                at: event.timestamp,
                open_markers: self.open_disagreements.len(),
            })?;
        }
        Ok(changed)
    }

    pub fn record_disclosure(
        &mut self,
        event: &ProcessEvent,
        subject_label: &str,
        question_id: Option<&str>,
        statement: &str,
    ) -> Result<(), HashError> {
        self.disclosures.append(DisclosureEntry {
            at: event.timestamp,
            sequence: event.sequence,
            subject_label: subject_label.to_string(),
            question_id: question_id.map(str::to_string),
            statement: statement.to_string(),
        })?;
        Ok(())
    }

    /// Evidence items without a resolution, ordered by id.
    pub fn unresolved(&self) -> impl Iterator<Item = &EvidenceLedgerEntry> {
        self.evidence.values().filter(|e| !e.resolved)
    }

    /// Digest of the canonical encoding of every ledger.
    pub fn digest(&self) -> Result<ContentHash, HashError> {
        hash_canonical(self)
    }

    /// Verify every hash chain.
    pub fn verify(&self) -> Result<(), ChainError> {
        self.timeline.verify()?;
        self.authority.verify()?;
        self.evidence_updates.verify()?;
        self.dissent.verify()?;
        self.disclosures.verify()
    }
}

/// Ledgers frozen when the convergence marker was processed.
///
/// Constructed once and never mutated; the kernel only holds it by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceSnapshot {
    pub taken_at: Tick,
    pub trigger_sequence: usize,
    ledgers: Ledgers,
    digest: ContentHash,
}

impl ConvergenceSnapshot {
    pub(crate) fn capture(ledgers: &Ledgers, event: &ProcessEvent) -> Result<Self, HashError> {
        Ok(Self {
            taken_at: event.timestamp,
            trigger_sequence: event.sequence,
            ledgers: ledgers.clone(),
            digest: ledgers.digest()?,
        })
    }

    pub fn ledgers(&self) -> &Ledgers {
        &self.ledgers
    }

    pub fn digest(&self) -> &ContentHash {
        &self.digest
    }

    /// Recompute the digest over the frozen ledgers.
    pub fn verify(&self) -> Result<bool, HashError> {
        Ok(self.ledgers.digest()? == self.digest)
    }
}

/// Why a post-snapshot event went to the amendment log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AmendmentReason {
    /// The event asked for a phase the run has already left
    PhaseReentry { current: Phase, attempted: Phase },
    /// A second convergence marker
    RepeatedConvergence,
    /// The event touches an evidence item present in the snapshot
    EvidenceRevision { evidence_id: String },
    /// The event closes a disagreement that was open in the snapshot
    DissentRevision { marker_id: String },
}

/// An entry in the post-convergence amendment log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    pub at: Tick,
    pub reason: AmendmentReason,
    pub event: ProcessEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use crate::event::{EventPayload, EventSource, PhaseMarker};
    use uuid::Uuid;

    fn event(sequence: usize, timestamp: Tick) -> ProcessEvent {
        ProcessEvent {
            sequence,
            timestamp,
            source: EventSource {
                artifact_id: Uuid::nil(),
                artifact_kind: ArtifactKind::Transcript,
                platform: None,
                line: None,
            },
            payload: EventPayload::PhaseMarker {
                marker: PhaseMarker::Discussion,
            },
        }
    }

    #[test]
    fn test_evidence_decay_tracking() {
        let mut ledgers = Ledgers::new();
        ledgers.record_evidence(&event(0, 10), "exhibit 4", false).unwrap();
        ledgers.record_evidence(&event(1, 30), "exhibit 4", false).unwrap();
        ledgers.record_evidence(&event(2, 40), "exhibit 7", false).unwrap();
        ledgers.record_evidence(&event(3, 50), "exhibit 7", true).unwrap();

        let e4 = &ledgers.evidence["exhibit 4"];
        assert_eq!((e4.first_reference, e4.last_reference, e4.reference_count), (10, 30, 2));

        let unresolved: Vec<&str> = ledgers.unresolved().map(|e| e.evidence_id.as_str()).collect();
        assert_eq!(unresolved, vec!["exhibit 4"]);
        assert_eq!(ledgers.evidence_updates.len(), 4);
    }

    #[test]
    fn test_dissent_samples_only_on_change() {
        let mut ledgers = Ledgers::new();
        assert!(ledgers.record_marker(&event(0, 1), "d1", true).unwrap());
        assert!(!ledgers.record_marker(&event(1, 2), "d1", true).unwrap());
        assert!(ledgers.record_marker(&event(2, 3), "d2", true).unwrap());
        assert!(ledgers.record_marker(&event(3, 4), "d1", false).unwrap());
        assert!(!ledgers.record_marker(&event(4, 5), "unknown", false).unwrap());

        let counts: Vec<usize> = ledgers.dissent.iter().map(|s| s.open_markers).collect();
        assert_eq!(counts, vec![1, 2, 1]);
    }

    #[test]
    fn test_snapshot_digest_verifies() {
        let mut ledgers = Ledgers::new();
        ledgers.record_authority(&event(0, 1), "The judge said".to_string()).unwrap();
        let snapshot = ConvergenceSnapshot::capture(&ledgers, &event(1, 2)).unwrap();
        assert!(snapshot.verify().unwrap());
        assert_eq!(snapshot.digest(), &ledgers.digest().unwrap());

        ledgers.record_authority(&event(2, 3), "later".to_string()).unwrap();
        assert_ne!(snapshot.digest(), &ledgers.digest().unwrap());
        assert!(ledgers.verify().is_ok());
    }
}
