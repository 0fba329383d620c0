//! Audit packets.
//!
//! A packet binds one report to the exact ruleset and inputs that produced
//! it. The aggregate digest is SHA-256 over, in order, the ruleset hash, each
//! input hash in upload order and the report hash, newline separated. Anyone
//! holding the same files can recompute it without this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use jurisdiction::hashing::{canonical_json, hash_bytes, hash_sequence, ContentHash, HashError};

use crate::report::Report;

/// Error types for audit verification.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The stored aggregate does not match the recorded hashes
    #[error("Aggregate digest mismatch: recorded {recorded}, recomputed {recomputed}")]
    AggregateMismatch {
        recorded: ContentHash,
        recomputed: ContentHash,
    },

    /// A supplied input does not hash to the recorded value
    #[error("Input {index} hashes to {found}, packet records {expected}")]
    InputMismatch {
        index: usize,
        expected: ContentHash,
        found: ContentHash,
    },

    /// A different number of inputs was supplied
    #[error("Packet records {expected} inputs, {found} supplied")]
    InputCount { expected: usize, found: usize },

    /// The supplied report does not hash to the recorded value
    #[error("Report hashes to {found}, packet records {expected}")]
    ReportMismatch {
        expected: ContentHash,
        found: ContentHash,
    },

    /// Encoding error
    #[error(transparent)]
    Hashing(#[from] HashError),
}

/// Result type for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Proof of exactly which ruleset and inputs produced a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPacket {
    pub id: Uuid,
    pub case_id: String,
    pub report_id: Uuid,
    pub ruleset_hash: ContentHash,
    /// Artifact hashes in upload order
    pub input_hashes: Vec<ContentHash>,
    pub report_hash: ContentHash,
    pub template_version: String,
    pub aggregate_digest: ContentHash,
    pub created_at: DateTime<Utc>,
}

impl AuditPacket {
    /// Build the packet for a report.
    pub fn build(report: &Report, input_hashes: Vec<ContentHash>, created_at: DateTime<Utc>) -> Self {
        let aggregate_digest = aggregate(&report.ruleset_hash, &input_hashes, &report.content_hash);
        Self {
            id: Uuid::new_v4(),
            case_id: report.case_id.clone(),
            report_id: report.id,
            ruleset_hash: report.ruleset_hash.clone(),
            input_hashes,
            report_hash: report.content_hash.clone(),
            template_version: report.template_version.clone(),
            aggregate_digest,
            created_at,
        }
    }

    /// Recompute the aggregate from the recorded hashes.
    pub fn verify(&self) -> Result<()> {
        let recomputed = aggregate(&self.ruleset_hash, &self.input_hashes, &self.report_hash);
        if recomputed != self.aggregate_digest {
            return Err(AuditError::AggregateMismatch {
                recorded: self.aggregate_digest.clone(),
                recomputed,
            });
        }
        Ok(())
    }

    /// Check raw input contents, in upload order, against the packet.
    pub fn verify_inputs<B: AsRef<[u8]>>(&self, contents: &[B]) -> Result<()> {
        if contents.len() != self.input_hashes.len() {
            return Err(AuditError::InputCount {
                expected: self.input_hashes.len(),
                found: contents.len(),
            });
        }
        for (index, (content, expected)) in contents.iter().zip(&self.input_hashes).enumerate() {
            let found = hash_bytes(content.as_ref());
            if &found != expected {
                return Err(AuditError::InputMismatch {
                    index,
                    expected: expected.clone(),
                    found,
                });
            }
        }
        Ok(())
    }

    /// Check rendered report bytes against the packet.
    pub fn verify_report(&self, rendered: &[u8]) -> Result<()> {
        let found = hash_bytes(rendered);
        if found != self.report_hash {
            return Err(AuditError::ReportMismatch {
                expected: self.report_hash.clone(),
                found,
            });
        }
        Ok(())
    }

    /// Canonical JSON manifest for export.
    pub fn manifest(&self) -> Result<Vec<u8>> {
        Ok(canonical_json(self)?)
    }
}

/// The aggregate digest over a ruleset, inputs and report.
pub fn aggregate(ruleset: &ContentHash, inputs: &[ContentHash], report: &ContentHash) -> ContentHash {
    hash_sequence(std::iter::once(ruleset).chain(inputs).chain(std::iter::once(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::TEMPLATE_VERSION;

    // Hex digests joined by newlines, hashed once
    fn digest_of(parts: &[&ContentHash]) -> ContentHash {
        let joined: Vec<&str> = parts.iter().map(|h| h.as_str()).collect();
        hash_bytes(joined.join("\n").as_bytes())
    }

    fn report(rendered: &str) -> Report {
        Report {
            id: Uuid::new_v4(),
            case_id: "case-1".to_string(),
            template_version: TEMPLATE_VERSION.to_string(),
            sections: Vec::new(),
            rendered: rendered.to_string(),
            content_hash: hash_bytes(rendered.as_bytes()),
            ruleset_hash: hash_bytes(b"ruleset"),
            created_at: Utc::now(),
            supersedes: None,
        }
    }

    #[test]
    fn test_aggregate_is_reproducible_externally() {
        let report = report("# Report");
        let inputs = vec![hash_bytes(b"transcript"), hash_bytes(b"venue")];
        let packet = AuditPacket::build(&report, inputs.clone(), Utc::now());

        let expected = digest_of(&[&report.ruleset_hash, &inputs[0], &inputs[1], &report.content_hash]);
        assert_eq!(packet.aggregate_digest, expected);
        packet.verify().unwrap();
    }

    #[test]
    fn test_input_order_matters() {
        let report = report("# Report");
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        let forward = AuditPacket::build(&report, vec![a.clone(), b.clone()], Utc::now());
        let reverse = AuditPacket::build(&report, vec![b, a], Utc::now());
        assert_ne!(forward.aggregate_digest, reverse.aggregate_digest);
    }

    #[test]
    fn test_tampered_packet_fails() {
        let mut packet = AuditPacket::build(&report("# Report"), vec![hash_bytes(b"a")], Utc::now());
        packet.input_hashes[0] = hash_bytes(b"b");
        assert!(matches!(packet.verify(), Err(AuditError::AggregateMismatch { .. })));
    }

    #[test]
    fn test_verify_inputs_and_report() {
        let report = report("# Report");
        let packet = AuditPacket::build(
            &report,
            vec![hash_bytes(b"one"), hash_bytes(b"two")],
            Utc::now(),
        );

        packet.verify_inputs(&[b"one".as_slice(), b"two".as_slice()]).unwrap();
        assert!(matches!(
            packet.verify_inputs(&[b"two".as_slice(), b"one".as_slice()]),
            Err(AuditError::InputMismatch { index: 0, .. })
        ));
        assert!(matches!(
            packet.verify_inputs(&[b"one".as_slice()]),
            Err(AuditError::InputCount { expected: 2, found: 1 })
        ));

        packet.verify_report(b"# Report").unwrap();
        assert!(packet.verify_report(b"# Edited").is_err());
    }

    #[test]
    fn test_manifest_is_canonical() {
        let packet = AuditPacket::build(&report("# Report"), vec![], Utc::now());
        let manifest = packet.manifest().unwrap();
        let text = String::from_utf8(manifest).unwrap();
        assert!(text.starts_with("{\"aggregate_digest\":"));
        let back: AuditPacket = serde_json::from_str(&text).unwrap();
        assert_eq!(back, packet);
    }
}
