//! Case storage.
//!
//! A case exclusively owns its artifacts, rulesets, reports and audit
//! packets. Every write happens inside one critical section, so the
//! active-ruleset pointer, the latest-report pointer and the packet for a
//! report are never observed half-updated.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use forensics::{Artifact, ForensicsRun};
use jurisdiction::Ruleset;

use crate::audit::AuditPacket;
use crate::report::Report;

/// Error types for storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An artifact with the same id is already stored
    #[error("Artifact {0} already stored")]
    DuplicateArtifact(Uuid),

    /// The report does not supersede the current latest report
    #[error("Stale report for case {case_id}: supersedes {supersedes:?}, latest is {latest:?}")]
    StaleReport {
        case_id: String,
        supersedes: Option<Uuid>,
        latest: Option<Uuid>,
    },

    /// Packet and report do not belong together
    #[error("Audit packet {packet_id} does not reference report {report_id}")]
    PacketMismatch { packet_id: Uuid, report_id: Uuid },
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage seam for case state.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Append artifacts in upload order.
    async fn append_artifacts(&self, case_id: &str, artifacts: Vec<Artifact>) -> Result<()>;

    /// Artifacts in upload order.
    async fn artifacts(&self, case_id: &str) -> Vec<Artifact>;

    /// Store a ruleset, assign the next version and make it active.
    /// Returns the stored ruleset.
    async fn attach_ruleset(&self, case_id: &str, ruleset: Ruleset) -> Result<Ruleset>;

    async fn active_ruleset(&self, case_id: &str) -> Option<Ruleset>;

    /// Every ruleset ever attached, oldest first.
    async fn rulesets(&self, case_id: &str) -> Vec<Ruleset>;

    /// Keep the most recent forensics run for inspection.
    async fn record_forensics(&self, case_id: &str, run: ForensicsRun) -> Result<()>;

    async fn last_forensics(&self, case_id: &str) -> Option<ForensicsRun>;

    /// Store a report and its packet together and move the latest pointer.
    ///
    /// Fails without writing anything unless `report.supersedes` names the
    /// current latest report.
    async fn commit_report(&self, report: Report, packet: AuditPacket) -> Result<()>;

    async fn latest_report(&self, case_id: &str) -> Option<Report>;

    /// Every report for the case, oldest first.
    async fn report_history(&self, case_id: &str) -> Vec<Report>;

    async fn audit_packet(&self, report_id: Uuid) -> Option<AuditPacket>;
}

#[derive(Debug, Default)]
struct CaseState {
    artifacts: Vec<Artifact>,
    rulesets: Vec<Ruleset>,
    active_ruleset: Option<usize>,
    forensics: Option<ForensicsRun>,
    reports: Vec<Report>,
    latest_report: Option<usize>,
}

#[derive(Debug, Default)]
struct StoreState {
    cases: HashMap<String, CaseState>,
    packets: HashMap<Uuid, AuditPacket>,
}

/// In-memory store behind a single async lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaseStore for InMemoryStore {
    async fn append_artifacts(&self, case_id: &str, artifacts: Vec<Artifact>) -> Result<()> {
        let mut state = self.state.write().await;
        let case = state.cases.entry(case_id.to_string()).or_default();

        for (i, artifact) in artifacts.iter().enumerate() {
            let seen = case.artifacts.iter().chain(&artifacts[..i]).any(|a| a.id == artifact.id);
            if seen {
                return Err(StoreError::DuplicateArtifact(artifact.id));
            }
        }

        debug!(case_id = %case_id, count = artifacts.len(), "Stored artifacts");
        case.artifacts.extend(artifacts);
        Ok(())
    }

    async fn artifacts(&self, case_id: &str) -> Vec<Artifact> {
        let state = self.state.read().await;
        state
            .cases
            .get(case_id)
            .map(|c| c.artifacts.clone())
            .unwrap_or_default()
    }

    async fn attach_ruleset(&self, case_id: &str, mut ruleset: Ruleset) -> Result<Ruleset> {
        let mut state = self.state.write().await;
        let case = state.cases.entry(case_id.to_string()).or_default();

        ruleset.version = case.rulesets.last().map(|r| r.version + 1).unwrap_or(1);
        case.rulesets.push(ruleset.clone());
        case.active_ruleset = Some(case.rulesets.len() - 1);

        info!(
            case_id = %case_id,
            version = ruleset.version,
            hash = %ruleset.content_hash.short(),
            "Ruleset attached"
        );
        Ok(ruleset)
    }

    async fn active_ruleset(&self, case_id: &str) -> Option<Ruleset> {
        let state = self.state.read().await;
        let case = state.cases.get(case_id)?;
        case.active_ruleset.and_then(|i| case.rulesets.get(i)).cloned()
    }

    async fn rulesets(&self, case_id: &str) -> Vec<Ruleset> {
        let state = self.state.read().await;
        state
            .cases
            .get(case_id)
            .map(|c| c.rulesets.clone())
            .unwrap_or_default()
    }

    async fn record_forensics(&self, case_id: &str, run: ForensicsRun) -> Result<()> {
        let mut state = self.state.write().await;
        state.cases.entry(case_id.to_string()).or_default().forensics = Some(run);
        Ok(())
    }

    async fn last_forensics(&self, case_id: &str) -> Option<ForensicsRun> {
        let state = self.state.read().await;
        state.cases.get(case_id).and_then(|c| c.forensics.clone())
    }

    async fn commit_report(&self, report: Report, packet: AuditPacket) -> Result<()> {
        if packet.report_id != report.id {
            return Err(StoreError::PacketMismatch {
                packet_id: packet.id,
                report_id: report.id,
            });
        }

        let mut state = self.state.write().await;
        let StoreState { cases, packets } = &mut *state;
        let case = cases.entry(report.case_id.clone()).or_default();

        let latest = case
            .latest_report
            .and_then(|i| case.reports.get(i))
            .map(|r| r.id);
        if report.supersedes != latest {
            return Err(StoreError::StaleReport {
                case_id: report.case_id.clone(),
                supersedes: report.supersedes,
                latest,
            });
        }

        info!(
            case_id = %report.case_id,
            report_id = %report.id,
            packet_id = %packet.id,
            aggregate = %packet.aggregate_digest.short(),
            "Report committed"
        );
        packets.insert(packet.report_id, packet);
        case.reports.push(report);
        case.latest_report = Some(case.reports.len() - 1);
        Ok(())
    }

    async fn latest_report(&self, case_id: &str) -> Option<Report> {
        let state = self.state.read().await;
        let case = state.cases.get(case_id)?;
        case.latest_report.and_then(|i| case.reports.get(i)).cloned()
    }

    async fn report_history(&self, case_id: &str) -> Vec<Report> {
        let state = self.state.read().await;
        state
            .cases
            .get(case_id)
            .map(|c| c.reports.clone())
            .unwrap_or_default()
    }

    async fn audit_packet(&self, report_id: Uuid) -> Option<AuditPacket> {
        let state = self.state.read().await;
        state.packets.get(&report_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forensics::ArtifactKind;
    use jurisdiction::hashing::hash_bytes;
    use jurisdiction::{PlatformSpec, RulesEngine, RulesetInputs};

    use crate::report::TEMPLATE_VERSION;

    fn ruleset() -> Ruleset {
        let inputs = RulesetInputs::new("US-ABA").with_platform(PlatformSpec::public("X"));
        let compiled = RulesEngine::new().compile(&inputs).unwrap();
        Ruleset::new(inputs, &compiled, 0, Utc::now()).unwrap()
    }

    fn report(case_id: &str, supersedes: Option<Uuid>) -> (Report, AuditPacket) {
        let rendered = format!("# {case_id} {}", Uuid::new_v4());
        let report = Report {
            id: Uuid::new_v4(),
            case_id: case_id.to_string(),
            template_version: TEMPLATE_VERSION.to_string(),
            sections: Vec::new(),
            content_hash: hash_bytes(rendered.as_bytes()),
            rendered,
            ruleset_hash: hash_bytes(b"ruleset"),
            created_at: Utc::now(),
            supersedes,
        };
        let packet = AuditPacket::build(&report, Vec::new(), Utc::now());
        (report, packet)
    }

    #[tokio::test]
    async fn test_ruleset_versions_and_active_pointer() {
        let store = InMemoryStore::new();
        let first = store.attach_ruleset("c1", ruleset()).await.unwrap();
        let second = store.attach_ruleset("c1", ruleset()).await.unwrap();
        let other = store.attach_ruleset("c2", ruleset()).await.unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(other.version, 1);
        assert_eq!(store.active_ruleset("c1").await.unwrap().id, second.id);
        assert_eq!(store.rulesets("c1").await.len(), 2);
        assert!(store.active_ruleset("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_artifacts_keep_upload_order() {
        let store = InMemoryStore::new();
        let a = Artifact::new(ArtifactKind::Transcript, "a", "a.txt", Utc::now());
        let b = Artifact::new(ArtifactKind::Venue, "b", "b.json", Utc::now());
        store.append_artifacts("c1", vec![a.clone()]).await.unwrap();
        store.append_artifacts("c1", vec![b.clone()]).await.unwrap();

        let ids: Vec<Uuid> = store.artifacts("c1").await.iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);

        let err = store.append_artifacts("c1", vec![a]).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateArtifact(_)));
    }

    #[tokio::test]
    async fn test_commit_supersedes_and_keeps_history() {
        let store = InMemoryStore::new();
        let (first, first_packet) = report("c1", None);
        store.commit_report(first.clone(), first_packet).await.unwrap();

        let (second, second_packet) = report("c1", Some(first.id));
        store.commit_report(second.clone(), second_packet).await.unwrap();

        assert_eq!(store.latest_report("c1").await.unwrap().id, second.id);
        let history: Vec<Uuid> = store.report_history("c1").await.iter().map(|r| r.id).collect();
        assert_eq!(history, vec![first.id, second.id]);
        assert!(store.audit_packet(first.id).await.is_some());
        assert!(store.audit_packet(second.id).await.is_some());
    }

    #[tokio::test]
    async fn test_stale_commit_writes_nothing() {
        let store = InMemoryStore::new();
        let (first, first_packet) = report("c1", None);
        store.commit_report(first.clone(), first_packet).await.unwrap();

        let (stale, stale_packet) = report("c1", None);
        let err = store.commit_report(stale.clone(), stale_packet).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleReport { .. }));
        assert_eq!(store.report_history("c1").await.len(), 1);
        assert!(store.audit_packet(stale.id).await.is_none());
    }

    #[tokio::test]
    async fn test_packet_must_match_report() {
        let store = InMemoryStore::new();
        let (report_a, _) = report("c1", None);
        let (_, packet_b) = report("c1", None);
        let err = store.commit_report(report_a, packet_b).await.unwrap_err();
        assert!(matches!(err, StoreError::PacketMismatch { .. }));
        assert!(store.latest_report("c1").await.is_none());
    }
}
