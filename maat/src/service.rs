//! MaatService - main entry point for case operations.
//!
//! Orchestrates ingestion, ruleset attachment, forensics runs and report
//! generation over a [`CaseStore`]. Report runs are exclusive per case and
//! persist nothing until the report and its audit packet commit together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use forensics::{
    analyze, AnalyzerOutputs, Artifact, ArtifactError, ArtifactKind, CancellationToken,
    EventExtractor, ForensicsConfig, ForensicsError, ForensicsKernel, ForensicsRun,
};
use jurisdiction::hashing::hash_bytes;
use jurisdiction::{Action, Decision, HashError, PermissionMatrix, RulesEngine, RulesError, Ruleset, RulesetInputs};

use crate::audit::{AuditError, AuditPacket};
use crate::clock::{Clock, SystemClock};
use crate::config::MaatConfig;
use crate::firewall::{LanguageFirewall, Verdict};
use crate::report::{LocatedViolation, Report, ReportAssembler, ReportHeader};
use crate::store::{CaseStore, InMemoryStore, StoreError};

/// Error types for the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Ruleset compilation failed
    #[error("Rules error: {0}")]
    Rules(#[from] RulesError),

    /// Forensics run failed
    #[error("Forensics error: {0}")]
    Forensics(#[from] ForensicsError),

    /// Store rejected a write
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Audit verification failed
    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    /// Narrative text failed the language firewall; nothing was stored
    #[error("Integrity halt: {} violation(s)", violations.len())]
    IntegrityHalt { violations: Vec<LocatedViolation> },

    /// Another report run holds this case
    #[error("Report run already in progress for case {0}")]
    RunInProgress(String),

    /// The case has no ruleset attached
    #[error("No active ruleset for case {0}")]
    NoActiveRuleset(String),

    /// No report with this id
    #[error("Report not found: {0}")]
    ReportNotFound(Uuid),

    /// Canonical encoding failed
    #[error("Hashing error: {0}")]
    Hashing(#[from] HashError),

    /// A blocking task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// An artifact as delivered by the upload layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactUpload {
    pub kind: ArtifactKind,
    pub content: Vec<u8>,
    pub source: String,
    #[serde(default)]
    pub platform: Option<String>,
    /// Defaults to the service clock when absent
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
}

impl ArtifactUpload {
    pub fn new(kind: ArtifactKind, content: impl Into<Vec<u8>>, source: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            source: source.into(),
            platform: None,
            collected_at: None,
        }
    }

    /// Builder: set the originating platform.
    pub fn on_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }
}

/// A committed report with its packet and the run that produced it.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub report: Report,
    pub packet: AuditPacket,
    pub forensics: ForensicsRun,
}

/// Exclusive report-run slot for one case, released on drop.
#[derive(Debug)]
pub struct RunGuard {
    runs: Arc<DashMap<String, ()>>,
    case_id: String,
}

impl RunGuard {
    pub fn case_id(&self) -> &str {
        &self.case_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs.remove(&self.case_id);
        debug!(case_id = %self.case_id, "Run guard released");
    }
}

/// Main entry point for MAAT case operations.
pub struct MaatService {
    store: Arc<dyn CaseStore>,
    engine: RulesEngine,
    firewall: LanguageFirewall,
    config: MaatConfig,
    clock: Arc<dyn Clock>,
    runs: Arc<DashMap<String, ()>>,
}

impl MaatService {
    /// Create a service over a store.
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self {
            store,
            engine: RulesEngine::new(),
            firewall: LanguageFirewall::new(),
            config: MaatConfig::default(),
            clock: Arc::new(SystemClock::new()),
            runs: Arc::new(DashMap::new()),
        }
    }

    /// Service over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Create with configuration.
    pub fn with_config(mut self, config: MaatConfig) -> Self {
        self.engine = if config.rules.cache_enabled {
            RulesEngine::new()
        } else {
            RulesEngine::new().without_cache()
        };
        self.firewall = LanguageFirewall::new().with_extra_terms(config.firewall.extra_deny_terms.iter().cloned());
        self.config = config;
        self
    }

    /// Use a specific clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MaatConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CaseStore> {
        &self.store
    }

    /// Claim the report-run slot for a case without waiting.
    pub fn try_begin_run(&self, case_id: &str) -> Result<RunGuard> {
        match self.runs.entry(case_id.to_string()) {
            Entry::Occupied(_) => {
                warn!(case_id = %case_id, "Report run rejected: run already in progress");
                Err(ServiceError::RunInProgress(case_id.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(());
                debug!(case_id = %case_id, "Run guard acquired");
                Ok(RunGuard {
                    runs: Arc::clone(&self.runs),
                    case_id: case_id.to_string(),
                })
            }
        }
    }

    /// Ingest one artifact.
    pub async fn ingest_artifact(&self, case_id: &str, upload: ArtifactUpload) -> Result<Artifact> {
        let mut stored = self.ingest_artifacts(case_id, vec![upload]).await?;
        stored
            .pop()
            .ok_or_else(|| ServiceError::Task("ingest returned no artifact".to_string()))
    }

    /// Ingest artifacts in upload order, hashing their contents in parallel.
    pub async fn ingest_artifacts(&self, case_id: &str, uploads: Vec<ArtifactUpload>) -> Result<Vec<Artifact>> {
        if let Some(upload) = uploads
            .iter()
            .find(|u| u.kind.requires_platform() && u.platform.is_none())
        {
            return Err(ForensicsError::from(ArtifactError::MissingPlatform(upload.kind)).into());
        }

        let hashed = join_all(uploads.into_iter().map(|upload| {
            tokio::task::spawn_blocking(move || {
                let hash = hash_bytes(&upload.content);
                (upload, hash)
            })
        }))
        .await;

        let now = self.clock.now();
        let mut artifacts = Vec::with_capacity(hashed.len());
        for joined in hashed {
            let (upload, hash) = joined.map_err(|e| ServiceError::Task(e.to_string()))?;
            let mut artifact = Artifact::with_hash(
                upload.kind,
                hash,
                upload.content,
                upload.source,
                upload.collected_at.unwrap_or(now),
            );
            artifact.platform = upload.platform;
            artifacts.push(artifact);
        }

        self.store.append_artifacts(case_id, artifacts.clone()).await?;
        info!(case_id = %case_id, count = artifacts.len(), "Artifacts ingested");
        Ok(artifacts)
    }

    /// Compile inputs and make the result the case's active ruleset.
    pub async fn attach_ruleset(&self, case_id: &str, inputs: RulesetInputs) -> Result<Ruleset> {
        let compiled = self.engine.compile(&inputs).map_err(|e| {
            if e.is_fatal() {
                error!(case_id = %case_id, error = %e, "Rules engine fault");
            }
            e
        })?;
        let ruleset = Ruleset::new(inputs, &compiled, 0, self.clock.now())?;
        Ok(self.store.attach_ruleset(case_id, ruleset).await?)
    }

    /// Decision for one cell under the active ruleset. Blocked when the case
    /// has none.
    pub async fn evaluate(&self, case_id: &str, platform: &str, action: Action) -> Decision {
        match self.store.active_ruleset(case_id).await {
            Some(ruleset) => ruleset.evaluate(platform, action),
            None => {
                debug!(case_id = %case_id, "No active ruleset, evaluating as Blocked");
                Decision::Blocked
            }
        }
    }

    /// Validate arbitrary narrative text.
    pub fn validate(&self, text: &str) -> Verdict {
        self.firewall.validate(text)
    }

    /// Run forensics over the case's artifacts and keep the result.
    pub async fn run_forensics(&self, case_id: &str) -> Result<ForensicsRun> {
        let _guard = self.try_begin_run(case_id)?;
        let ruleset = self.require_ruleset(case_id).await?;
        let artifacts = self.store.artifacts(case_id).await;

        let (run, _) = self
            .compute(ruleset.matrix.clone(), artifacts, CancellationToken::new())
            .await?;
        self.store.record_forensics(case_id, run.clone()).await?;
        Ok(run)
    }

    /// Generate, validate and commit a report with its audit packet.
    pub async fn generate_report(&self, case_id: &str) -> Result<GeneratedReport> {
        self.generate_report_with_cancel(case_id, CancellationToken::new())
            .await
    }

    /// As [`generate_report`](Self::generate_report), honouring a
    /// cancellation token until the convergence snapshot is taken.
    pub async fn generate_report_with_cancel(
        &self,
        case_id: &str,
        cancel: CancellationToken,
    ) -> Result<GeneratedReport> {
        let _guard = self.try_begin_run(case_id)?;
        info!(case_id = %case_id, "Report run started");

        let ruleset = self.require_ruleset(case_id).await?;
        let artifacts = self.store.artifacts(case_id).await;
        let input_hashes = artifacts.iter().map(|a| a.content_hash.clone()).collect();

        let (run, outputs) = self.compute(ruleset.matrix.clone(), artifacts, cancel).await?;

        let header = ReportHeader {
            title: self.config.report.title.clone(),
            case_id: case_id.to_string(),
            jurisdiction: ruleset.inputs.jurisdiction.clone(),
            ruleset_version: ruleset.version,
            ruleset_hash: ruleset.content_hash.clone(),
        };
        let supersedes = self.store.latest_report(case_id).await.map(|r| r.id);

        let firewall = self
            .firewall
            .with_extra_terms(ruleset.inputs.forbidden_terms.iter().cloned());
        let sections = ReportAssembler::compose(&run, &outputs);
        let report = ReportAssembler::new(&firewall)
            .assemble(&header, sections, self.clock.now(), supersedes)
            .map_err(|violations| {
                warn!(
                    case_id = %case_id,
                    violations = violations.len(),
                    first = %violations.first().map(|v| v.to_string()).unwrap_or_default(),
                    "Integrity halt, report discarded"
                );
                ServiceError::IntegrityHalt { violations }
            })?;

        let packet = AuditPacket::build(&report, input_hashes, self.clock.now());
        self.store.commit_report(report.clone(), packet.clone()).await?;
        self.store.record_forensics(case_id, run.clone()).await?;

        info!(
            case_id = %case_id,
            report_id = %report.id,
            report_hash = %report.content_hash.short(),
            "Report run complete"
        );
        Ok(GeneratedReport {
            report,
            packet,
            forensics: run,
        })
    }

    /// Audit packet for a report.
    pub async fn get_audit_packet(&self, report_id: Uuid) -> Result<AuditPacket> {
        self.store
            .audit_packet(report_id)
            .await
            .ok_or(ServiceError::ReportNotFound(report_id))
    }

    pub async fn latest_report(&self, case_id: &str) -> Option<Report> {
        self.store.latest_report(case_id).await
    }

    pub async fn report_history(&self, case_id: &str) -> Vec<Report> {
        self.store.report_history(case_id).await
    }

    /// Re-verify a stored report end to end: aggregate digest, rendered
    /// report bytes and the input artifacts it was built from.
    pub async fn verify_audit(&self, report_id: Uuid) -> Result<()> {
        let packet = self.get_audit_packet(report_id).await?;
        packet.verify()?;

        let report = self
            .store
            .report_history(&packet.case_id)
            .await
            .into_iter()
            .find(|r| r.id == report_id)
            .ok_or(ServiceError::ReportNotFound(report_id))?;
        packet.verify_report(report.rendered.as_bytes())?;

        // Artifacts are append-only, so a report's inputs are a prefix of the
        // case's current list
        let artifacts = self.store.artifacts(&packet.case_id).await;
        let contents: Vec<&[u8]> = artifacts
            .iter()
            .take(packet.input_hashes.len())
            .map(|a| a.content.as_slice())
            .collect();
        packet.verify_inputs(&contents)?;

        debug!(report_id = %report_id, "Audit verified");
        Ok(())
    }

    async fn require_ruleset(&self, case_id: &str) -> Result<Ruleset> {
        self.store
            .active_ruleset(case_id)
            .await
            .ok_or_else(|| ServiceError::NoActiveRuleset(case_id.to_string()))
    }

    /// Extraction, kernel and analyzers on the blocking pool.
    async fn compute(
        &self,
        matrix: PermissionMatrix,
        artifacts: Vec<Artifact>,
        cancel: CancellationToken,
    ) -> Result<(ForensicsRun, AnalyzerOutputs)> {
        let config: ForensicsConfig = self.config.forensics.clone();
        let task = tokio::task::spawn_blocking(move || -> forensics::Result<(ForensicsRun, AnalyzerOutputs)> {
            let events = EventExtractor::new(&config)?.extract_all(&artifacts)?;
            let run = ForensicsKernel::new(&matrix)
                .with_config(config.clone())
                .with_cancellation(cancel)
                .run(&events)?;
            let outputs = analyze(&artifacts, &matrix, &config)?;
            Ok((run, outputs))
        });
        Ok(task.await.map_err(|e| ServiceError::Task(e.to_string()))??)
    }
}
