//! Report assembly.
//!
//! Sections are composed from forensics ledgers and analyzer outputs using
//! observational phrasing, then rendered in a fixed template order. Every
//! section body and the final document pass through the language firewall;
//! a single violation anywhere means no report at all.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forensics::ledger::EvidenceLedgerEntry;
use forensics::{AmendmentReason, AnalyzerOutputs, ForensicsRun, Tick};
use jurisdiction::hashing::{hash_bytes, ContentHash};

use crate::firewall::{LanguageFirewall, Verdict, Violation};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Version of the section layout below.
pub const TEMPLATE_VERSION: &str = "1.0";

const NONE: &str = "(none)";

/// Report sections in template order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    ProcessTimeline,
    AuthorityEventLog,
    UnresolvedEvidenceLedger,
    PreRetconSnapshot,
    PostConvergenceAmendments,
    ProcessIntegrityNotes,
    DissentSignal,
    VenueSensitivityMatrix,
    ResponseDistributionMap,
    DisclosureConsistencyFlags,
    PublicSocialSummary,
    RunWarnings,
}

impl SectionKind {
    pub const ALL: [SectionKind; 12] = [
        SectionKind::ProcessTimeline,
        SectionKind::AuthorityEventLog,
        SectionKind::UnresolvedEvidenceLedger,
        SectionKind::PreRetconSnapshot,
        SectionKind::PostConvergenceAmendments,
        SectionKind::ProcessIntegrityNotes,
        SectionKind::DissentSignal,
        SectionKind::VenueSensitivityMatrix,
        SectionKind::ResponseDistributionMap,
        SectionKind::DisclosureConsistencyFlags,
        SectionKind::PublicSocialSummary,
        SectionKind::RunWarnings,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::ProcessTimeline => "Process Timeline",
            SectionKind::AuthorityEventLog => "Authority Event Log",
            SectionKind::UnresolvedEvidenceLedger => "Unresolved Evidence Ledger",
            SectionKind::PreRetconSnapshot => "Pre-Retcon Snapshot",
            SectionKind::PostConvergenceAmendments => "Post-Convergence Amendments",
            SectionKind::ProcessIntegrityNotes => "Process Integrity Notes",
            SectionKind::DissentSignal => "Dissent Signal",
            SectionKind::VenueSensitivityMatrix => "Venue Sensitivity Matrix",
            SectionKind::ResponseDistributionMap => "Response Distribution Map",
            SectionKind::DisclosureConsistencyFlags => "Disclosure Consistency Flags",
            SectionKind::PublicSocialSummary => "Public Social Summary",
            SectionKind::RunWarnings => "Run Warnings",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A firewall-approved section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub body: String,
}

/// A violation together with where it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatedViolation {
    /// `None` for the document frame (header and titles)
    pub section: Option<SectionKind>,
    pub violation: Violation,
}

impl fmt::Display for LocatedViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.section {
            Some(kind) => write!(f, "'{}' in {}", self.violation.surface, kind),
            None => write!(f, "'{}' in document header", self.violation.surface),
        }
    }
}

/// Case-level facts printed at the top of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportHeader {
    pub title: String,
    pub case_id: String,
    pub jurisdiction: String,
    pub ruleset_version: u64,
    pub ruleset_hash: ContentHash,
}

/// A generated report. Immutable; later runs supersede it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub case_id: String,
    pub template_version: String,
    pub sections: Vec<Section>,
    /// Rendered markdown
    pub rendered: String,
    /// SHA-256 of `rendered`
    pub content_hash: ContentHash,
    pub ruleset_hash: ContentHash,
    pub created_at: DateTime<Utc>,
    /// Report this one replaces as latest
    pub supersedes: Option<Uuid>,
}

impl Report {
    /// Recompute the content hash over the rendered document.
    pub fn verify(&self) -> bool {
        hash_bytes(self.rendered.as_bytes()) == self.content_hash
    }
}

/// Composes, validates and renders reports.
pub struct ReportAssembler<'a> {
    firewall: &'a LanguageFirewall,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(firewall: &'a LanguageFirewall) -> Self {
        Self { firewall }
    }

    /// Build section bodies in template order.
    pub fn compose(run: &ForensicsRun, analyzers: &AnalyzerOutputs) -> Vec<Section> {
        SectionKind::ALL
            .into_iter()
            .map(|kind| Section {
                kind,
                body: compose_section(kind, run, analyzers),
            })
            .collect()
    }

    /// Validate and render. On any violation, every violation found is
    /// returned and nothing is rendered.
    pub fn assemble(
        &self,
        header: &ReportHeader,
        sections: Vec<Section>,
        created_at: DateTime<Utc>,
        supersedes: Option<Uuid>,
    ) -> Result<Report, Vec<LocatedViolation>> {
        let mut violations: Vec<LocatedViolation> = sections
            .iter()
            .flat_map(|section| {
                self.check(&section.body)
                    .into_iter()
                    .map(move |violation| LocatedViolation {
                        section: Some(section.kind),
                        violation,
                    })
            })
            .collect();

        if violations.is_empty() {
            let rendered = render(header, &sections);
            violations.extend(self.check(&rendered).into_iter().map(|violation| LocatedViolation {
                section: None,
                violation,
            }));
            if violations.is_empty() {
                return Ok(Report {
                    id: Uuid::new_v4(),
                    case_id: header.case_id.clone(),
                    template_version: TEMPLATE_VERSION.to_string(),
                    sections,
                    content_hash: hash_bytes(rendered.as_bytes()),
                    rendered,
                    ruleset_hash: header.ruleset_hash.clone(),
                    created_at,
                    supersedes,
                });
            }
        }

        Err(violations)
    }

    fn check(&self, text: &str) -> Vec<Violation> {
        match self.firewall.validate(text) {
            Verdict::Approved { .. } => Vec::new(),
            Verdict::IntegrityHalt { violations } => violations,
        }
    }
}

/// Render the document. Contains no wall-clock time, so identical inputs
/// render to identical bytes.
fn render(header: &ReportHeader, sections: &[Section]) -> String {
    let mut lines = vec![
        format!("# {} - {}", header.title, header.case_id),
        String::new(),
        format!("- Case ID: `{}`", header.case_id),
        format!("- Jurisdiction: {}", header.jurisdiction),
        format!(
            "- Ruleset: version {} (`{}`)",
            header.ruleset_version, header.ruleset_hash
        ),
        format!("- Template version: {TEMPLATE_VERSION}"),
        String::new(),
    ];
    for (i, section) in sections.iter().enumerate() {
        lines.push(format!("## {}) {}", i + 1, section.kind.title()));
        lines.push(section.body.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}

/// `hh:mm:ss` for offsets within a day, RFC 3339 for wall-clock ticks.
pub fn format_tick(tick: Tick) -> String {
    if (0..86_400).contains(&tick) {
        format!("{:02}:{:02}:{:02}", tick / 3600, (tick % 3600) / 60, tick % 60)
    } else {
        DateTime::<Utc>::from_timestamp(tick, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| tick.to_string())
    }
}

fn bullets(items: Vec<String>) -> String {
    if items.is_empty() {
        NONE.to_string()
    } else {
        items
            .into_iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn json_block<T: Serialize>(value: Option<&T>) -> String {
    match value.map(serde_json::to_string_pretty) {
        Some(Ok(json)) => format!("```json\n{json}\n```"),
        Some(Err(e)) => format!("(not rendered: {e})"),
        None => NONE.to_string(),
    }
}

fn evidence_line(entry: &EvidenceLedgerEntry) -> String {
    format!(
        "{}: first referenced {}, last referenced {}, referenced {} time(s); remained unresolved at run end",
        entry.evidence_id,
        format_tick(entry.first_reference),
        format_tick(entry.last_reference),
        entry.reference_count
    )
}

fn compose_section(kind: SectionKind, run: &ForensicsRun, analyzers: &AnalyzerOutputs) -> String {
    let ledgers = &run.ledgers;
    match kind {
        SectionKind::ProcessTimeline => {
            let mut items: Vec<String> = ledgers
                .timeline
                .iter()
                .map(|t| format!("[{}] phase shifted from {} to {}", format_tick(t.at), t.from, t.to))
                .collect();
            items.push(format!("Final recorded phase: {}", run.final_phase));
            bullets(items)
        }
        SectionKind::AuthorityEventLog => bullets(
            ledgers
                .authority
                .iter()
                .map(|a| format!("[{}] authority assertion recorded: \"{}\"", format_tick(a.at), a.excerpt))
                .collect(),
        ),
        SectionKind::UnresolvedEvidenceLedger => bullets(ledgers.unresolved().map(evidence_line).collect()),
        SectionKind::PreRetconSnapshot => match &run.snapshot {
            Some(snapshot) => {
                let frozen = snapshot.ledgers();
                let unresolved: Vec<&str> = frozen.unresolved().map(|e| e.evidence_id.as_str()).collect();
                bullets(vec![
                    format!(
                        "Snapshot recorded at {} (event {})",
                        format_tick(snapshot.taken_at),
                        snapshot.trigger_sequence
                    ),
                    format!("Snapshot digest: `{}`", snapshot.digest()),
                    format!("Authority assertions recorded: {}", frozen.authority.len()),
                    format!("Evidence items referenced: {}", frozen.evidence.len()),
                    format!(
                        "Evidence items unresolved at convergence: {}",
                        if unresolved.is_empty() {
                            NONE.to_string()
                        } else {
                            unresolved.join(", ")
                        }
                    ),
                    format!("Open disagreement markers at convergence: {}", frozen.open_disagreements.len()),
                ])
            }
            None => "No convergence marker was recorded; no snapshot exists.".to_string(),
        },
        SectionKind::PostConvergenceAmendments => bullets(
            run.amendments
                .iter()
                .map(|a| {
                    let what = match &a.reason {
                        AmendmentReason::PhaseReentry { current, attempted } => {
                            format!("{attempted} phase signal recorded during {current} phase")
                        }
                        AmendmentReason::RepeatedConvergence => "repeated convergence marker".to_string(),
                        AmendmentReason::EvidenceRevision { evidence_id } => {
                            format!("evidence item {evidence_id} referenced again")
                        }
                        AmendmentReason::DissentRevision { marker_id } => {
                            format!("disagreement marker {marker_id} closed")
                        }
                    };
                    format!("[{}] event {}: {}", format_tick(a.at), a.event.sequence, what)
                })
                .collect(),
        ),
        SectionKind::ProcessIntegrityNotes => {
            let authority = ledgers.authority.len();
            let references = ledgers.evidence_updates.len();
            let mut notes = vec![
                format!(
                    "Observed {} authority assertion(s) and {} evidence reference(s) across {} recorded event(s).",
                    authority, references, run.applied_events
                ),
                format!(
                    "All ledger chains verified; ledger digest `{}`.",
                    ledgers
                        .digest()
                        .map(|d| d.to_string())
                        .unwrap_or_else(|_| "unavailable".to_string())
                ),
            ];
            if authority > 5 && references < 3 {
                notes.push(
                    "Observed authority assertion density coinciding with reduced evidence references."
                        .to_string(),
                );
            }
            if authority > references {
                notes.push(
                    "Observed authority assertions exceeding evidence references in the provided record."
                        .to_string(),
                );
            }
            bullets(notes)
        }
        SectionKind::DissentSignal => bullets(
            ledgers
                .dissent
                .iter()
                .map(|s| format!("[{}] open disagreement markers: {}", format_tick(s.at), s.open_markers))
                .collect(),
        ),
        SectionKind::VenueSensitivityMatrix => json_block(analyzers.venue.as_ref()),
        SectionKind::ResponseDistributionMap => json_block(analyzers.responses.as_ref()),
        SectionKind::DisclosureConsistencyFlags => match &analyzers.disclosure_flags {
            Some(flags) if !flags.is_empty() => json_block(Some(flags)),
            _ => NONE.to_string(),
        },
        SectionKind::PublicSocialSummary => json_block(analyzers.public_social.as_ref()),
        SectionKind::RunWarnings => bullets(run.warnings.iter().map(|w| w.to_string()).collect()),
    }
}
