//! MAAT - compliance-and-integrity pipeline
//!
//! Consolidates legally gated observational inputs about a jury pool and its
//! deliberation into a vocabulary-constrained report with a verifiable audit
//! trail:
//! - Permission decisions from the compiled jurisdiction ruleset
//! - Deliberation process forensics over ingested artifacts
//! - A fail-closed language firewall on every narrative that leaves the system
//! - Audit packets binding each report to its ruleset and inputs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              MaatService                │
//! │   (ingest, attach, evaluate, report)    │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┼───────────────┐
//!      ▼           ▼               ▼
//! ┌──────────┐ ┌──────────┐ ┌──────────────┐
//! │ Rules    │ │Forensics │ │ Report +     │
//! │ Engine   │ │ Kernel   │ │ Firewall     │
//! └──────────┘ └──────────┘ └──────┬───────┘
//!                                  ▼
//!                    CaseStore (report + packet, atomic)
//! ```

pub mod audit;
pub mod clock;
pub mod config;
pub mod firewall;
pub mod report;
pub mod service;
pub mod store;

// Re-export main types
pub use audit::{AuditError, AuditPacket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, MaatConfig};
pub use firewall::{LanguageFirewall, Verdict, Violation};
pub use report::{LocatedViolation, Report, ReportAssembler, ReportHeader, Section, SectionKind, TEMPLATE_VERSION};
pub use service::{ArtifactUpload, GeneratedReport, MaatService, RunGuard, ServiceError};
pub use store::{CaseStore, InMemoryStore, StoreError};
