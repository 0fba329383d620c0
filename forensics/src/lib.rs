//! Deliberation Process Forensics for MAAT
//!
//! Turns stored artifacts into time-ordered process events and runs them
//! through a phase machine that keeps append-only, hash-chained ledgers:
//!
//! - **Authority event log**: verbatim excerpts of authority assertions
//! - **Evidence ledger**: first/last reference and resolution per item
//! - **Dissent signal**: count of open disagreement markers over time
//! - **Convergence snapshot**: ledgers frozen when convergence is marked
//! - **Amendment log**: post-convergence events that revisit earlier state
//!
//! Events carry observed facts only. The event schema has no field for a
//! trait, label or assessment of any person.
//!
//! # Pipeline
//!
//! ```text
//! Artifact ──▶ EventExtractor ──▶ RawEvent stream ──▶ ForensicsKernel ──▶ ForensicsRun
//!    │                                                      ▲
//!    └──▶ analyzers (venue, voir dire, disclosure,          │
//!         public social)               PermissionMatrix ────┘ (source admissibility)
//! ```

pub mod analyzers;
pub mod artifact;
pub mod chain;
pub mod config;
pub mod event;
pub mod extract;
pub mod kernel;
pub mod ledger;
pub mod tabular;
pub mod types;

// Re-export main types
pub use analyzers::{analyze, AnalyzerOutputs};
pub use artifact::{Artifact, ArtifactError, ArtifactKind, ArtifactPayload};
pub use chain::{ChainEntry, ChainError, HashChain};
pub use config::ForensicsConfig;
pub use event::{EventKind, EventPayload, EventSource, Phase, ProcessEvent, RawEvent};
pub use extract::EventExtractor;
pub use kernel::{ForensicsKernel, ForensicsRun, RunWarning};
pub use ledger::{Amendment, AmendmentReason, ConvergenceSnapshot, EvidenceLedgerEntry, Ledgers};
pub use types::*;
