//! Core types for the forensics kernel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jurisdiction::HashError;

use crate::artifact::ArtifactError;
use crate::chain::ChainError;
use crate::kernel::RunWarning;

/// Event time in seconds.
///
/// Transcript offsets (`hh:mm:ss`) and wall-clock timestamps both map onto
/// this scale; the kernel only ever compares ticks, it never reads a clock.
pub type Tick = i64;

/// Error types for forensics runs.
#[derive(Debug, thiserror::Error)]
pub enum ForensicsError {
    /// Events were not supplied in timestamp order
    #[error("Unordered input at event {index}: timestamp {found} follows {previous}")]
    UnorderedInput {
        index: usize,
        previous: Tick,
        found: Tick,
    },

    /// No valid events remained after rejection
    #[error("Empty run: no valid events ({} warnings)", warnings.len())]
    EmptyRun { warnings: Vec<RunWarning> },

    /// Run cancelled before the convergence snapshot
    #[error("Run cancelled before convergence snapshot")]
    Cancelled,

    /// Artifact payload could not be parsed
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// A ledger chain failed verification
    #[error("Ledger chain error: {0}")]
    Chain(#[from] ChainError),

    /// A transcript pattern failed to compile
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Canonical encoding failed
    #[error("Hashing error: {0}")]
    Hashing(#[from] HashError),
}

pub type Result<T> = std::result::Result<T, ForensicsError>;

/// Cooperative cancellation flag shared between a caller and a running
/// kernel. The kernel checks it between events until the snapshot is taken.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}
