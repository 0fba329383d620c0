//! Jurisdiction Rules Engine for MAAT
//!
//! Compiles jurisdiction defaults, a judge's standing order, a platform list
//! and firm policy into an enforceable permission matrix:
//!
//! - **Jurisdiction profile**: base treatment of passive research
//! - **Standing order**: phrase-matched clauses that tighten cells
//! - **Firm overrides**: further restriction only; loosening is rejected
//! - **Hard-block assertion**: access requests, messages, follows, connection
//!   requests and ex-parte communication are Blocked under every ruleset
//!
//! The crate also owns the hashing utility every other component uses.
//!
//! # Key Components
//!
//! - [`RulesEngine`]: Compiles [`RulesetInputs`] into [`CompiledRules`], with a
//!   shared cache keyed by the input hash
//! - [`PermissionMatrix`]: Fail-closed (platform, action) lookup
//! - [`ClauseCatalog`]: Auditable table of standing-order clause templates
//! - [`Ruleset`]: Immutable, hashed record attached to a case
//!
//! # Example
//!
//! ```ignore
//! use jurisdiction::{Action, PlatformSpec, RulesEngine, RulesetInputs};
//!
//! let inputs = RulesetInputs::new("US-ABA")
//!     .with_platform(PlatformSpec::public("X"))
//!     .with_standing_order("No view that can notify jurors on X.");
//!
//! let compiled = RulesEngine::new().compile(&inputs)?;
//! let decision = compiled.matrix.evaluate("X", Action::PassiveView);
//! ```

pub mod clauses;
pub mod engine;
pub mod hashing;
pub mod matrix;
pub mod profiles;
pub mod ruleset;
pub mod types;

// Re-export main types
pub use clauses::{ClauseCatalog, ClauseMatch, ClauseTemplate};
pub use engine::{evaluate, CompiledRules, RulesEngine, RulesError, RulesetInputs};
pub use hashing::{ContentHash, HashError};
pub use matrix::PermissionMatrix;
pub use profiles::{JurisdictionProfile, ProfileRegistry};
pub use ruleset::Ruleset;
pub use types::*;
