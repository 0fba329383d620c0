//! The jurisdiction rules engine.
//!
//! Compilation is a fixed pipeline: jurisdiction base matrix, standing-order
//! clauses (tighten only), firm overrides (tighten only, loosening rejected),
//! then the hard-block assertion. The result is pure data; the caller hashes
//! and persists it.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::clauses::{ClauseCatalog, ClauseMatch};
use crate::hashing::{hash_canonical, ContentHash, HashError};
use crate::matrix::PermissionMatrix;
use crate::profiles::ProfileRegistry;
use crate::types::{platform_key, Action, Decision, FirmOverride, PlatformSpec};

/// Error types for rules compilation.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    /// Jurisdiction code has no profile
    #[error("Unknown jurisdiction: {0}")]
    UnknownJurisdiction(String),

    /// Input is structurally invalid
    #[error("Malformed ruleset input: {0}")]
    MalformedInput(String),

    /// An override names a platform that is not in the platform list
    #[error("Override targets unknown platform: {0}")]
    UnknownPlatform(String),

    /// An override would relax a cell
    #[error("Override rejected for ({platform}, {action}): {requested} is looser than {current}")]
    OverrideRejected {
        platform: String,
        action: Action,
        current: Decision,
        requested: Decision,
    },

    /// A hard-blocked cell survived compilation unblocked. Engine fault.
    #[error("Invariant violation: hard-blocked cell ({platform}, {action}) compiled to {found}")]
    InvariantViolation {
        platform: String,
        action: Action,
        found: Decision,
    },

    /// Canonical encoding failed
    #[error("Hashing failed: {0}")]
    Hashing(#[from] HashError),

    /// YAML input could not be parsed
    #[error("Ruleset YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RulesError {
    /// Whether this error indicates an engine fault rather than bad input.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, RulesError>;

/// Everything a ruleset is compiled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesetInputs {
    /// Jurisdiction code, e.g. `US-ABA`
    pub jurisdiction: String,
    /// The judge's standing order, if any
    #[serde(default)]
    pub standing_order: Option<String>,
    /// Platforms the research team may encounter
    #[serde(default)]
    pub platforms: Vec<PlatformSpec>,
    /// Firm policy overrides, applied last
    #[serde(default)]
    pub firm_overrides: Vec<FirmOverride>,
    /// Extra terms the firm forbids in reports
    #[serde(default)]
    pub forbidden_terms: Vec<String>,
}

impl RulesetInputs {
    /// Minimal inputs for a jurisdiction.
    pub fn new(jurisdiction: impl Into<String>) -> Self {
        Self {
            jurisdiction: jurisdiction.into(),
            standing_order: None,
            platforms: Vec::new(),
            firm_overrides: Vec::new(),
            forbidden_terms: Vec::new(),
        }
    }

    /// Builder: set the standing order text.
    pub fn with_standing_order(mut self, text: impl Into<String>) -> Self {
        self.standing_order = Some(text.into());
        self
    }

    /// Builder: add a platform.
    pub fn with_platform(mut self, platform: PlatformSpec) -> Self {
        self.platforms.push(platform);
        self
    }

    /// Builder: add a firm override.
    pub fn with_override(mut self, entry: FirmOverride) -> Self {
        self.firm_overrides.push(entry);
        self
    }

    /// Load from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Cache key: hash of the canonical encoding of all inputs.
    pub fn cache_key(&self) -> Result<ContentHash> {
        Ok(hash_canonical(self)?)
    }
}

/// Output of a successful compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRules {
    /// The enforceable matrix
    pub matrix: PermissionMatrix,
    /// Standing-order clauses that tightened the matrix
    pub matched_clauses: Vec<ClauseMatch>,
    /// Hash of the inputs this was compiled from
    pub inputs_hash: ContentHash,
}

/// Compiles ruleset inputs into permission matrices.
pub struct RulesEngine {
    profiles: ProfileRegistry,
    catalog: ClauseCatalog,
    cache: DashMap<ContentHash, Arc<CompiledRules>>,
    cache_enabled: bool,
}

impl RulesEngine {
    /// Engine with built-in profiles and clause catalog.
    pub fn new() -> Self {
        Self::with_parts(ProfileRegistry::builtin(), ClauseCatalog::builtin())
    }

    /// Engine with custom profiles and catalog.
    pub fn with_parts(profiles: ProfileRegistry, catalog: ClauseCatalog) -> Self {
        Self {
            profiles,
            catalog,
            cache: DashMap::new(),
            cache_enabled: true,
        }
    }

    /// Builder: disable the compile cache.
    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    /// The clause catalog in use.
    pub fn catalog(&self) -> &ClauseCatalog {
        &self.catalog
    }

    /// Compile inputs, reusing a cached result for identical inputs.
    pub fn compile(&self, inputs: &RulesetInputs) -> Result<Arc<CompiledRules>> {
        let key = inputs.cache_key()?;

        if self.cache_enabled {
            if let Some(hit) = self.cache.get(&key) {
                debug!(inputs_hash = %key.short(), "Rules cache hit");
                return Ok(Arc::clone(hit.value()));
            }
        }

        let compiled = Arc::new(self.compile_uncached(inputs, key.clone())?);

        if self.cache_enabled {
            self.cache.insert(key, Arc::clone(&compiled));
        }

        Ok(compiled)
    }

    /// Number of cached compilations.
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn compile_uncached(&self, inputs: &RulesetInputs, inputs_hash: ContentHash) -> Result<CompiledRules> {
        let profile = self
            .profiles
            .get(&inputs.jurisdiction)
            .ok_or_else(|| RulesError::UnknownJurisdiction(inputs.jurisdiction.clone()))?;

        validate_platforms(&inputs.platforms)?;

        // Base matrix from the jurisdiction profile
        let mut matrix = PermissionMatrix::empty();
        for platform in &inputs.platforms {
            let key = platform.key();
            for action in Action::ALL {
                matrix.set(&key, action, profile.base_decision(platform, action));
            }
        }

        // Standing-order clauses only ever tighten
        let matched_clauses = match inputs.standing_order.as_deref() {
            Some(text) if !text.trim().is_empty() => {
                self.catalog.match_text(text, &inputs.platforms)
            }
            _ => Vec::new(),
        };

        for clause in &matched_clauses {
            let Some(template) = self.catalog.get(&clause.clause_id) else {
                continue;
            };
            for key in &clause.platforms {
                let Some(platform) = inputs.platforms.iter().find(|p| &p.key() == key) else {
                    continue;
                };
                let restriction = template.restriction_for(platform);
                for action in &clause.actions {
                    let result = matrix.tighten(key, *action, restriction);
                    debug!(
                        clause = %clause.clause_id,
                        platform = %key,
                        action = %action,
                        decision = %result,
                        "Standing order clause applied"
                    );
                }
            }
        }

        // Firm overrides: tighten only, reject loosening
        for entry in &inputs.firm_overrides {
            let targets: Vec<String> = if entry.is_wildcard() {
                inputs.platforms.iter().map(|p| p.key()).collect()
            } else {
                let key = platform_key(&entry.platform);
                if !matrix.contains_platform(&key) {
                    return Err(RulesError::UnknownPlatform(entry.platform.clone()));
                }
                vec![key]
            };

            for key in targets {
                let current = matrix.get_cell(&key, entry.action).unwrap_or(Decision::Blocked);
                if current.would_loosen(entry.decision) {
                    warn!(
                        platform = %key,
                        action = %entry.action,
                        current = %current,
                        requested = %entry.decision,
                        "Firm override rejected"
                    );
                    return Err(RulesError::OverrideRejected {
                        platform: key,
                        action: entry.action,
                        current,
                        requested: entry.decision,
                    });
                }
                matrix.tighten(&key, entry.action, entry.decision);
            }
        }

        assert_hard_blocks(&matrix)?;

        info!(
            jurisdiction = %profile.code,
            platforms = inputs.platforms.len(),
            clauses = matched_clauses.len(),
            overrides = inputs.firm_overrides.len(),
            inputs_hash = %inputs_hash.short(),
            "Permission matrix compiled"
        );

        Ok(CompiledRules {
            matrix,
            matched_clauses,
            inputs_hash,
        })
    }
}

impl Default for RulesEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure lookup against a compiled matrix.
pub fn evaluate(matrix: &PermissionMatrix, platform: &str, action: Action) -> Decision {
    matrix.evaluate(platform, action)
}

fn validate_platforms(platforms: &[PlatformSpec]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for platform in platforms {
        let key = platform.key();
        if key.is_empty() {
            return Err(RulesError::MalformedInput("platform with empty name".to_string()));
        }
        if key == crate::types::ALL_PLATFORMS {
            return Err(RulesError::MalformedInput(
                "'*' is reserved for overrides".to_string(),
            ));
        }
        if !seen.insert(key.clone()) {
            return Err(RulesError::MalformedInput(format!("duplicate platform: {key}")));
        }
    }
    Ok(())
}

/// Post-compilation assertion over the fixed hard-block set.
fn assert_hard_blocks(matrix: &PermissionMatrix) -> Result<()> {
    if let Some(breach) = matrix.hard_block_breaches().into_iter().next() {
        error!(
            platform = %breach.platform,
            action = %breach.action,
            found = %breach.found,
            "Hard-block invariant violated after compilation"
        );
        return Err(RulesError::InvariantViolation {
            platform: breach.platform,
            action: breach.action,
            found: breach.found,
        });
    }
    Ok(())
}
