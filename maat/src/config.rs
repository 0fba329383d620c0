//! Configuration for the MAAT pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use forensics::ForensicsConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaatConfig {
    /// Report rendering
    pub report: ReportConfig,
    /// Language firewall
    pub firewall: FirewallConfig,
    /// Forensics limits and transcript cues
    pub forensics: ForensicsConfig,
    /// Rules engine
    pub rules: RulesConfig,
}

/// Error types for loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MaatConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load config from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_yaml(&yaml)?)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Report configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Document title
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "MAAT Report".to_string(),
        }
    }
}

/// Firewall configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// Terms added to the built-in deny list for every report
    pub extra_deny_terms: Vec<String>,
}

/// Rules engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Share compiled matrices across runs with identical inputs
    pub cache_enabled: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
        }
    }
}
