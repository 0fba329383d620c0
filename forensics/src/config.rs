//! Configuration for forensics runs and analyzers.

use serde::{Deserialize, Serialize};

/// Limits applied when events and analyzer rows are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForensicsConfig {
    /// Maximum characters kept from an authority-assertion excerpt
    pub max_excerpt_chars: usize,
    /// Maximum characters kept from a voir-dire answer
    pub max_answer_chars: usize,
    /// Maximum characters kept from a public social snippet
    pub max_snippet_chars: usize,
    /// Phrases that mark a transcript line as an authority assertion
    pub authority_cues: Vec<String>,
}

impl Default for ForensicsConfig {
    fn default() -> Self {
        Self {
            max_excerpt_chars: 220,
            max_answer_chars: 300,
            max_snippet_chars: 280,
            authority_cues: vec![
                "judge said".to_string(),
                "the judge instructed".to_string(),
                "instruction".to_string(),
                "the law says".to_string(),
                "we must".to_string(),
                "is required".to_string(),
            ],
        }
    }
}

impl ForensicsConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ForensicsConfig::from_yaml("max_excerpt_chars: 40\n").unwrap();
        assert_eq!(config.max_excerpt_chars, 40);
        assert_eq!(config.max_answer_chars, 300);
        assert!(!config.authority_cues.is_empty());
    }
}
