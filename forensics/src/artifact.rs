//! Stored artifacts and their typed payloads.
//!
//! An [`Artifact`] is immutable once created: raw bytes, a content hash and
//! collection metadata. [`Artifact::parse`] switches on the declared kind and
//! produces the matching [`ArtifactPayload`] variant.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use jurisdiction::hashing::{hash_bytes, ContentHash};

use crate::tabular;

/// Artifact kind as declared by the ingestion layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Transcript,
    Venue,
    Sjq,
    VoirDire,
    PublicRecords,
    PublicSocial,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::Transcript,
        ArtifactKind::Venue,
        ArtifactKind::Sjq,
        ArtifactKind::VoirDire,
        ArtifactKind::PublicRecords,
        ArtifactKind::PublicSocial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Transcript => "transcript",
            ArtifactKind::Venue => "venue",
            ArtifactKind::Sjq => "sjq",
            ArtifactKind::VoirDire => "voir_dire",
            ArtifactKind::PublicRecords => "public_records",
            ArtifactKind::PublicSocial => "public_social",
        }
    }

    /// Whether artifacts of this kind must name the platform they came from.
    pub fn requires_platform(&self) -> bool {
        matches!(self, ArtifactKind::PublicSocial)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        ArtifactKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| ArtifactError::UnknownKind(s.to_string()))
    }
}

/// Errors reading artifact payloads.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Unknown artifact kind: {0}")]
    UnknownKind(String),

    #[error("{kind} artifact {id} is not valid UTF-8")]
    NotUtf8 { id: Uuid, kind: ArtifactKind },

    #[error("{kind} artifact {id} could not be parsed: {reason}")]
    Parse {
        id: Uuid,
        kind: ArtifactKind,
        reason: String,
    },

    #[error("{0} artifact requires a platform")]
    MissingPlatform(ArtifactKind),
}

/// An immutable stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique artifact ID
    pub id: Uuid,
    /// Declared kind
    pub kind: ArtifactKind,
    /// Raw content
    pub content: Vec<u8>,
    /// SHA-256 of the raw content
    pub content_hash: ContentHash,
    /// Declared source (file name, export name, court reporter)
    pub source: String,
    /// When the content was collected
    pub collected_at: DateTime<Utc>,
    /// Originating platform, required for public social captures
    #[serde(default)]
    pub platform: Option<String>,
}

impl Artifact {
    /// Create an artifact and hash its content.
    pub fn new(
        kind: ArtifactKind,
        content: impl Into<Vec<u8>>,
        source: impl Into<String>,
        collected_at: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        Self::with_hash(kind, hash_bytes(&content), content, source, collected_at)
    }

    /// Create an artifact whose content hash was computed elsewhere.
    pub fn with_hash(
        kind: ArtifactKind,
        content_hash: ContentHash,
        content: Vec<u8>,
        source: impl Into<String>,
        collected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            content,
            content_hash,
            source: source.into(),
            collected_at,
            platform: None,
        }
    }

    /// Builder: set the originating platform.
    pub fn on_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Check the stored hash against the content.
    pub fn verify(&self) -> bool {
        hash_bytes(&self.content) == self.content_hash
    }

    /// Content as text.
    pub fn text(&self) -> Result<&str, ArtifactError> {
        std::str::from_utf8(&self.content).map_err(|_| ArtifactError::NotUtf8 {
            id: self.id,
            kind: self.kind,
        })
    }

    fn parse_error(&self, reason: impl fmt::Display) -> ArtifactError {
        ArtifactError::Parse {
            id: self.id,
            kind: self.kind,
            reason: reason.to_string(),
        }
    }

    /// Parse the payload according to the declared kind.
    pub fn parse(&self) -> Result<ArtifactPayload, ArtifactError> {
        if self.kind.requires_platform() && self.platform.is_none() {
            return Err(ArtifactError::MissingPlatform(self.kind));
        }
        let text = self.text()?;

        let payload = match self.kind {
            ArtifactKind::Transcript => ArtifactPayload::Transcript(text.to_string()),
            ArtifactKind::Venue => ArtifactPayload::Venue(
                serde_json::from_str(text).map_err(|e| self.parse_error(e))?,
            ),
            ArtifactKind::Sjq => {
                let rows = tabular::parse_rows(text).map_err(|e| self.parse_error(e))?;
                ArtifactPayload::Sjq(rows.into_iter().map(SjqRow::from_row).collect())
            }
            ArtifactKind::VoirDire => ArtifactPayload::VoirDire(
                parse_json_lines(text).map_err(|e| self.parse_error(e))?,
            ),
            ArtifactKind::PublicRecords => {
                let rows = tabular::parse_rows(text).map_err(|e| self.parse_error(e))?;
                ArtifactPayload::PublicRecords(
                    rows.into_iter().map(PublicRecordRow::from_row).collect(),
                )
            }
            ArtifactKind::PublicSocial => ArtifactPayload::PublicSocial(
                serde_json::from_str(text).map_err(|e| self.parse_error(e))?,
            ),
        };
        Ok(payload)
    }
}

fn parse_json_lines<T: serde::de::DeserializeOwned>(text: &str) -> Result<Vec<T>, String> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| serde_json::from_str(line).map_err(|e| format!("line {}: {e}", i + 1)))
        .collect()
}

/// Typed payload of an artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactPayload {
    /// Deliberation or proceedings transcript, kept as text; the extractor
    /// decides between annotated lines and JSON Lines
    Transcript(String),
    Venue(VenueDoc),
    Sjq(Vec<SjqRow>),
    VoirDire(Vec<VoirDireAnswer>),
    PublicRecords(Vec<PublicRecordRow>),
    PublicSocial(Vec<SocialPost>),
}

/// Venue research export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueDoc {
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub themes: Vec<VenueTheme>,
    #[serde(default)]
    pub volatility_zones: Vec<VolatilityZone>,
}

/// A community theme with a 1-5 salience rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueTheme {
    pub theme: String,
    #[serde(default)]
    pub salience: u8,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolatilityZone {
    pub theme: String,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub observed: String,
}

/// Supplemental juror questionnaire row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SjqRow {
    pub juror_label: String,
    pub litigation_history_declared: String,
}

impl SjqRow {
    fn from_row(mut row: tabular::Row) -> Self {
        Self {
            juror_label: row.remove("juror_label").unwrap_or_default(),
            litigation_history_declared: row
                .remove("litigation_history_declared")
                .unwrap_or_default(),
        }
    }
}

/// One voir-dire answer as captured by the court reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoirDireAnswer {
    #[serde(default)]
    pub juror_label: String,
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// A public record row: `juror_label,field,value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRecordRow {
    pub juror_label: String,
    pub field: String,
    pub value: String,
}

impl PublicRecordRow {
    fn from_row(mut row: tabular::Row) -> Self {
        Self {
            juror_label: row.remove("juror_label").unwrap_or_default(),
            field: row.remove("field").unwrap_or_default(),
            value: row.remove("value").unwrap_or_default(),
        }
    }
}

/// A publicly visible post captured without logging in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub public_text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "subject_label")]
    pub juror_label: Option<String>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(kind: ArtifactKind, content: &str) -> Artifact {
        Artifact::new(kind, content, "test", Utc::now())
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("voir-dire".parse::<ArtifactKind>().unwrap(), ArtifactKind::VoirDire);
        assert_eq!("PUBLIC_SOCIAL".parse::<ArtifactKind>().unwrap(), ArtifactKind::PublicSocial);
        assert!("email".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn test_hash_and_verify() {
        let mut a = artifact(ArtifactKind::Transcript, "[00:00:01] hello");
        assert!(a.verify());
        a.content.push(b'!');
        assert!(!a.verify());
    }

    #[test]
    fn test_parse_typed_payloads() {
        let venue = artifact(
            ArtifactKind::Venue,
            r#"{"venue":"County","themes":[{"theme":"water","salience":4}]}"#,
        );
        match venue.parse().unwrap() {
            ArtifactPayload::Venue(doc) => assert_eq!(doc.themes[0].salience, 4),
            other => panic!("unexpected payload {other:?}"),
        }

        let sjq = artifact(ArtifactKind::Sjq, "juror_label,litigation_history_declared\nJ1,no\n");
        match sjq.parse().unwrap() {
            ArtifactPayload::Sjq(rows) => assert_eq!(rows[0].juror_label, "J1"),
            other => panic!("unexpected payload {other:?}"),
        }

        let vd = artifact(
            ArtifactKind::VoirDire,
            "{\"juror_label\":\"J1\",\"question_id\":\"Q1\",\"answer_text\":\"yes\"}\n\n",
        );
        match vd.parse().unwrap() {
            ArtifactPayload::VoirDire(answers) => assert_eq!(answers.len(), 1),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_public_social_requires_platform() {
        let a = artifact(ArtifactKind::PublicSocial, "[]");
        assert!(matches!(a.parse(), Err(ArtifactError::MissingPlatform(_))));
        let a = a.on_platform("X");
        assert!(matches!(a.parse(), Ok(ArtifactPayload::PublicSocial(_))));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let vd = artifact(ArtifactKind::VoirDire, "{\"juror_label\":\"J1\"}\nnot json\n");
        let err = vd.parse().unwrap_err().to_string();
        assert!(err.contains("line 2"), "{err}");
    }
}
