//! Process events.
//!
//! Extraction produces loosely-typed [`RawEvent`]s; the kernel validates each
//! into a [`ProcessEvent`] or rejects it with a [`MalformedReason`]. The
//! payload variants carry observed facts only: who said what is recorded as
//! a label and a verbatim statement, never as a characterisation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::artifact::ArtifactKind;
use crate::types::Tick;

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    pub artifact_id: Uuid,
    pub artifact_kind: ArtifactKind,
    /// Platform for public social captures
    #[serde(default)]
    pub platform: Option<String>,
    /// One-based line in the artifact, when line-oriented
    #[serde(default)]
    pub line: Option<usize>,
}

/// Event kinds the kernel understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AuthorityAssertion,
    EvidenceReference,
    PhaseMarker,
    Disclosure,
    Contradiction,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AuthorityAssertion => "authority_assertion",
            EventKind::EvidenceReference => "evidence_reference",
            EventKind::PhaseMarker => "phase_marker",
            EventKind::Disclosure => "disclosure",
            EventKind::Contradiction => "contradiction",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "authority_assertion" => Ok(EventKind::AuthorityAssertion),
            "evidence_reference" => Ok(EventKind::EvidenceReference),
            "phase_marker" => Ok(EventKind::PhaseMarker),
            "disclosure" => Ok(EventKind::Disclosure),
            "contradiction" => Ok(EventKind::Contradiction),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deliberation phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Orientation,
    Discussion,
    AuthorityAssertion,
    Convergence,
    Closed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Orientation => "orientation",
            Phase::Discussion => "discussion",
            Phase::AuthorityAssertion => "authority_assertion",
            Phase::Convergence => "convergence",
            Phase::Closed => "closed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit phase markers found in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseMarker {
    Discussion,
    Convergence,
    Closed,
}

impl PhaseMarker {
    /// Phase this marker asks for.
    pub fn target(&self) -> Phase {
        match self {
            PhaseMarker::Discussion => Phase::Discussion,
            PhaseMarker::Convergence => Phase::Convergence,
            PhaseMarker::Closed => Phase::Closed,
        }
    }
}

impl FromStr for PhaseMarker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discussion" => Ok(PhaseMarker::Discussion),
            "convergence" => Ok(PhaseMarker::Convergence),
            "closed" | "closing" => Ok(PhaseMarker::Closed),
            other => Err(format!("unknown phase marker '{other}'")),
        }
    }
}

/// Open/close state of a disagreement marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerState {
    Opened,
    Closed,
}

impl FromStr for MarkerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "opened" => Ok(MarkerState::Opened),
            "close" | "closed" => Ok(MarkerState::Closed),
            other => Err(format!("unknown marker state '{other}'")),
        }
    }
}

/// Observed facts carried by a validated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    AuthorityAssertion {
        excerpt: String,
    },
    EvidenceReference {
        evidence_id: String,
        /// Whether this reference resolves the item
        resolution: bool,
    },
    PhaseMarker {
        marker: PhaseMarker,
    },
    Disclosure {
        subject_label: String,
        question_id: Option<String>,
        statement: String,
    },
    Contradiction {
        marker_id: String,
        state: MarkerState,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::AuthorityAssertion { .. } => EventKind::AuthorityAssertion,
            EventPayload::EvidenceReference { .. } => EventKind::EvidenceReference,
            EventPayload::PhaseMarker { .. } => EventKind::PhaseMarker,
            EventPayload::Disclosure { .. } => EventKind::Disclosure,
            EventPayload::Contradiction { .. } => EventKind::Contradiction,
        }
    }
}

/// A validated process event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEvent {
    /// Position in the run's input stream
    pub sequence: usize,
    pub timestamp: Tick,
    pub source: EventSource,
    pub payload: EventPayload,
}

impl ProcessEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Everything except phase markers moves a run out of orientation.
    pub fn is_substantive(&self) -> bool {
        !matches!(self.payload, EventPayload::PhaseMarker { .. })
    }
}

/// Why an event was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MalformedReason {
    /// The source line could not be read as an event at all
    Unparseable { detail: String },
    MissingTimestamp,
    UnknownKind { kind: String },
    MissingField { field: String },
    InvalidField { field: String, detail: String },
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::Unparseable { detail } => write!(f, "unparseable ({detail})"),
            MalformedReason::MissingTimestamp => f.write_str("missing timestamp"),
            MalformedReason::UnknownKind { kind } => write!(f, "unknown kind '{kind}'"),
            MalformedReason::MissingField { field } => write!(f, "missing field '{field}'"),
            MalformedReason::InvalidField { field, detail } => {
                write!(f, "invalid field '{field}': {detail}")
            }
        }
    }
}

/// An event as extracted, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub source: EventSource,
    pub timestamp: Option<Tick>,
    /// Declared kind; `None` when the source could not be read
    pub kind: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RawEvent {
    pub fn new(source: EventSource, timestamp: Option<Tick>, kind: impl Into<String>) -> Self {
        Self {
            source,
            timestamp,
            kind: Some(kind.into()),
            fields: Map::new(),
        }
    }

    /// A placeholder for a source record that could not be decoded.
    pub fn unparseable(source: EventSource, detail: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("detail".to_string(), Value::String(detail.into()));
        Self {
            source,
            timestamp: None,
            kind: None,
            fields,
        }
    }

    /// Builder: set a field.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    fn text_field(&self, name: &str) -> Result<String, MalformedReason> {
        match self.fields.get(name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::Null) | None => Err(MalformedReason::MissingField {
                field: name.to_string(),
            }),
            Some(Value::String(_)) => Err(MalformedReason::MissingField {
                field: name.to_string(),
            }),
            Some(_) => Err(MalformedReason::InvalidField {
                field: name.to_string(),
                detail: "expected text".to_string(),
            }),
        }
    }

    fn optional_text(&self, name: &str) -> Option<String> {
        self.text_field(name).ok()
    }

    fn parsed_field<T: FromStr<Err = String>>(&self, name: &str) -> Result<T, MalformedReason> {
        self.text_field(name)?
            .parse()
            .map_err(|detail| MalformedReason::InvalidField {
                field: name.to_string(),
                detail,
            })
    }

    /// Validate into a typed event.
    pub fn validate(&self, sequence: usize) -> Result<ProcessEvent, MalformedReason> {
        let kind = match &self.kind {
            Some(kind) => kind,
            None => {
                let detail = self
                    .fields
                    .get("detail")
                    .and_then(Value::as_str)
                    .unwrap_or("unreadable record")
                    .to_string();
                return Err(MalformedReason::Unparseable { detail });
            }
        };
        let timestamp = self.timestamp.ok_or(MalformedReason::MissingTimestamp)?;
        if kind.trim().is_empty() {
            return Err(MalformedReason::MissingField {
                field: "kind".to_string(),
            });
        }
        let kind: EventKind = kind
            .parse()
            .map_err(|kind| MalformedReason::UnknownKind { kind })?;

        let payload = match kind {
            EventKind::AuthorityAssertion => EventPayload::AuthorityAssertion {
                excerpt: self.text_field("excerpt")?,
            },
            EventKind::EvidenceReference => EventPayload::EvidenceReference {
                evidence_id: normalize_evidence_id(&self.text_field("evidence_id")?),
                resolution: match self.fields.get("resolution") {
                    None | Some(Value::Null) => false,
                    Some(Value::Bool(b)) => *b,
                    Some(_) => {
                        return Err(MalformedReason::InvalidField {
                            field: "resolution".to_string(),
                            detail: "expected boolean".to_string(),
                        })
                    }
                },
            },
            EventKind::PhaseMarker => EventPayload::PhaseMarker {
                marker: self.parsed_field("marker")?,
            },
            EventKind::Disclosure => EventPayload::Disclosure {
                subject_label: self.text_field("subject_label")?,
                question_id: self.optional_text("question_id"),
                statement: self.text_field("statement")?,
            },
            EventKind::Contradiction => EventPayload::Contradiction {
                marker_id: self.text_field("marker_id")?,
                state: self.parsed_field("state")?,
            },
        };

        Ok(ProcessEvent {
            sequence,
            timestamp,
            source: self.source.clone(),
            payload,
        })
    }
}

/// Lower-case and collapse whitespace so "Exhibit  4" and "exhibit 4" match.
pub fn normalize_evidence_id(id: &str) -> String {
    id.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Read a timestamp value as a tick.
///
/// Accepts integer seconds, `hh:mm:ss` offsets and RFC 3339 instants (as
/// Unix seconds).
pub fn parse_tick(value: &Value) -> Option<Tick> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_tick_str(s),
        _ => None,
    }
}

/// String form of [`parse_tick`].
pub fn parse_tick_str(s: &str) -> Option<Tick> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S") {
        return Some(i64::from(t.num_seconds_from_midnight()));
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> EventSource {
        EventSource {
            artifact_id: Uuid::nil(),
            artifact_kind: ArtifactKind::Transcript,
            platform: None,
            line: Some(1),
        }
    }

    #[test]
    fn test_parse_tick_forms() {
        assert_eq!(parse_tick(&json!(42)), Some(42));
        assert_eq!(parse_tick(&json!("01:02:03")), Some(3723));
        assert_eq!(parse_tick(&json!("1970-01-01T00:01:00Z")), Some(60));
        assert_eq!(parse_tick(&json!("soon")), None);
        assert_eq!(parse_tick(&json!(null)), None);
    }

    #[test]
    fn test_validate_evidence_reference() {
        let raw = RawEvent::new(source(), Some(5), "evidence-reference")
            .with_field("evidence_id", "Exhibit   4");
        let event = raw.validate(0).unwrap();
        assert_eq!(
            event.payload,
            EventPayload::EvidenceReference {
                evidence_id: "exhibit 4".to_string(),
                resolution: false
            }
        );
    }

    #[test]
    fn test_validate_rejections() {
        let missing_ts = RawEvent::new(source(), None, "disclosure");
        assert_eq!(missing_ts.validate(0), Err(MalformedReason::MissingTimestamp));

        let unknown = RawEvent::new(source(), Some(1), "mood");
        assert!(matches!(unknown.validate(0), Err(MalformedReason::UnknownKind { .. })));

        let missing_field = RawEvent::new(source(), Some(1), "authority_assertion");
        assert_eq!(
            missing_field.validate(0),
            Err(MalformedReason::MissingField {
                field: "excerpt".to_string()
            })
        );

        let bad_marker = RawEvent::new(source(), Some(1), "phase_marker").with_field("marker", "recess");
        assert!(matches!(bad_marker.validate(0), Err(MalformedReason::InvalidField { .. })));

        let unreadable = RawEvent::unparseable(source(), "expected value at column 1");
        assert!(matches!(unreadable.validate(0), Err(MalformedReason::Unparseable { .. })));
    }

    #[test]
    fn test_payload_has_no_label_fields() {
        let raw = RawEvent::new(source(), Some(9), "disclosure")
            .with_field("subject_label", "J4")
            .with_field("statement", "I have served before.")
            .with_field("temperament", "anxious");
        let event = raw.validate(3).unwrap();
        let json = serde_json::to_value(&event.payload).unwrap();
        assert!(json.get("temperament").is_none());
        assert_eq!(json["kind"], "disclosure");
    }
}
