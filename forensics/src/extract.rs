//! Event extraction from stored artifacts.
//!
//! Transcripts come in two shapes. JSON Lines transcripts carry raw events
//! directly. Annotated transcripts are lines of the form `[hh:mm:ss] text`,
//! where bracketed markers and a small set of cue phrases produce events:
//!
//! | Marker / cue                    | Event                           |
//! |---------------------------------|---------------------------------|
//! | `[DISCUSSION]`                  | phase marker (discussion)       |
//! | `[CONVERGENCE]`                 | phase marker (convergence)      |
//! | `[CLOSED]`                      | phase marker (closed)           |
//! | `[RESOLVED: exhibit 4]`         | evidence reference, resolving   |
//! | `[UNRESOLVED: exhibit 4]`       | evidence reference              |
//! | `[DISAGREEMENT OPEN: d1]`       | contradiction opened            |
//! | `[DISAGREEMENT CLOSED: d1]`     | contradiction closed            |
//! | "exhibit 4" in the text         | evidence reference              |
//! | configured authority cue        | authority assertion (excerpt)   |
//!
//! Any other bracketed marker is passed through under its own name so the
//! kernel records it as an unknown kind rather than dropping it silently.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::artifact::{Artifact, ArtifactKind, ArtifactPayload};
use crate::config::ForensicsConfig;
use crate::event::{parse_tick, parse_tick_str, EventKind, EventSource, RawEvent};
use crate::types::{ForensicsError, Result, Tick};

/// Compiled transcript patterns.
struct TranscriptPatterns {
    line: Regex,
    marker: Regex,
    exhibit: Regex,
    /// Case-insensitive alternation of the configured authority cues
    authority: Option<Regex>,
}

impl TranscriptPatterns {
    fn compile(cues: &[String]) -> std::result::Result<Self, regex::Error> {
        let escaped: Vec<String> = cues
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(regex::escape)
            .collect();
        let authority = if escaped.is_empty() {
            None
        } else {
            Some(Regex::new(&format!("(?i){}", escaped.join("|")))?)
        };

        Ok(Self {
            line: Regex::new(r"^\s*\[(\d{1,2}:\d{2}:\d{2})\]\s*(.*)$")?,
            marker: Regex::new(r"\[([A-Za-z][A-Za-z ]*?)(?::\s*([^\]]*))?\]")?,
            exhibit: Regex::new(r"(?i)\bexhibit\s+([A-Za-z0-9][A-Za-z0-9-]*)")?,
            authority,
        })
    }
}

/// Extracts raw events from artifacts.
pub struct EventExtractor {
    patterns: TranscriptPatterns,
}

impl EventExtractor {
    pub fn new(config: &ForensicsConfig) -> Result<Self> {
        Ok(Self {
            patterns: TranscriptPatterns::compile(&config.authority_cues)?,
        })
    }

    /// Events from one artifact, in artifact order.
    ///
    /// Kinds that feed analyzers only (venue, questionnaires, public records)
    /// yield no events.
    pub fn extract(&self, artifact: &Artifact) -> Result<Vec<RawEvent>> {
        let events = match artifact.parse()? {
            ArtifactPayload::Transcript(text) => self.transcript(artifact, &text),
            ArtifactPayload::VoirDire(answers) => answers
                .iter()
                .enumerate()
                .map(|(i, answer)| {
                    let mut event = RawEvent::new(
                        source(artifact, None, Some(i + 1)),
                        answer.timestamp.as_ref().and_then(parse_tick),
                        EventKind::Disclosure.as_str(),
                    )
                    .with_field("subject_label", answer.juror_label.clone())
                    .with_field("statement", answer.answer_text.clone().unwrap_or_default());
                    if let Some(qid) = &answer.question_id {
                        event = event.with_field("question_id", qid.clone());
                    }
                    event
                })
                .collect(),
            ArtifactPayload::PublicSocial(posts) => posts
                .iter()
                .enumerate()
                .map(|(i, post)| {
                    let platform = post.platform.clone().or_else(|| artifact.platform.clone());
                    RawEvent::new(
                        source(artifact, platform, Some(i + 1)),
                        post.timestamp.as_ref().and_then(parse_tick),
                        EventKind::Disclosure.as_str(),
                    )
                    .with_field("subject_label", post.juror_label.clone().unwrap_or_default())
                    .with_field("statement", post.public_text.clone().unwrap_or_default())
                })
                .collect(),
            ArtifactPayload::Venue(_) | ArtifactPayload::Sjq(_) | ArtifactPayload::PublicRecords(_) => {
                Vec::new()
            }
        };

        debug!(
            artifact_id = %artifact.id,
            kind = %artifact.kind,
            events = events.len(),
            "Extracted events"
        );
        Ok(events)
    }

    /// Events from several artifacts, merged by timestamp.
    ///
    /// Each artifact's own stream must already be in order; a decrease within
    /// one stream is reported as unordered input. Streams are then merged
    /// stably: equal timestamps keep upload order, and events without a
    /// timestamp stay behind their stream predecessor.
    pub fn extract_all(&self, artifacts: &[Artifact]) -> Result<Vec<RawEvent>> {
        let mut keyed: Vec<(Tick, usize, usize, RawEvent)> = Vec::new();
        let mut offset = 0usize;

        for (stream, artifact) in artifacts.iter().enumerate() {
            let events = self.extract(artifact)?;
            let mut previous: Option<Tick> = None;
            for (pos, event) in events.into_iter().enumerate() {
                if let Some(found) = event.timestamp {
                    if let Some(prev) = previous {
                        if found < prev {
                            return Err(ForensicsError::UnorderedInput {
                                index: offset + pos,
                                previous: prev,
                                found,
                            });
                        }
                    }
                    previous = Some(found);
                }
                keyed.push((previous.unwrap_or(Tick::MIN), stream, pos, event));
            }
            offset = keyed.len();
        }

        keyed.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
        Ok(keyed.into_iter().map(|(_, _, _, event)| event).collect())
    }

    fn transcript(&self, artifact: &Artifact, text: &str) -> Vec<RawEvent> {
        let is_jsonl = text
            .lines()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim_start().starts_with('{'))
            .unwrap_or(false);

        if is_jsonl {
            self.transcript_jsonl(artifact, text)
        } else {
            self.transcript_annotated(artifact, text)
        }
    }

    fn transcript_jsonl(&self, artifact: &Artifact, text: &str) -> Vec<RawEvent> {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                let src = source(artifact, artifact.platform.clone(), Some(i + 1));
                match serde_json::from_str::<Map<String, Value>>(line) {
                    Ok(mut fields) => {
                        let timestamp = fields.remove("timestamp").as_ref().and_then(parse_tick);
                        let kind = fields
                            .remove("kind")
                            .and_then(|k| k.as_str().map(str::to_string))
                            .unwrap_or_default();
                        RawEvent {
                            source: src,
                            timestamp,
                            kind: Some(kind),
                            fields,
                        }
                    }
                    Err(e) => RawEvent::unparseable(src, e.to_string()),
                }
            })
            .collect()
    }

    fn transcript_annotated(&self, artifact: &Artifact, text: &str) -> Vec<RawEvent> {
        let mut events = Vec::new();

        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (timestamp, body) = match self.patterns.line.captures(line) {
                Some(caps) => (
                    caps.get(1).and_then(|m| parse_tick_str(m.as_str())),
                    caps.get(2).map(|m| m.as_str()).unwrap_or_default(),
                ),
                None => (None, line.trim()),
            };
            let src = || source(artifact, None, Some(i + 1));
            let before = events.len();

            for caps in self.patterns.marker.captures_iter(body) {
                let name = caps
                    .get(1)
                    .map(|m| m.as_str().trim().to_ascii_uppercase())
                    .unwrap_or_default();
                let arg = caps.get(2).map(|m| m.as_str().trim().to_string());
                events.push(marker_event(src(), timestamp, &name, arg));
            }

            let prose = self.patterns.marker.replace_all(body, " ");
            let prose = prose.split_whitespace().collect::<Vec<_>>().join(" ");

            if self
                .patterns
                .authority
                .as_ref()
                .map(|re| re.is_match(&prose))
                .unwrap_or(false)
            {
                events.push(
                    RawEvent::new(src(), timestamp, EventKind::AuthorityAssertion.as_str())
                        .with_field("excerpt", prose.clone()),
                );
            }

            for caps in self.patterns.exhibit.captures_iter(&prose) {
                if let Some(id) = caps.get(1) {
                    events.push(
                        RawEvent::new(src(), timestamp, EventKind::EvidenceReference.as_str())
                            .with_field("evidence_id", format!("exhibit {}", id.as_str())),
                    );
                }
            }

            if events.len() == before && timestamp.is_none() {
                debug!(line = i + 1, "Transcript line without timestamp or events");
            }
        }

        events
    }
}

fn source(artifact: &Artifact, platform: Option<String>, line: Option<usize>) -> EventSource {
    EventSource {
        artifact_id: artifact.id,
        artifact_kind: artifact.kind,
        platform: if artifact.kind == ArtifactKind::PublicSocial {
            platform
        } else {
            None
        },
        line,
    }
}

fn marker_event(src: EventSource, timestamp: Option<Tick>, name: &str, arg: Option<String>) -> RawEvent {
    let arg = arg.unwrap_or_default();
    match name {
        "DISCUSSION" | "CONVERGENCE" | "CLOSED" => {
            RawEvent::new(src, timestamp, EventKind::PhaseMarker.as_str())
                .with_field("marker", name.to_ascii_lowercase())
        }
        "RESOLVED" | "UNRESOLVED" => RawEvent::new(src, timestamp, EventKind::EvidenceReference.as_str())
            .with_field("evidence_id", arg)
            .with_field("resolution", name == "RESOLVED"),
        "DISAGREEMENT OPEN" | "DISAGREEMENT CLOSED" => {
            RawEvent::new(src, timestamp, EventKind::Contradiction.as_str())
                .with_field("marker_id", arg)
                .with_field("state", if name.ends_with("OPEN") { "opened" } else { "closed" })
        }
        other => RawEvent::new(src, timestamp, other.to_ascii_lowercase()).with_field("detail", arg),
    }
}
