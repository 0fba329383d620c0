//! The deliberation process forensics kernel.
//!
//! A run walks the event stream once, in order:
//!
//! ```text
//! Orientation ──▶ Discussion ──▶ AuthorityAssertion ──▶ Convergence ──▶ Closed
//!                     ▲                  │                  │
//!                     └──── marker ──────┘           snapshot frozen
//! ```
//!
//! Ledger updates run for every admissible event regardless of phase and
//! never gate a transition. Once the convergence snapshot exists, events that
//! would revise snapshot-era state or move the run backwards are also written
//! to the amendment log; the snapshot itself is never touched again.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use jurisdiction::{Action, Decision, PermissionMatrix};

use crate::artifact::ArtifactKind;
use crate::chain::HashChain;
use crate::config::ForensicsConfig;
use crate::event::{EventPayload, MalformedReason, MarkerState, Phase, PhaseMarker, ProcessEvent, RawEvent};
use crate::ledger::{Amendment, AmendmentReason, ConvergenceSnapshot, Ledgers, PhaseTransition};
use crate::types::{truncate_chars, CancellationToken, ForensicsError, Result, Tick};

/// A non-fatal problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum RunWarning {
    /// The event was rejected and skipped
    Malformed {
        index: usize,
        artifact_id: Uuid,
        line: Option<usize>,
        reason: MalformedReason,
    },
    /// The event's source is not cleared by the permission matrix
    InadmissibleSource {
        index: usize,
        artifact_id: Uuid,
        platform: Option<String>,
    },
    /// A phase marker arrived in a phase that does not accept it
    MarkerIgnored {
        index: usize,
        marker: PhaseMarker,
        phase: Phase,
    },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::Malformed {
                index,
                artifact_id,
                line,
                reason,
            } => {
                write!(f, "event {index} from artifact {artifact_id}")?;
                if let Some(line) = line {
                    write!(f, " line {line}")?;
                }
                write!(f, " rejected: {reason}")
            }
            RunWarning::InadmissibleSource {
                index,
                artifact_id,
                platform,
            } => write!(
                f,
                "event {index} from artifact {artifact_id} skipped: source platform {} is not cleared for passive viewing",
                platform.as_deref().unwrap_or("(none)")
            ),
            RunWarning::MarkerIgnored {
                index,
                marker,
                phase,
            } => write!(
                f,
                "event {index}: {} marker recorded during {phase} phase and not applied",
                marker.target()
            ),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForensicsRun {
    /// Live ledgers at run end
    pub ledgers: Ledgers,
    /// Ledgers frozen at convergence, if convergence was reached
    pub snapshot: Option<ConvergenceSnapshot>,
    /// Post-convergence amendment log
    pub amendments: HashChain<Amendment>,
    pub warnings: Vec<RunWarning>,
    pub final_phase: Phase,
    /// Number of events applied
    pub applied_events: usize,
}

/// Runs the phase machine over an event stream.
pub struct ForensicsKernel<'a> {
    matrix: &'a PermissionMatrix,
    config: ForensicsConfig,
    cancel: Option<CancellationToken>,
}

impl<'a> ForensicsKernel<'a> {
    /// Kernel gated by a permission matrix.
    pub fn new(matrix: &'a PermissionMatrix) -> Self {
        Self {
            matrix,
            config: ForensicsConfig::default(),
            cancel: None,
        }
    }

    /// Builder: use a specific config.
    pub fn with_config(mut self, config: ForensicsConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder: honour a cancellation token until the snapshot is taken.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Whether events from this source may be used.
    ///
    /// Public social captures are admissible only from platforms where
    /// passive viewing is Allowed; other artifact kinds are court or
    /// questionnaire records and always are.
    pub fn is_admissible(&self, kind: ArtifactKind, platform: Option<&str>) -> bool {
        if kind != ArtifactKind::PublicSocial {
            return true;
        }
        platform
            .map(|p| self.matrix.evaluate(p, Action::PassiveView) == Decision::Allowed)
            .unwrap_or(false)
    }

    /// Run over events already in timestamp order.
    pub fn run(&self, events: &[RawEvent]) -> Result<ForensicsRun> {
        check_order(events)?;

        let mut state = RunState::new();

        for (index, raw) in events.iter().enumerate() {
            if state.snapshot.is_none() && self.is_cancelled() {
                info!(index = index, "Forensics run cancelled before snapshot");
                return Err(ForensicsError::Cancelled);
            }

            let event = match raw.validate(index) {
                Ok(event) => event,
                Err(reason) => {
                    debug!(index = index, reason = %reason, "Rejected malformed event");
                    state.warnings.push(RunWarning::Malformed {
                        index,
                        artifact_id: raw.source.artifact_id,
                        line: raw.source.line,
                        reason,
                    });
                    continue;
                }
            };

            if !self.is_admissible(event.source.artifact_kind, event.source.platform.as_deref()) {
                debug!(index = index, "Skipped inadmissible source");
                state.warnings.push(RunWarning::InadmissibleSource {
                    index,
                    artifact_id: event.source.artifact_id,
                    platform: event.source.platform.clone(),
                });
                continue;
            }

            self.apply(&mut state, event)?;
        }

        if state.applied == 0 {
            warn!(warnings = state.warnings.len(), "Forensics run had no valid events");
            return Err(ForensicsError::EmptyRun {
                warnings: state.warnings,
            });
        }

        if state.phase == Phase::Convergence {
            let at = state.last_tick;
            state.ledgers.timeline.append(PhaseTransition {
                at,
                sequence: events.len(),
                from: Phase::Convergence,
                to: Phase::Closed,
            })?;
            state.phase = Phase::Closed;
        }

        state.ledgers.verify()?;
        state.amendments.verify()?;

        info!(
            events = state.applied,
            warnings = state.warnings.len(),
            amendments = state.amendments.len(),
            phase = %state.phase,
            snapshot = state.snapshot.is_some(),
            "Forensics run complete"
        );

        Ok(ForensicsRun {
            ledgers: state.ledgers,
            snapshot: state.snapshot,
            amendments: state.amendments,
            warnings: state.warnings,
            final_phase: state.phase,
            applied_events: state.applied,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false)
    }

    fn apply(&self, state: &mut RunState, event: ProcessEvent) -> Result<()> {
        state.applied += 1;
        state.last_tick = event.timestamp;

        if state.phase == Phase::Orientation && event.is_substantive() {
            state.transition(&event, Phase::Discussion)?;
        }

        match &event.payload {
            EventPayload::AuthorityAssertion { excerpt } => {
                let excerpt = truncate_chars(excerpt, self.config.max_excerpt_chars);
                state.ledgers.record_authority(&event, excerpt)?;
                match state.phase {
                    Phase::Discussion => state.transition(&event, Phase::AuthorityAssertion)?,
                    current @ (Phase::Convergence | Phase::Closed) => state.amend(
                        &event,
                        AmendmentReason::PhaseReentry {
                            current,
                            attempted: Phase::AuthorityAssertion,
                        },
                    )?,
                    _ => {}
                }
            }
            EventPayload::EvidenceReference {
                evidence_id,
                resolution,
            } => {
                let revises = state
                    .snapshot
                    .as_ref()
                    .map(|s| s.ledgers().evidence.contains_key(evidence_id))
                    .unwrap_or(false);
                state.ledgers.record_evidence(&event, evidence_id, *resolution)?;
                if revises {
                    state.amend(
                        &event,
                        AmendmentReason::EvidenceRevision {
                            evidence_id: evidence_id.clone(),
                        },
                    )?;
                }
            }
            EventPayload::Contradiction { marker_id, state: marker_state } => {
                let open = *marker_state == MarkerState::Opened;
                let revises = !open
                    && state
                        .snapshot
                        .as_ref()
                        .map(|s| s.ledgers().open_disagreements.contains(marker_id))
                        .unwrap_or(false);
                state.ledgers.record_marker(&event, marker_id, open)?;
                if revises {
                    state.amend(
                        &event,
                        AmendmentReason::DissentRevision {
                            marker_id: marker_id.clone(),
                        },
                    )?;
                }
            }
            EventPayload::Disclosure {
                subject_label,
                question_id,
                statement,
            } => {
                state.ledgers.record_disclosure(
                    &event,
                    subject_label,
                    question_id.as_deref(),
                    statement,
                )?;
            }
            EventPayload::PhaseMarker { marker } => self.apply_marker(state, &event, *marker)?,
        }

        Ok(())
    }

    fn apply_marker(&self, state: &mut RunState, event: &ProcessEvent, marker: PhaseMarker) -> Result<()> {
        match (state.phase, marker) {
            (Phase::Orientation, PhaseMarker::Discussion)
            | (Phase::AuthorityAssertion, PhaseMarker::Discussion) => {
                state.transition(event, Phase::Discussion)?;
            }
            (Phase::Discussion, PhaseMarker::Discussion) => {}
            (Phase::AuthorityAssertion, PhaseMarker::Convergence) => {
                state.transition(event, Phase::Convergence)?;
                let snapshot = ConvergenceSnapshot::capture(&state.ledgers, event)?;
                info!(
                    at = event.timestamp,
                    digest = %snapshot.digest().short(),
                    "Convergence snapshot taken"
                );
                state.snapshot = Some(snapshot);
            }
            (Phase::Convergence, PhaseMarker::Closed) => {
                state.transition(event, Phase::Closed)?;
            }
            (Phase::Convergence | Phase::Closed, PhaseMarker::Convergence) => {
                state.amend(event, AmendmentReason::RepeatedConvergence)?;
            }
            (current @ (Phase::Convergence | Phase::Closed), PhaseMarker::Discussion)
            | (current @ Phase::Closed, PhaseMarker::Closed) => {
                state.amend(
                    event,
                    AmendmentReason::PhaseReentry {
                        current,
                        attempted: marker.target(),
                    },
                )?;
            }
            (phase, marker) => {
                debug!(index = event.sequence, phase = %phase, "Phase marker not applied");
                state.warnings.push(RunWarning::MarkerIgnored {
                    index: event.sequence,
                    marker,
                    phase,
                });
            }
        }
        Ok(())
    }
}

struct RunState {
    phase: Phase,
    ledgers: Ledgers,
    snapshot: Option<ConvergenceSnapshot>,
    amendments: HashChain<Amendment>,
    warnings: Vec<RunWarning>,
    applied: usize,
    last_tick: Tick,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: Phase::Orientation,
            ledgers: Ledgers::new(),
            snapshot: None,
            amendments: HashChain::new(),
            warnings: Vec::new(),
            applied: 0,
            last_tick: 0,
        }
    }

    fn transition(&mut self, event: &ProcessEvent, to: Phase) -> Result<()> {
        let from = self.phase;
        self.ledgers.record_transition(event, from, to)?;
        self.phase = to;
        debug!(from = %from, to = %to, at = event.timestamp, "Phase transition");
        Ok(())
    }

    fn amend(&mut self, event: &ProcessEvent, reason: AmendmentReason) -> Result<()> {
        debug!(index = event.sequence, reason = ?reason, "Post-convergence amendment");
        self.amendments.append(Amendment {
            at: event.timestamp,
            reason,
            event: event.clone(),
        })?;
        Ok(())
    }
}

/// Reject any decrease among the timestamps that are present.
fn check_order(events: &[RawEvent]) -> Result<()> {
    let mut previous: Option<Tick> = None;
    for (index, event) in events.iter().enumerate() {
        if let Some(found) = event.timestamp {
            if let Some(prev) = previous {
                if found < prev {
                    warn!(index = index, previous = prev, found = found, "Unordered forensics input");
                    return Err(ForensicsError::UnorderedInput {
                        index,
                        previous: prev,
                        found,
                    });
                }
            }
            previous = Some(found);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventSource;
    use jurisdiction::{PlatformSpec, RulesEngine, RulesetInputs};

    fn matrix() -> PermissionMatrix {
        let inputs = RulesetInputs::new("US-ABA")
            .with_platform(PlatformSpec::public("X"))
            .with_platform(PlatformSpec::public("Private").login_only());
        RulesEngine::new().compile(&inputs).unwrap().matrix.clone()
    }

    fn source() -> EventSource {
        EventSource {
            artifact_id: Uuid::nil(),
            artifact_kind: ArtifactKind::Transcript,
            platform: None,
            line: None,
        }
    }

    fn authority(t: Tick) -> RawEvent {
        RawEvent::new(source(), Some(t), "authority_assertion").with_field("excerpt", "The instruction reads")
    }

    fn evidence(t: Tick, id: &str, resolution: bool) -> RawEvent {
        RawEvent::new(source(), Some(t), "evidence_reference")
            .with_field("evidence_id", id)
            .with_field("resolution", resolution)
    }

    fn marker(t: Tick, m: &str) -> RawEvent {
        RawEvent::new(source(), Some(t), "phase_marker").with_field("marker", m)
    }

    fn dispute(t: Tick, id: &str, state: &str) -> RawEvent {
        RawEvent::new(source(), Some(t), "contradiction")
            .with_field("marker_id", id)
            .with_field("state", state)
    }

    fn converging_run() -> Vec<RawEvent> {
        vec![
            evidence(1, "exhibit 4", false),
            dispute(2, "d1", "open"),
            authority(3),
            marker(4, "convergence"),
        ]
    }

    #[test]
    fn test_phase_walk_and_snapshot() {
        let matrix = matrix();
        let run = ForensicsKernel::new(&matrix).run(&converging_run()).unwrap();

        let phases: Vec<Phase> = run.ledgers.timeline.iter().map(|t| t.to).collect();
        assert_eq!(
            phases,
            vec![Phase::Discussion, Phase::AuthorityAssertion, Phase::Convergence, Phase::Closed]
        );
        assert_eq!(run.final_phase, Phase::Closed);
        let snapshot = run.snapshot.unwrap();
        assert_eq!(snapshot.taken_at, 4);
        assert!(snapshot.verify().unwrap());
        assert!(run.amendments.is_empty());
    }

    #[test]
    fn test_unordered_input_rejected_before_mutation() {
        let matrix = matrix();
        let events = vec![evidence(10, "a", false), evidence(5, "b", false), evidence(20, "c", false)];
        let err = ForensicsKernel::new(&matrix).run(&events).unwrap_err();
        assert!(matches!(
            err,
            ForensicsError::UnorderedInput {
                index: 1,
                previous: 10,
                found: 5
            }
        ));
    }

    #[test]
    fn test_equal_timestamps_are_ordered() {
        let matrix = matrix();
        let events = vec![evidence(5, "a", false), evidence(5, "b", false)];
        assert!(ForensicsKernel::new(&matrix).run(&events).is_ok());
    }

    #[test]
    fn test_malformed_events_become_warnings() {
        let matrix = matrix();
        let events = vec![
            RawEvent::new(source(), None, "authority_assertion").with_field("excerpt", "x"),
            RawEvent::new(source(), Some(1), "sentiment"),
            evidence(2, "exhibit 1", false),
        ];
        let run = ForensicsKernel::new(&matrix).run(&events).unwrap();
        assert_eq!(run.applied_events, 1);
        assert_eq!(run.warnings.len(), 2);
        assert!(run.warnings[0].to_string().contains("missing timestamp"));
    }

    #[test]
    fn test_empty_run() {
        let matrix = matrix();
        let events = vec![RawEvent::new(source(), None, "disclosure")];
        let err = ForensicsKernel::new(&matrix).run(&events).unwrap_err();
        match err {
            ForensicsError::EmptyRun { warnings } => assert_eq!(warnings.len(), 1),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            ForensicsKernel::new(&matrix).run(&[]),
            Err(ForensicsError::EmptyRun { .. })
        ));
    }

    #[test]
    fn test_inadmissible_social_source() {
        let matrix = matrix();
        let social = |platform: &str, t: Tick| {
            RawEvent::new(
                EventSource {
                    artifact_id: Uuid::nil(),
                    artifact_kind: ArtifactKind::PublicSocial,
                    platform: Some(platform.to_string()),
                    line: None,
                },
                Some(t),
                "disclosure",
            )
            .with_field("subject_label", "J2")
            .with_field("statement", "Posted about the county fair.")
        };
        let events = vec![social("X", 1), social("Private", 2), social("Unlisted", 3)];
        let run = ForensicsKernel::new(&matrix).run(&events).unwrap();
        assert_eq!(run.ledgers.disclosures.len(), 1);
        let skipped = run
            .warnings
            .iter()
            .filter(|w| matches!(w, RunWarning::InadmissibleSource { .. }))
            .count();
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_convergence_before_authority_is_ignored() {
        let matrix = matrix();
        let events = vec![evidence(1, "a", false), marker(2, "convergence"), authority(3)];
        let run = ForensicsKernel::new(&matrix).run(&events).unwrap();
        assert!(run.snapshot.is_none());
        assert_eq!(run.final_phase, Phase::AuthorityAssertion);
        assert!(matches!(run.warnings[0], RunWarning::MarkerIgnored { .. }));
    }

    #[test]
    fn test_post_convergence_amendments() {
        let matrix = matrix();
        let mut events = converging_run();
        events.extend([
            evidence(5, "exhibit 4", true),
            evidence(6, "exhibit 9", false),
            dispute(7, "d1", "closed"),
            marker(8, "discussion"),
            authority(9),
            marker(10, "convergence"),
        ]);

        let run = ForensicsKernel::new(&matrix).run(&events).unwrap();
        let reasons: Vec<&AmendmentReason> = run.amendments.iter().map(|a| &a.reason).collect();
        assert_eq!(reasons.len(), 5);
        assert!(matches!(reasons[0], AmendmentReason::EvidenceRevision { .. }));
        assert!(matches!(reasons[1], AmendmentReason::DissentRevision { .. }));
        assert!(matches!(
            reasons[2],
            AmendmentReason::PhaseReentry {
                attempted: Phase::Discussion,
                ..
            }
        ));
        assert!(matches!(reasons[3], AmendmentReason::PhaseReentry { .. }));
        assert_eq!(reasons[4], &AmendmentReason::RepeatedConvergence);

        // Live ledgers keep recording
        assert!(run.ledgers.evidence["exhibit 4"].resolved);
        assert!(run.ledgers.evidence.contains_key("exhibit 9"));

        // The snapshot still shows the pre-convergence state
        let snapshot = run.snapshot.unwrap();
        assert!(!snapshot.ledgers().evidence["exhibit 4"].resolved);
        assert!(snapshot.ledgers().open_disagreements.contains("d1"));
        assert!(run.amendments.verify().is_ok());
    }

    #[test]
    fn test_cancellation_before_snapshot() {
        let matrix = matrix();
        let token = CancellationToken::new();
        token.cancel();
        let err = ForensicsKernel::new(&matrix)
            .with_cancellation(token)
            .run(&converging_run())
            .unwrap_err();
        assert!(matches!(err, ForensicsError::Cancelled));
    }

    #[test]
    fn test_excerpt_truncated() {
        let matrix = matrix();
        let config = ForensicsConfig {
            max_excerpt_chars: 8,
            ..Default::default()
        };
        let run = ForensicsKernel::new(&matrix)
            .with_config(config)
            .run(&[authority(1)])
            .unwrap();
        assert_eq!(run.ledgers.authority.iter().next().unwrap().excerpt, "The inst");
    }
}
