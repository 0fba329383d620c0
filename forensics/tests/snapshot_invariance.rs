//! Convergence snapshot behaviour across whole transcripts.

use chrono::Utc;

use forensics::{
    Artifact, ArtifactKind, EventExtractor, ForensicsConfig, ForensicsError, ForensicsKernel, Phase,
};
use jurisdiction::{PermissionMatrix, PlatformSpec, RulesEngine, RulesetInputs};

const BEFORE_CONVERGENCE: &str = "\
[00:00:10] Foreperson opened with a review of exhibit 4.
[00:02:00] [DISAGREEMENT OPEN: timeline]
[00:03:30] Juror 6 referenced exhibit 7 and the phone log.
[00:05:00] The judge said we must decide on the evidence presented.
[00:06:00] [CONVERGENCE]
";

fn matrix() -> PermissionMatrix {
    RulesEngine::new()
        .compile(&RulesetInputs::new("US-ABA").with_platform(PlatformSpec::public("X")))
        .unwrap()
        .matrix
        .clone()
}

fn run(text: &str) -> forensics::ForensicsRun {
    let config = ForensicsConfig::default();
    let artifact = Artifact::new(ArtifactKind::Transcript, text, "reporter", Utc::now());
    let events = EventExtractor::new(&config).unwrap().extract(&artifact).unwrap();
    let matrix = matrix();
    ForensicsKernel::new(&matrix).with_config(config).run(&events).unwrap()
}

#[test]
fn snapshot_is_invariant_under_later_events() {
    let baseline = run(BEFORE_CONVERGENCE);
    let baseline_snapshot = baseline.snapshot.clone().unwrap();

    let tails = [
        "[00:07:00] [RESOLVED: exhibit 4]\n",
        "[00:07:00] [DISAGREEMENT CLOSED: timeline]\n[00:08:00] [DISCUSSION]\n",
        "[00:07:00] [RECESS]\nno timestamp exhibit 9\n",
        "[00:07:00] The instruction was read again.\n[00:09:00] [CONVERGENCE]\n[00:09:30] [CLOSED]\n",
    ];

    for tail in tails {
        let extended = run(&format!("{BEFORE_CONVERGENCE}{tail}"));
        let snapshot = extended.snapshot.unwrap();
        assert_eq!(snapshot, baseline_snapshot, "tail: {tail}");
        assert_eq!(
            serde_json::to_vec(&snapshot).unwrap(),
            serde_json::to_vec(&baseline_snapshot).unwrap()
        );
        assert!(snapshot.verify().unwrap());
    }
}

#[test]
fn later_revisions_land_in_amendment_log() {
    let text = format!("{BEFORE_CONVERGENCE}[00:07:00] [RESOLVED: exhibit 4]\n[00:08:00] [DISCUSSION]\n");
    let run = run(&text);

    assert_eq!(run.amendments.len(), 2);
    assert!(run.ledgers.evidence["exhibit 4"].resolved);
    assert!(!run.snapshot.unwrap().ledgers().evidence["exhibit 4"].resolved);
    assert_eq!(run.final_phase, Phase::Closed);

    let unresolved: Vec<&str> = run.ledgers.unresolved().map(|e| e.evidence_id.as_str()).collect();
    assert_eq!(unresolved, vec!["exhibit 7"]);
}

#[test]
fn runs_are_deterministic() {
    let a = run(BEFORE_CONVERGENCE);
    let b = run(BEFORE_CONVERGENCE);
    assert_eq!(a.ledgers.digest().unwrap(), b.ledgers.digest().unwrap());
}

#[test]
fn unordered_transcript_rejected() {
    let config = ForensicsConfig::default();
    let artifact = Artifact::new(
        ArtifactKind::Transcript,
        "[00:00:10] exhibit 1\n[00:00:05] exhibit 2\n[00:00:20] exhibit 3\n",
        "reporter",
        Utc::now(),
    );
    let err = EventExtractor::new(&config)
        .unwrap()
        .extract_all(&[artifact])
        .unwrap_err();
    assert!(matches!(err, ForensicsError::UnorderedInput { previous: 10, found: 5, .. }));
}
