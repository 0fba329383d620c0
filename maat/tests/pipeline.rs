//! End-to-end report runs over an in-memory store.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use forensics::{ArtifactKind, CancellationToken, ForensicsError};
use jurisdiction::hashing::hash_bytes;
use jurisdiction::{Action, Decision, PlatformSpec, RulesetInputs};
use maat::{ArtifactUpload, MaatService, ManualClock, SectionKind, ServiceError};

const TRANSCRIPT: &str = "\
[00:00:10] Foreperson opened with a review of exhibit 4.
[00:02:00] [DISAGREEMENT OPEN: timeline]
[00:03:30] Juror 6 referenced exhibit 7 and the phone log.
[00:05:00] The judge said we must decide on the evidence presented.
[00:06:00] [CONVERGENCE]
[00:07:00] [RESOLVED: exhibit 4]
";

const VENUE: &str = r#"{
  "venue": "Travis County",
  "themes": [
    {"theme": "local employers", "salience": 4, "notes": "Frequent coverage in regional news"},
    {"theme": "road safety", "salience": 2, "notes": ""}
  ],
  "volatility_zones": []
}"#;

const SJQ: &str = "juror_label,litigation_history_declared\nJ1,no\nJ2,yes\n";

const PUBLIC_RECORDS: &str = "juror_label,field,value\nJ1,litigation_history,small claims 2019\n";

const VOIR_DIRE: &str = r#"{"juror_label":"J1","question_id":"Q1","question_text":"Have you served before?","answer_text":"Once, in 2015.","timestamp":"00:00:01"}
{"juror_label":"J2","question_id":"Q1","question_text":"Have you served before?","answer_text":"No.","timestamp":"00:00:02"}
"#;

const SOCIAL_X: &str = r#"[{"url":"https://x.invalid/1","public_text":"Weekend at the lake","tags":["outdoors"],"juror_label":"J1","timestamp":30}]"#;

const SOCIAL_FACEBOOK: &str = r#"[{"url":"https://facebook.invalid/1","public_text":"Went fishing","tags":["outdoors","family"],"juror_label":"J2","timestamp":40}]"#;

fn inputs() -> RulesetInputs {
    RulesetInputs::new("US-ABA")
        .with_platform(PlatformSpec::public("X"))
        .with_platform(PlatformSpec::public("Facebook"))
        .with_standing_order("No view that can notify jurors on X.")
}

fn service() -> MaatService {
    let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
    MaatService::in_memory().with_clock(Arc::new(ManualClock::starting_at(start)))
}

fn transcript(text: &str) -> ArtifactUpload {
    ArtifactUpload::new(ArtifactKind::Transcript, text, "court reporter")
}

fn full_case() -> Vec<ArtifactUpload> {
    vec![
        transcript(TRANSCRIPT),
        ArtifactUpload::new(ArtifactKind::Venue, VENUE, "venue.json"),
        ArtifactUpload::new(ArtifactKind::Sjq, SJQ, "sjq.csv"),
        ArtifactUpload::new(ArtifactKind::PublicRecords, PUBLIC_RECORDS, "records.csv"),
        ArtifactUpload::new(ArtifactKind::VoirDire, VOIR_DIRE, "voir_dire.jsonl"),
        ArtifactUpload::new(ArtifactKind::PublicSocial, SOCIAL_X, "x.json").on_platform("X"),
        ArtifactUpload::new(ArtifactKind::PublicSocial, SOCIAL_FACEBOOK, "fb.json").on_platform("Facebook"),
    ]
}

#[tokio::test]
async fn notify_order_gates_platform_and_report() {
    let service = service();
    service.attach_ruleset("case-1", inputs()).await.unwrap();
    service.ingest_artifacts("case-1", full_case()).await.unwrap();

    assert_ne!(
        service.evaluate("case-1", "X", Action::PassiveView).await,
        Decision::Allowed
    );
    assert_eq!(
        service.evaluate("case-1", "Facebook", Action::PassiveView).await,
        Decision::Allowed
    );
    for action in Action::HARD_BLOCKED {
        assert_eq!(service.evaluate("case-1", "Facebook", action).await, Decision::Blocked);
    }

    let generated = service.generate_report("case-1").await.unwrap();
    let report = &generated.report;

    let kinds: Vec<SectionKind> = report.sections.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, SectionKind::ALL.to_vec());
    assert!(report.verify());

    // X capture skipped, Facebook capture summarised
    let warnings = &report.sections[SectionKind::RunWarnings as usize].body;
    assert!(warnings.contains("skipped: source platform X is not cleared for passive viewing"));
    let social = &report.sections[SectionKind::PublicSocialSummary as usize].body;
    assert!(social.contains("\"excluded_posts\": 1"));
    assert!(social.contains("Went fishing"));
    assert!(!social.contains("Weekend at the lake"));

    let flags = &report.sections[SectionKind::DisclosureConsistencyFlags as usize].body;
    assert!(flags.contains("\"juror\": \"J1\""));
    assert!(report.rendered.contains("exhibit 4 referenced again"));
    assert!(report.rendered.contains("exhibit 7: first referenced 00:03:30"));

    assert!(generated.forensics.snapshot.is_some());
    service.verify_audit(report.id).await.unwrap();
}

#[tokio::test]
async fn aggregate_digest_reproducible_from_files() {
    let service = service();
    let ruleset = service.attach_ruleset("case-1", inputs()).await.unwrap();
    let uploads = full_case();
    let contents: Vec<Vec<u8>> = uploads.iter().map(|u| u.content.clone()).collect();
    service.ingest_artifacts("case-1", uploads).await.unwrap();

    let generated = service.generate_report("case-1").await.unwrap();
    let packet = service.get_audit_packet(generated.report.id).await.unwrap();

    let mut lines = vec![ruleset.content_hash.to_string()];
    lines.extend(contents.iter().map(|c| hash_bytes(c).to_string()));
    lines.push(hash_bytes(generated.report.rendered.as_bytes()).to_string());
    assert_eq!(packet.aggregate_digest, hash_bytes(lines.join("\n").as_bytes()));

    packet.verify().unwrap();
    packet.verify_inputs(&contents).unwrap();
    packet.verify_report(generated.report.rendered.as_bytes()).unwrap();
}

#[tokio::test]
async fn integrity_halt_stores_nothing() {
    let service = service();
    service.attach_ruleset("case-1", inputs()).await.unwrap();
    service
        .ingest_artifact(
            "case-1",
            transcript("[00:00:10] The judge said the outcome was predicted.\n"),
        )
        .await
        .unwrap();

    let err = service.generate_report("case-1").await.unwrap_err();
    match err {
        ServiceError::IntegrityHalt { violations } => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].violation.surface, "predicted");
        }
        other => panic!("expected integrity halt, got {other:?}"),
    }

    assert!(service.latest_report("case-1").await.is_none());
    assert!(service.report_history("case-1").await.is_empty());
    assert!(service.store().last_forensics("case-1").await.is_none());
    // Guard released
    service.try_begin_run("case-1").unwrap();
}

#[tokio::test]
async fn ruleset_forbidden_terms_extend_firewall() {
    let service = service();
    let mut inputs = inputs();
    inputs.forbidden_terms = vec!["fishing".to_string()];
    service.attach_ruleset("case-1", inputs).await.unwrap();
    service.ingest_artifacts("case-1", full_case()).await.unwrap();

    let err = service.generate_report("case-1").await.unwrap_err();
    assert!(matches!(err, ServiceError::IntegrityHalt { .. }));
}

#[tokio::test]
async fn concurrent_run_rejected() {
    let service = service();
    service.attach_ruleset("case-1", inputs()).await.unwrap();
    service.ingest_artifact("case-1", transcript(TRANSCRIPT)).await.unwrap();

    let guard = service.try_begin_run("case-1").unwrap();
    let err = service.generate_report("case-1").await.unwrap_err();
    assert!(matches!(err, ServiceError::RunInProgress(_)));

    drop(guard);
    service.generate_report("case-1").await.unwrap();
}

#[tokio::test]
async fn different_cases_run_in_parallel() {
    let service = service();
    for case in ["a", "b"] {
        service.attach_ruleset(case, inputs()).await.unwrap();
        service.ingest_artifact(case, transcript(TRANSCRIPT)).await.unwrap();
    }

    let (a, b) = tokio::join!(service.generate_report("a"), service.generate_report("b"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.report.case_id, "a");
    assert_eq!(b.report.case_id, "b");
    assert_eq!(a.packet.ruleset_hash, b.packet.ruleset_hash);
}

#[tokio::test]
async fn later_runs_supersede() {
    let service = service();
    service.attach_ruleset("case-1", inputs()).await.unwrap();
    service.ingest_artifact("case-1", transcript(TRANSCRIPT)).await.unwrap();

    let first = service.generate_report("case-1").await.unwrap();
    let ruleset = service
        .attach_ruleset("case-1", inputs().with_standing_order("No social media research."))
        .await
        .unwrap();
    assert_eq!(ruleset.version, 2);
    let second = service.generate_report("case-1").await.unwrap();

    assert_eq!(second.report.supersedes, Some(first.report.id));
    assert_ne!(first.packet.ruleset_hash, second.packet.ruleset_hash);
    assert_eq!(second.packet.ruleset_hash, ruleset.content_hash);
    assert_eq!(service.latest_report("case-1").await.unwrap().id, second.report.id);

    let history = service.report_history("case-1").await;
    assert_eq!(history.len(), 2);
    service.verify_audit(first.report.id).await.unwrap();
    service.verify_audit(second.report.id).await.unwrap();
}

#[tokio::test]
async fn identical_inputs_render_identically() {
    let a = service();
    let b = service();
    for service in [&a, &b] {
        service.attach_ruleset("case-1", inputs()).await.unwrap();
        service.ingest_artifact("case-1", transcript(TRANSCRIPT)).await.unwrap();
    }
    let ra = a.generate_report("case-1").await.unwrap();
    let rb = b.generate_report("case-1").await.unwrap();
    assert_eq!(ra.report.rendered, rb.report.rendered);
    assert_eq!(ra.packet.aggregate_digest, rb.packet.aggregate_digest);
}

#[tokio::test]
async fn cancellation_before_snapshot_has_no_effect() {
    let service = service();
    service.attach_ruleset("case-1", inputs()).await.unwrap();
    service.ingest_artifact("case-1", transcript(TRANSCRIPT)).await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = service
        .generate_report_with_cancel("case-1", token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forensics(ForensicsError::Cancelled)));
    assert!(service.latest_report("case-1").await.is_none());
}

#[tokio::test]
async fn unordered_transcript_rejected() {
    let service = service();
    service.attach_ruleset("case-1", inputs()).await.unwrap();
    service
        .ingest_artifact(
            "case-1",
            transcript("[00:00:10] exhibit 1\n[00:00:05] exhibit 2\n[00:00:20] exhibit 3\n"),
        )
        .await
        .unwrap();

    let err = service.generate_report("case-1").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Forensics(ForensicsError::UnorderedInput { .. })
    ));
}

#[tokio::test]
async fn empty_run_reports_error() {
    let service = service();
    service.attach_ruleset("case-1", inputs()).await.unwrap();
    service
        .ingest_artifact("case-1", ArtifactUpload::new(ArtifactKind::Venue, VENUE, "venue.json"))
        .await
        .unwrap();

    let err = service.run_forensics("case-1").await.unwrap_err();
    assert!(matches!(err, ServiceError::Forensics(ForensicsError::EmptyRun { .. })));
}
