//! Observational analyzers over typed artifact payloads.
//!
//! Each analyzer rearranges or counts what the artifacts already say. None
//! of them score, rank or characterise a person; disagreements between two
//! records are surfaced as flags for counsel review and nothing more.

pub mod disclosure;
pub mod public_social;
pub mod venue;
pub mod voir_dire;

use serde::{Deserialize, Serialize};
use tracing::debug;

use jurisdiction::PermissionMatrix;

use crate::artifact::{Artifact, ArtifactPayload, PublicRecordRow, SjqRow, SocialPost, VenueDoc, VoirDireAnswer};
use crate::config::ForensicsConfig;
use crate::types::Result;

pub use disclosure::{disclosure_consistency_flags, DisclosureFlag};
pub use public_social::{summarize_public_social, PublicSocialSummary};
pub use venue::{venue_sensitivity_matrix, VenueSensitivity};
pub use voir_dire::{response_distribution, ResponseDistribution};

/// All analyzer outputs for one case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerOutputs {
    pub venue: Option<VenueSensitivity>,
    pub responses: Option<ResponseDistribution>,
    pub disclosure_flags: Option<Vec<DisclosureFlag>>,
    pub public_social: Option<PublicSocialSummary>,
}

/// Run every analyzer whose inputs are present.
///
/// When several artifacts of one kind exist, the most recently uploaded one
/// is used for venue data; row-oriented kinds are concatenated in upload
/// order.
pub fn analyze(
    artifacts: &[Artifact],
    matrix: &PermissionMatrix,
    config: &ForensicsConfig,
) -> Result<AnalyzerOutputs> {
    let mut venue: Option<VenueDoc> = None;
    let mut sjq: Vec<SjqRow> = Vec::new();
    let mut answers: Vec<VoirDireAnswer> = Vec::new();
    let mut records: Vec<PublicRecordRow> = Vec::new();
    let mut posts: Vec<(Option<String>, SocialPost)> = Vec::new();
    let mut seen_sjq = false;
    let mut seen_answers = false;
    let mut seen_social = false;

    for artifact in artifacts {
        match artifact.parse()? {
            ArtifactPayload::Venue(doc) => venue = Some(doc),
            ArtifactPayload::Sjq(rows) => {
                seen_sjq = true;
                sjq.extend(rows);
            }
            ArtifactPayload::VoirDire(rows) => {
                seen_answers = true;
                answers.extend(rows);
            }
            ArtifactPayload::PublicRecords(rows) => records.extend(rows),
            ArtifactPayload::PublicSocial(items) => {
                seen_social = true;
                posts.extend(items.into_iter().map(|p| (artifact.platform.clone(), p)));
            }
            ArtifactPayload::Transcript(_) => {}
        }
    }

    let outputs = AnalyzerOutputs {
        venue: venue.map(|doc| venue_sensitivity_matrix(&doc)),
        responses: seen_answers.then(|| response_distribution(&answers, config.max_answer_chars)),
        disclosure_flags: seen_sjq.then(|| disclosure_consistency_flags(&sjq, &records)),
        public_social: seen_social
            .then(|| summarize_public_social(&posts, matrix, config.max_snippet_chars)),
    };

    debug!(
        venue = outputs.venue.is_some(),
        responses = outputs.responses.is_some(),
        flags = outputs.disclosure_flags.as_ref().map(Vec::len).unwrap_or(0),
        social = outputs.public_social.is_some(),
        "Analyzers complete"
    );
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use chrono::Utc;
    use jurisdiction::{PlatformSpec, RulesEngine, RulesetInputs};

    #[test]
    fn test_analyze_only_present_inputs() {
        let matrix = RulesEngine::new()
            .compile(&RulesetInputs::new("US-ABA").with_platform(PlatformSpec::public("X")))
            .unwrap()
            .matrix
            .clone();
        let artifacts = vec![
            Artifact::new(
                ArtifactKind::Sjq,
                "juror_label,litigation_history_declared\nJ1,no\n",
                "sjq.csv",
                Utc::now(),
            ),
            Artifact::new(
                ArtifactKind::PublicRecords,
                "juror_label,field,value\nJ1,litigation_history,2017 civil matter\n",
                "records.csv",
                Utc::now(),
            ),
        ];

        let outputs = analyze(&artifacts, &matrix, &ForensicsConfig::default()).unwrap();
        assert!(outputs.venue.is_none());
        assert!(outputs.responses.is_none());
        assert!(outputs.public_social.is_none());
        assert_eq!(outputs.disclosure_flags.unwrap().len(), 1);
    }
}
