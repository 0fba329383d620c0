//! Public social exposure summary.
//!
//! Posts are counted and quoted only when the platform they came from is
//! cleared for passive viewing under the case's permission matrix.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use jurisdiction::{Action, Decision, PermissionMatrix};

use crate::artifact::SocialPost;
use crate::types::truncate_chars;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSnippet {
    pub platform: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSocialSummary {
    /// Tag counts, highest first, then by name
    pub topic_exposure_counts: Vec<TopicCount>,
    /// Verbatim snippets in capture order
    pub declared_positions: Vec<PostSnippet>,
    /// Posts left out because their platform is not cleared
    pub excluded_posts: usize,
}

/// Summarise posts, each paired with its artifact's platform.
pub fn summarize_public_social(
    posts: &[(Option<String>, SocialPost)],
    matrix: &PermissionMatrix,
    max_snippet_chars: usize,
) -> PublicSocialSummary {
    let mut topics: BTreeMap<String, usize> = BTreeMap::new();
    let mut summary = PublicSocialSummary::default();

    for (artifact_platform, post) in posts {
        let platform = post.platform.as_ref().or(artifact_platform.as_ref());
        let cleared = platform
            .map(|p| matrix.evaluate(p, Action::PassiveView) == Decision::Allowed)
            .unwrap_or(false);
        if !cleared {
            summary.excluded_posts += 1;
            continue;
        }

        for tag in &post.tags {
            *topics.entry(tag.clone()).or_default() += 1;
        }
        let text = post.public_text.as_deref().unwrap_or_default().trim();
        if !text.is_empty() {
            summary.declared_positions.push(PostSnippet {
                platform: platform.cloned().unwrap_or_default(),
                url: post.url.clone(),
                snippet: truncate_chars(text, max_snippet_chars),
            });
        }
    }

    let mut counts: Vec<TopicCount> = topics
        .into_iter()
        .map(|(topic, count)| TopicCount { topic, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));
    summary.topic_exposure_counts = counts;
    summary
}
