//! Standing-order clause catalog.
//!
//! Matching free-text standing orders is heuristic, so it is kept as data:
//! each [`ClauseTemplate`] maps a set of trigger phrases to the cells it
//! restricts. The compiler only ever applies matches by tightening; adding a
//! template can never make a compiled matrix more permissive.
//!
//! Matching runs per sentence over normalised text (lower-cased, punctuation
//! folded to spaces, whitespace collapsed) and only on whole-word boundaries.
//! A clause applies to the platforms named in the same sentence, or to every
//! platform when the sentence names none.

use serde::{Deserialize, Serialize};

use crate::types::{Action, Decision, NotificationRiskLevel, PlatformSpec};

/// A known restrictive clause pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseTemplate {
    /// Stable identifier recorded in compile output
    pub id: String,
    /// What the clause restricts, for audit listings
    pub description: String,
    /// Trigger phrases; any one matching is enough
    pub phrases: Vec<String>,
    /// Cells the clause restricts
    pub actions: Vec<Action>,
    /// Restriction applied to every targeted platform
    pub restriction: Decision,
    /// Stronger restriction for platforms that can notify the account holder
    #[serde(default)]
    pub notifying_restriction: Option<Decision>,
    /// Clauses that, when matched in the same sentence, take this one's place
    #[serde(default)]
    pub yields_to: Vec<String>,
}

impl ClauseTemplate {
    fn new(
        id: &str,
        description: &str,
        phrases: &[&str],
        actions: &[Action],
        restriction: Decision,
    ) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            phrases: phrases.iter().map(|p| normalize(p)).collect(),
            actions: actions.to_vec(),
            restriction,
            notifying_restriction: None,
            yields_to: Vec::new(),
        }
    }

    fn notifying(mut self, restriction: Decision) -> Self {
        self.notifying_restriction = Some(restriction);
        self
    }

    fn yields_to(mut self, ids: &[&str]) -> Self {
        self.yields_to = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Restriction for a given platform.
    pub fn restriction_for(&self, platform: &PlatformSpec) -> Decision {
        match self.notifying_restriction {
            Some(stronger) if platform.notification_risk != NotificationRiskLevel::None => {
                self.restriction.tighten(stronger)
            }
            _ => self.restriction,
        }
    }

    /// First trigger phrase found in a normalised sentence.
    fn find_phrase(&self, padded_sentence: &str) -> Option<&str> {
        self.phrases
            .iter()
            .find(|p| !p.is_empty() && padded_sentence.contains(&format!(" {p} ")))
            .map(|p| p.as_str())
    }
}

/// One clause matched in one sentence of a standing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseMatch {
    /// Template that matched
    pub clause_id: String,
    /// Zero-based sentence index in the standing order
    pub sentence: usize,
    /// Trigger phrase that matched (normalised)
    pub phrase: String,
    /// Platform keys the clause applies to
    pub platforms: Vec<String>,
    /// Actions restricted
    pub actions: Vec<Action>,
}

/// An auditable, extendable table of clause templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseCatalog {
    templates: Vec<ClauseTemplate>,
}

impl ClauseCatalog {
    /// Catalog with the built-in templates.
    pub fn builtin() -> Self {
        let viewing = Action::VIEWING;
        let templates = vec![
            ClauseTemplate::new(
                "notifying-view",
                "Views that can notify a juror",
                &[
                    "can notify",
                    "could notify",
                    "may notify",
                    "might notify",
                    "would notify",
                    "notify the juror",
                    "notify jurors",
                    "notify a juror",
                    "notify any juror",
                    "notification to the juror",
                    "notifications to jurors",
                    "alert the juror",
                    "platforms with notifications",
                ],
                &viewing,
                Decision::NotificationRisk,
            )
            .notifying(Decision::Blocked),
            ClauseTemplate::new(
                "no-research",
                "No research of jurors",
                &[
                    "no research",
                    "no juror research",
                    "no social media research",
                    "no internet research",
                    "no online research",
                    "shall not research",
                    "shall not conduct research",
                    "shall not conduct any research",
                    "not conduct any research",
                    "prohibited from researching",
                    "may not research",
                ],
                &viewing,
                Decision::Blocked,
            ),
            ClauseTemplate::new(
                "no-view",
                "No viewing of juror content",
                &[
                    "no view of",
                    "no viewing",
                    "shall not view",
                    "may not view",
                    "must not view",
                    "not to view",
                    "prohibited from viewing",
                ],
                &viewing,
                Decision::Blocked,
            )
            .yields_to(&["notifying-view"]),
            ClauseTemplate::new(
                "public-only",
                "Only publicly available content, no logged-in viewing",
                &[
                    "log in",
                    "logged in",
                    "login",
                    "create an account",
                    "publicly available information only",
                    "only publicly available",
                    "public portions only",
                ],
                &[Action::LoggedInView],
                Decision::Blocked,
            ),
            ClauseTemplate::new(
                "no-search",
                "No searching for juror profiles",
                &[
                    "no searching",
                    "no search of",
                    "no search for",
                    "shall not search",
                    "may not search",
                    "not search for",
                ],
                &[Action::ProfileSearch],
                Decision::Blocked,
            ),
        ];
        Self { templates }
    }

    /// Empty catalog.
    pub fn empty() -> Self {
        Self {
            templates: Vec::new(),
        }
    }

    /// Add a template. Phrases are normalised on insertion.
    pub fn push(&mut self, mut template: ClauseTemplate) {
        template.phrases = template.phrases.iter().map(|p| normalize(p)).collect();
        self.templates.push(template);
    }

    /// All templates.
    pub fn templates(&self) -> &[ClauseTemplate] {
        &self.templates
    }

    /// Look up a template by id.
    pub fn get(&self, id: &str) -> Option<&ClauseTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Match a standing order against the catalog.
    pub fn match_text(&self, text: &str, platforms: &[PlatformSpec]) -> Vec<ClauseMatch> {
        let mut matches = Vec::new();

        for (index, sentence) in split_sentences(text).iter().enumerate() {
            let padded = format!(" {} ", normalize(sentence));

            let hits: Vec<(&ClauseTemplate, &str)> = self
                .templates
                .iter()
                .filter_map(|t| t.find_phrase(&padded).map(|p| (t, p)))
                .collect();

            let mentioned: Vec<String> = platforms
                .iter()
                .filter(|p| {
                    let name = normalize(&p.name);
                    !name.is_empty() && padded.contains(&format!(" {name} "))
                })
                .map(|p| p.key())
                .collect();

            let targets = if mentioned.is_empty() {
                platforms.iter().map(|p| p.key()).collect()
            } else {
                mentioned
            };

            for (template, phrase) in &hits {
                let superseded = template
                    .yields_to
                    .iter()
                    .any(|id| hits.iter().any(|(other, _)| &other.id == id));
                if superseded {
                    continue;
                }

                matches.push(ClauseMatch {
                    clause_id: template.id.clone(),
                    sentence: index,
                    phrase: phrase.to_string(),
                    platforms: targets.clone(),
                    actions: template.actions.clone(),
                });
            }
        }

        matches
    }
}

impl Default for ClauseCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lower-case, fold punctuation to spaces, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split(|c| matches!(c, '.' | ';' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
