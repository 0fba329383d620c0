//! Output language firewall.
//!
//! Narrative text is tokenized into lower-cased word units and checked
//! against a deny list of causal, diagnostic and predictive vocabulary (with
//! known inflections) and an allow list of observational verbs. A single deny
//! hit anywhere halts the whole document. Negation and hedging are not
//! interpreted: "was not predicted" halts exactly like "was predicted".

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Built-in deny list, grouped by root term.
const DENY_TERMS: &[&str] = &[
    // causal
    "cause", "causes", "caused", "causing", "causation",
    // manipulation
    "manipulate", "manipulates", "manipulated", "manipulating", "manipulation", "manipulative",
    // intent
    "intend", "intends", "intended", "intending", "intention", "intentional", "intentionally",
    // diagnosis
    "diagnose", "diagnoses", "diagnosed", "diagnosing", "diagnosis", "diagnostic",
    // prediction
    "predict", "predicts", "predicted", "predicting", "prediction", "predictions", "predictive",
    // bias as a personal claim
    "is biased", "was biased", "are biased", "were biased", "be biased", "been biased",
    "biased against", "biased toward", "biased towards", "biased juror", "biased jurors",
    // profiling vocabulary
    "archetype", "archetypes", "trauma", "traumatic", "traumatized",
    "verdict slant", "personality type", "personality types", "enneagram", "mbti",
];

/// Observational verbs and phrases counted as allow-list hits.
const ALLOW_TERMS: &[&str] = &[
    "observed", "recorded", "stated", "disclosed", "referenced", "shifted", "coincided",
    "remained unresolved",
];

/// One offending phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Violation {
    /// The phrase as it appears in the text
    pub surface: String,
    /// Deny-list entry it matched
    pub term: String,
    /// Byte offset in the validated text
    pub offset: usize,
}

/// Outcome of validating one text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Approved { observational_terms: usize },
    IntegrityHalt { violations: Vec<Violation> },
}

impl Verdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved { .. })
    }

    /// Violations, empty when approved.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Verdict::Approved { .. } => &[],
            Verdict::IntegrityHalt { violations } => violations,
        }
    }
}

struct Token {
    lower: String,
    start: usize,
    end: usize,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            tokens.push(Token {
                lower: text[s..i].to_lowercase(),
                start: s,
                end: i,
            });
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            lower: text[s..].to_lowercase(),
            start: s,
            end: text.len(),
        });
    }
    tokens
}

fn phrase_tokens(phrase: &str) -> Vec<String> {
    tokenize(phrase).into_iter().map(|t| t.lower).collect()
}

#[derive(Debug, Clone)]
struct Phrase {
    term: String,
    tokens: Vec<String>,
}

impl Phrase {
    fn new(term: &str) -> Option<Self> {
        let tokens = phrase_tokens(term);
        (!tokens.is_empty()).then(|| Self {
            term: tokens.join(" "),
            tokens,
        })
    }

    fn matches_at(&self, tokens: &[Token], at: usize) -> bool {
        tokens.len() >= at + self.tokens.len()
            && self
                .tokens
                .iter()
                .zip(&tokens[at..])
                .all(|(want, got)| *want == got.lower)
    }
}

/// Fail-closed vocabulary validator.
#[derive(Debug, Clone)]
pub struct LanguageFirewall {
    deny: Vec<Phrase>,
    allow: Vec<Phrase>,
}

impl Default for LanguageFirewall {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageFirewall {
    /// Firewall with the built-in lists.
    pub fn new() -> Self {
        Self {
            deny: DENY_TERMS.iter().filter_map(|t| Phrase::new(t)).collect(),
            allow: ALLOW_TERMS.iter().filter_map(|t| Phrase::new(t)).collect(),
        }
    }

    /// A copy with extra deny terms. The built-in list is never reduced.
    pub fn with_extra_terms<I, S>(&self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extended = self.clone();
        for term in terms {
            if let Some(phrase) = Phrase::new(term.as_ref()) {
                if !extended.deny.iter().any(|p| p.tokens == phrase.tokens) {
                    extended.deny.push(phrase);
                }
            }
        }
        extended
    }

    /// Deny-list entries, normalised.
    pub fn deny_terms(&self) -> impl Iterator<Item = &str> {
        self.deny.iter().map(|p| p.term.as_str())
    }

    /// Validate a text. Deterministic: identical text yields an identical
    /// verdict and violation list.
    pub fn validate(&self, text: &str) -> Verdict {
        let tokens = tokenize(text);
        let mut violations = Vec::new();
        let mut observational_terms = 0;

        for at in 0..tokens.len() {
            let longest = self
                .deny
                .iter()
                .filter(|p| p.matches_at(&tokens, at))
                .max_by_key(|p| p.tokens.len());
            if let Some(phrase) = longest {
                let last = &tokens[at + phrase.tokens.len() - 1];
                violations.push(Violation {
                    surface: text[tokens[at].start..last.end].to_string(),
                    term: phrase.term.clone(),
                    offset: tokens[at].start,
                });
            }
            if self.allow.iter().any(|p| p.matches_at(&tokens, at)) {
                observational_terms += 1;
            }
        }

        if violations.is_empty() {
            Verdict::Approved { observational_terms }
        } else {
            Verdict::IntegrityHalt { violations }
        }
    }
}
