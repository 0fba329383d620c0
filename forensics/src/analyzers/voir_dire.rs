//! Response distribution map: voir-dire answers grouped by question.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::artifact::VoirDireAnswer;
use crate::types::truncate_chars;

/// Question id used when an answer carries none.
pub const UNNUMBERED_QUESTION: &str = "Q?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedAnswer {
    pub juror: String,
    pub answer: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResponses {
    pub question_text: String,
    pub answers: Vec<RecordedAnswer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDistribution {
    pub questions: BTreeMap<String, QuestionResponses>,
}

/// Group answers by question, keeping answer order and the first question
/// text seen.
pub fn response_distribution(answers: &[VoirDireAnswer], max_answer_chars: usize) -> ResponseDistribution {
    let mut questions: BTreeMap<String, QuestionResponses> = BTreeMap::new();

    for a in answers {
        let qid = a
            .question_id
            .clone()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| UNNUMBERED_QUESTION.to_string());
        let entry = questions.entry(qid).or_insert_with(|| QuestionResponses {
            question_text: a.question_text.clone(),
            answers: Vec::new(),
        });
        entry.answers.push(RecordedAnswer {
            juror: a.juror_label.clone(),
            answer: truncate_chars(a.answer_text.as_deref().unwrap_or_default().trim(), max_answer_chars),
            timestamp: match &a.timestamp {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            },
        });
    }

    ResponseDistribution { questions }
}
