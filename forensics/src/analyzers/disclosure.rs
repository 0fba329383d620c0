//! Disclosure consistency flags.
//!
//! Deliberately narrow: only declared litigation history is compared, and
//! only where a public record row for the same juror label exists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::artifact::{PublicRecordRow, SjqRow};

pub const LITIGATION_FIELD: &str = "litigation_history";

const REVIEW_NOTE: &str = "Flag for counsel review (nondisclosure consistency).";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureFlag {
    pub juror: String,
    pub field: String,
    /// Declared value, verbatim
    pub declared: String,
    pub public_record: String,
    pub note: String,
}

fn indicates_history(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "" | "no" | "none" | "0")
}

/// Flag jurors whose declared litigation history disagrees with a public
/// record row.
pub fn disclosure_consistency_flags(sjq: &[SjqRow], records: &[PublicRecordRow]) -> Vec<DisclosureFlag> {
    let recorded: BTreeMap<&str, bool> = records
        .iter()
        .filter(|r| r.field == LITIGATION_FIELD)
        .map(|r| (r.juror_label.as_str(), indicates_history(&r.value)))
        .collect();

    sjq.iter()
        .filter_map(|row| {
            let on_record = *recorded.get(row.juror_label.as_str())?;
            let declared = indicates_history(&row.litigation_history_declared);
            (on_record != declared).then(|| DisclosureFlag {
                juror: row.juror_label.clone(),
                field: LITIGATION_FIELD.to_string(),
                declared: row.litigation_history_declared.clone(),
                public_record: if on_record {
                    "indicates history".to_string()
                } else {
                    "indicates none".to_string()
                },
                note: REVIEW_NOTE.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sjq(juror: &str, declared: &str) -> SjqRow {
        SjqRow {
            juror_label: juror.to_string(),
            litigation_history_declared: declared.to_string(),
        }
    }

    fn record(juror: &str, field: &str, value: &str) -> PublicRecordRow {
        PublicRecordRow {
            juror_label: juror.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_only_direct_mismatches_flagged() {
        let rows = vec![sjq("J1", "No"), sjq("J2", "yes"), sjq("J3", "none"), sjq("J4", "no")];
        let records = vec![
            record("J1", LITIGATION_FIELD, "2019 small claims"),
            record("J2", LITIGATION_FIELD, "yes"),
            record("J3", LITIGATION_FIELD, "none"),
            record("J4", "address", "elsewhere"),
        ];
        let flags = disclosure_consistency_flags(&rows, &records);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].juror, "J1");
        assert_eq!(flags[0].declared, "No");
        assert_eq!(flags[0].public_record, "indicates history");
    }

    #[test]
    fn test_no_records_no_flags() {
        assert!(disclosure_consistency_flags(&[sjq("J1", "yes")], &[]).is_empty());
    }
}
