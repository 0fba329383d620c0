//! Minimal CSV reading for questionnaire and public-record exports.
//!
//! Handles a header row, quoted fields with embedded commas, doubled quotes
//! and CRLF line endings. Rows are keyed by header name.

use std::collections::BTreeMap;

/// One CSV row keyed by header.
pub type Row = BTreeMap<String, String>;

/// Parse CSV text with a header row.
///
/// Rows with fewer fields than the header get empty strings for the missing
/// columns; extra fields are dropped. Blank lines are skipped.
pub fn parse_rows(text: &str) -> Result<Vec<Row>, String> {
    let mut records = parse_records(text)?.into_iter();
    let header: Vec<String> = match records.next() {
        Some(h) => h.into_iter().map(|c| c.trim().to_string()).collect(),
        None => return Ok(Vec::new()),
    };

    Ok(records
        .filter(|r| !(r.len() == 1 && r[0].trim().is_empty()))
        .map(|record| {
            header
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), record.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect())
}

fn parse_records(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    let mut line = 1usize;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(format!("unterminated quoted field at line {line}"));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_quotes() {
        let rows = parse_rows(
            "juror_label,litigation_history_declared\r\nJ1,no\r\n\"J2\",\"yes, 2019 \"\"small claims\"\"\"\r\n",
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["juror_label"], "J1");
        assert_eq!(rows[1]["litigation_history_declared"], "yes, 2019 \"small claims\"");
    }

    #[test]
    fn test_short_rows_and_blank_lines() {
        let rows = parse_rows("a,b,c\n1,2\n\n3,4,5").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["c"], "");
        assert_eq!(rows[1]["c"], "5");
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(parse_rows("a\n\"open").is_err());
    }
}
