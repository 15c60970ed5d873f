//! CSV/TSV reader with delimiter auto-detection.

use serde_json::Value;

use crate::batch::TabularBatch;
use crate::error::{DeckError, Result};

/// Delimiters to try when auto-detecting.
const DELIMITERS: &[u8] = &[b'\t', b',', b';', b'|'];

pub fn parse_csv(bytes: &[u8]) -> Result<TabularBatch> {
    let delimiter = detect_delimiter(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(DeckError::Parse("no header row found".to_string()));
    }

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| Value::String(field.to_string()))
                .collect(),
        );
    }
    TabularBatch::from_rows(headers, rows)
}

/// Pick the candidate delimiter that splits the first line most often,
/// ignoring text inside double quotes. Falls back to comma.
fn detect_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or(&[]);
    let mut best = b',';
    let mut best_count = 0usize;
    for &candidate in DELIMITERS {
        let mut in_quotes = false;
        let mut count = 0usize;
        for &b in first_line {
            match b {
                b'"' => in_quotes = !in_quotes,
                b if b == candidate && !in_quotes => count += 1,
                _ => {}
            }
        }
        if count > best_count {
            best_count = count;
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ColumnType;
    use serde_json::json;

    #[test]
    fn parses_comma_separated_with_types() {
        let data = b"name,age,score\nalice,30,1.5\nbob,25,2.0\n";
        let batch = parse_csv(data).unwrap();
        assert_eq!(batch.columns, vec!["name", "age", "score"]);
        assert_eq!(batch.row_count(), 2);
        assert_eq!(
            batch.column_types,
            vec![ColumnType::Text, ColumnType::Integer, ColumnType::Double]
        );
        assert_eq!(batch.rows[0][1], json!(30));
    }

    #[test]
    fn detects_semicolon_delimiter() {
        let data = b"a;b\n1;2\n";
        let batch = parse_csv(data).unwrap();
        assert_eq!(batch.columns, vec!["a", "b"]);
        assert_eq!(batch.rows[0][0], json!(1));
    }

    #[test]
    fn quoted_commas_do_not_confuse_detection() {
        let data = b"city\t\"pop, est\"\nparis\t\"2,100,000\"\n";
        let batch = parse_csv(data).unwrap();
        assert_eq!(batch.columns.len(), 2);
        assert_eq!(batch.rows[0][1], json!("2,100,000"));
    }

    #[test]
    fn header_only_file_yields_empty_batch() {
        let batch = parse_csv(b"a,b,c\n").unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.column_count(), 3);
    }

    #[test]
    fn ragged_rows_are_padded() {
        let data = b"a,b,c\n1,2\n";
        let batch = parse_csv(data).unwrap();
        assert_eq!(batch.rows[0].len(), 3);
        assert_eq!(batch.rows[0][2], serde_json::Value::Null);
    }
}
