//! PDF reader: text extraction with best-effort tabular recovery.
//!
//! PDFs rarely carry real table structure; the recovery here looks for a
//! run of consistently delimited lines. When none exists the caller either
//! gets a parse error pointing at the text fallback, or, with the fallback
//! enabled, a single-column table of extracted lines.

use serde_json::Value;

use super::ParserConfig;
use crate::batch::TabularBatch;
use crate::error::{DeckError, Result};

const CANDIDATE_DELIMITERS: &[char] = &['\t', ',', ';', '|'];

pub fn parse_pdf(bytes: &[u8], config: &ParserConfig) -> Result<TabularBatch> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| DeckError::Parse(format!("failed to extract text from PDF: {e}")))?;

    if text.trim().is_empty() {
        return Err(DeckError::Parse(
            "PDF contains no extractable text (may be image-based)".to_string(),
        ));
    }

    if let Some(batch) = table_from_text(&text)? {
        return Ok(batch);
    }

    if config.pdf_text_fallback {
        return text_column_batch(&text);
    }

    Err(DeckError::Parse(
        "no tabular structure recovered from PDF; re-submit with the text \
         fallback enabled to load it as a single-column table"
            .to_string(),
    ))
}

/// Try to recover a delimited table from extracted text: at least two
/// columns and two lines, with every line agreeing on the field count.
pub fn table_from_text(text: &str) -> Result<Option<TabularBatch>> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() < 2 {
        return Ok(None);
    }

    for &delim in CANDIDATE_DELIMITERS {
        let counts: Vec<usize> = lines.iter().map(|l| l.split(delim).count()).collect();
        let width = counts[0];
        if width < 2 || counts.iter().any(|c| *c != width) {
            continue;
        }
        let headers: Vec<String> = lines[0].split(delim).map(|s| s.trim().to_string()).collect();
        let rows: Vec<Vec<Value>> = lines[1..]
            .iter()
            .map(|l| {
                l.split(delim)
                    .map(|s| Value::String(s.trim().to_string()))
                    .collect()
            })
            .collect();
        return TabularBatch::from_rows(headers, rows).map(Some);
    }
    Ok(None)
}

fn text_column_batch(text: &str) -> Result<TabularBatch> {
    let rows: Vec<Vec<Value>> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| vec![Value::String(l.to_string())])
        .collect();
    if rows.is_empty() {
        return Err(DeckError::Parse("no text lines recovered".to_string()));
    }
    TabularBatch::from_rows(vec!["text".to_string()], rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ColumnType;

    #[test]
    fn recovers_delimited_table_from_text() {
        let text = "name,count\nalpha,3\nbeta,7\n";
        let batch = table_from_text(text).unwrap().unwrap();
        assert_eq!(batch.columns, vec!["name", "count"]);
        assert_eq!(batch.row_count(), 2);
        assert_eq!(batch.column_types[1], ColumnType::Integer);
    }

    #[test]
    fn prose_yields_no_table() {
        let text = "This is a paragraph.\nAnd another line of prose.\n";
        assert!(table_from_text(text).unwrap().is_none());
    }

    #[test]
    fn inconsistent_field_counts_yield_no_table() {
        let text = "a,b,c\n1,2\n3,4,5\n";
        assert!(table_from_text(text).unwrap().is_none());
    }

    #[test]
    fn text_fallback_builds_single_column() {
        let batch = text_column_batch("first line\n\nsecond line\n").unwrap();
        assert_eq!(batch.columns, vec!["text"]);
        assert_eq!(batch.row_count(), 2);
    }

    #[test]
    fn invalid_pdf_bytes_are_a_parse_error() {
        let err = parse_pdf(b"not a pdf", &ParserConfig::default()).unwrap_err();
        assert!(matches!(err, DeckError::Parse(_)));
    }
}
