//! Excel reader: first non-empty sheet, first row as header.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::Value;
use std::io::Cursor;

use crate::batch::TabularBatch;
use crate::error::{DeckError, Result};

pub fn parse_excel(bytes: &[u8]) -> Result<TabularBatch> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| DeckError::Parse(format!("cannot open workbook: {e}")))?;

    let sheet_names = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(DeckError::Parse("workbook has no sheets".to_string()));
    }

    for name in &sheet_names {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| DeckError::Parse(format!("cannot read sheet '{name}': {e}")))?;
        let mut rows = range.rows();
        let Some(header_row) = rows.next() else {
            continue;
        };
        let headers: Vec<String> = header_row.iter().map(cell_to_header).collect();
        if headers.iter().all(|h| h.is_empty()) {
            continue;
        }
        let data_rows: Vec<Vec<Value>> = rows
            .map(|row| row.iter().map(cell_to_value).collect())
            .collect();
        return TabularBatch::from_rows(headers, data_rows);
    }

    Err(DeckError::Parse(
        "no non-empty sheets found in workbook".to_string(),
    ))
}

fn cell_to_header(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Float(f) => Value::from(*f),
        Data::Int(i) => Value::from(*i),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(_) => Value::String(cell.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(format!("#ERR {e:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let err = parse_excel(b"definitely not a workbook").unwrap_err();
        assert!(matches!(err, DeckError::Parse(_)));
    }
}
