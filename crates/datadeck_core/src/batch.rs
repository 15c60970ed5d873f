//! In-memory tabular batches produced by parsers and connectors.
//!
//! A batch is the hand-off unit between ingestion and the table registry:
//! one column schema, positional rows, values already coerced to the
//! narrowest consistent type per column.

use serde::Serialize;
use serde_json::Value;

use crate::error::{DeckError, Result};

/// Narrowest consistent storage type for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Double,
    Text,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Integer => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Text => "VARCHAR",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Double)
    }
}

#[derive(Debug, Clone)]
pub struct TabularBatch {
    pub columns: Vec<String>,
    pub column_types: Vec<ColumnType>,
    pub rows: Vec<Vec<Value>>,
}

impl TabularBatch {
    /// Build a batch from raw positional rows. Column names are sanitized,
    /// rows are padded or truncated to the column count, and every cell is
    /// coerced to its column's inferred type.
    pub fn from_rows(columns: Vec<String>, mut rows: Vec<Vec<Value>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(DeckError::Parse("no columns found".to_string()));
        }
        let columns = dedupe_columns(columns.iter().map(|c| sanitize_column(c)).collect());
        for row in &mut rows {
            row.resize(columns.len(), Value::Null);
        }
        let column_types: Vec<ColumnType> = (0..columns.len())
            .map(|i| infer_column_type(rows.iter().map(|r| &r[i])))
            .collect();
        for row in &mut rows {
            for (i, cell) in row.iter_mut().enumerate() {
                let coerced = coerce_cell(cell, column_types[i]);
                *cell = coerced;
            }
        }
        Ok(Self {
            columns,
            column_types,
            rows,
        })
    }

    /// Build a batch from a sequence of JSON objects. Columns are the union
    /// of keys in first-seen order; missing keys become nulls.
    pub fn from_objects(objects: Vec<serde_json::Map<String, Value>>) -> Result<Self> {
        if objects.is_empty() {
            return Err(DeckError::Parse("no data rows found".to_string()));
        }
        let mut columns: Vec<String> = Vec::new();
        for obj in &objects {
            for key in obj.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = objects
            .into_iter()
            .map(|mut obj| {
                columns
                    .iter()
                    .map(|c| obj.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self::from_rows(columns, rows)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Clean a column name the way uploads expect: trim, spaces and dashes to
/// underscores, drop anything else that is not alphanumeric.
pub fn sanitize_column(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "column".to_string()
    } else {
        cleaned
    }
}

fn dedupe_columns(columns: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(columns.len());
    for col in columns {
        if !seen.iter().any(|c| *c == col) {
            seen.push(col);
            continue;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{col}_{n}");
            if !seen.iter().any(|c| *c == candidate) {
                seen.push(candidate);
                break;
            }
            n += 1;
        }
    }
    seen
}

#[derive(Clone, Copy, PartialEq)]
enum CellClass {
    Bool,
    Int,
    Float,
    Text,
}

fn classify_cell(value: &Value) -> Option<CellClass> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(CellClass::Bool),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(CellClass::Int)
            } else {
                Some(CellClass::Float)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else if s.parse::<i64>().is_ok() {
                Some(CellClass::Int)
            } else if s.parse::<f64>().is_ok() {
                Some(CellClass::Float)
            } else if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
                Some(CellClass::Bool)
            } else {
                Some(CellClass::Text)
            }
        }
        _ => Some(CellClass::Text),
    }
}

/// Infer the narrowest type that fits every non-null value in the column.
fn infer_column_type<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnType {
    let mut saw_any = false;
    let mut all_bool = true;
    let mut all_int = true;
    let mut numeric_ok = true;
    for v in values {
        let Some(class) = classify_cell(v) else {
            continue;
        };
        saw_any = true;
        match class {
            CellClass::Bool => {
                all_int = false;
                numeric_ok = false;
            }
            CellClass::Int => all_bool = false,
            CellClass::Float => {
                all_bool = false;
                all_int = false;
            }
            CellClass::Text => return ColumnType::Text,
        }
    }
    if !saw_any {
        ColumnType::Text
    } else if all_bool {
        ColumnType::Boolean
    } else if !numeric_ok {
        // Booleans mixed with numbers do not narrow cleanly.
        ColumnType::Text
    } else if all_int {
        ColumnType::Integer
    } else {
        ColumnType::Double
    }
}

fn coerce_cell(value: &Value, ty: ColumnType) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    if let Value::String(s) = value {
        if s.trim().is_empty() {
            return Value::Null;
        }
    }
    match ty {
        ColumnType::Boolean => match value {
            Value::Bool(b) => Value::Bool(*b),
            Value::String(s) => Value::Bool(s.trim().eq_ignore_ascii_case("true")),
            other => other.clone(),
        },
        ColumnType::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .map(Value::from)
                .unwrap_or_else(|| value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| value.clone()),
            other => other.clone(),
        },
        ColumnType::Double => match value {
            Value::Number(n) => n
                .as_f64()
                .map(Value::from)
                .unwrap_or_else(|| value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .unwrap_or_else(|_| value.clone()),
            other => other.clone(),
        },
        ColumnType::Text => match value {
            Value::String(s) => Value::String(s.clone()),
            Value::Bool(b) => Value::String(b.to_string()),
            Value::Number(n) => Value::String(n.to_string()),
            other => Value::String(other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn infers_integer_column_from_strings() {
        let batch = TabularBatch::from_rows(
            vec!["n".into()],
            vec![vec![s("1")], vec![s("42")], vec![s("")]],
        )
        .unwrap();
        assert_eq!(batch.column_types, vec![ColumnType::Integer]);
        assert_eq!(batch.rows[0][0], json!(1));
        assert_eq!(batch.rows[2][0], Value::Null);
    }

    #[test]
    fn mixed_int_and_float_widens_to_double() {
        let batch = TabularBatch::from_rows(
            vec!["x".into()],
            vec![vec![s("1")], vec![s("2.5")]],
        )
        .unwrap();
        assert_eq!(batch.column_types, vec![ColumnType::Double]);
        assert_eq!(batch.rows[0][0], json!(1.0));
    }

    #[test]
    fn any_text_value_forces_text() {
        let batch = TabularBatch::from_rows(
            vec!["x".into()],
            vec![vec![s("1")], vec![s("two")]],
        )
        .unwrap();
        assert_eq!(batch.column_types, vec![ColumnType::Text]);
        assert_eq!(batch.rows[0][0], s("1"));
    }

    #[test]
    fn sanitizes_and_dedupes_column_names() {
        let batch = TabularBatch::from_rows(
            vec!["First Name".into(), "first-name".into(), "tax (%)".into()],
            vec![vec![s("a"), s("b"), s("c")]],
        )
        .unwrap();
        assert_eq!(batch.columns, vec!["First_Name", "first_name", "tax_"]);
    }

    #[test]
    fn objects_preserve_first_seen_key_order() {
        let objects: Vec<serde_json::Map<String, Value>> = vec![
            serde_json::from_value(json!({"a": 1, "b": "x"})).unwrap(),
            serde_json::from_value(json!({"b": "y", "c": true})).unwrap(),
        ];
        let batch = TabularBatch::from_objects(objects).unwrap();
        assert_eq!(batch.columns, vec!["a", "b", "c"]);
        assert_eq!(batch.rows[1][0], Value::Null);
        assert_eq!(batch.rows[1][2], json!(true));
    }

    #[test]
    fn short_rows_are_padded_with_nulls() {
        let batch = TabularBatch::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![s("1")]],
        )
        .unwrap();
        assert_eq!(batch.rows[0].len(), 2);
        assert_eq!(batch.rows[0][1], Value::Null);
    }
}
