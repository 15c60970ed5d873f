//! JSON reader handling the common layouts: array of objects, an object
//! wrapping a record array, or a single flat object.

use serde_json::Value;

use crate::batch::TabularBatch;
use crate::error::{DeckError, Result};

pub fn parse_json(bytes: &[u8]) -> Result<TabularBatch> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| DeckError::Parse(format!("invalid JSON: {e}")))?;

    match value {
        Value::Array(items) => batch_from_array(items),
        Value::Object(map) => {
            // Prefer the largest array value as the row set, matching how
            // exports usually wrap records under a single key.
            let largest = map
                .iter()
                .filter_map(|(k, v)| v.as_array().map(|a| (k, a.len())))
                .max_by_key(|(_, len)| *len)
                .map(|(k, _)| k.clone());
            if let Some(key) = largest {
                let Value::Array(items) = map.get(&key).cloned().unwrap_or(Value::Null) else {
                    unreachable!("key selected from array values");
                };
                if !items.is_empty() {
                    return batch_from_array(items);
                }
            }
            TabularBatch::from_objects(vec![map])
        }
        _ => Err(DeckError::Parse(
            "unsupported JSON structure: expected an object or array of objects".to_string(),
        )),
    }
}

fn batch_from_array(items: Vec<Value>) -> Result<TabularBatch> {
    if items.is_empty() {
        return Err(DeckError::Parse("no data rows found".to_string()));
    }
    if items.iter().all(|v| v.is_object()) {
        let objects = items
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => flatten_scalars(map),
                _ => unreachable!(),
            })
            .collect();
        return TabularBatch::from_objects(objects);
    }
    // Array of scalars becomes a single-column table.
    let rows = items.into_iter().map(|v| vec![v]).collect();
    TabularBatch::from_rows(vec!["value".to_string()], rows)
}

/// Nested objects and arrays are kept as their JSON text so every cell is a
/// scalar, matching the row invariant.
fn flatten_scalars(map: serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
    map.into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::Object(_) | Value::Array(_) => Value::String(v.to_string()),
                other => other,
            };
            (k, v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_of_objects() {
        let data = br#"[{"name":"a","n":1},{"name":"b","n":2}]"#;
        let batch = parse_json(data).unwrap();
        assert_eq!(batch.columns, vec!["name", "n"]);
        assert_eq!(batch.row_count(), 2);
        assert_eq!(batch.rows[1][1], json!(2));
    }

    #[test]
    fn object_wrapping_record_array() {
        let data = br#"{"meta":"x","records":[{"id":1},{"id":2},{"id":3}]}"#;
        let batch = parse_json(data).unwrap();
        assert_eq!(batch.columns, vec!["id"]);
        assert_eq!(batch.row_count(), 3);
    }

    #[test]
    fn single_flat_object_is_one_row() {
        let data = br#"{"city":"paris","pop":2100000}"#;
        let batch = parse_json(data).unwrap();
        assert_eq!(batch.row_count(), 1);
        assert_eq!(batch.columns, vec!["city", "pop"]);
    }

    #[test]
    fn scalar_array_becomes_single_column() {
        let batch = parse_json(b"[1,2,3]").unwrap();
        assert_eq!(batch.columns, vec!["value"]);
        assert_eq!(batch.row_count(), 3);
    }

    #[test]
    fn nested_values_are_stringified() {
        let data = br#"[{"id":1,"tags":["a","b"]}]"#;
        let batch = parse_json(data).unwrap();
        assert_eq!(batch.rows[0][1], json!("[\"a\",\"b\"]"));
    }

    #[test]
    fn top_level_scalar_is_rejected() {
        let err = parse_json(b"42").unwrap_err();
        assert!(matches!(err, DeckError::Parse(_)));
    }
}
