//! Pass-through SQL execution against the shared DuckDB database.
//!
//! Statements run exactly as submitted; engine errors come back verbatim
//! so callers can surface them to the user unchanged.

use duckdb::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DeckError, Result};

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
        }
    }
}

pub struct QueryGateway {
    db_path: PathBuf,
}

impl QueryGateway {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn get_connection(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .map_err(|e| DeckError::Persistence(format!("failed to open database: {e}")))
    }

    /// Execute one SQL statement. Row-returning statements produce columns
    /// and rows; others execute for effect and return an empty result.
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(DeckError::InvalidParams("empty SQL statement".to_string()));
        }
        debug!(sql = %sql, "executing query");
        let conn = self.get_connection()?;

        if !returns_rows(sql) {
            conn.execute_batch(sql)
                .map_err(|e| DeckError::Query(e.to_string()))?;
            return Ok(QueryResult::empty());
        }

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DeckError::Query(e.to_string()))?;
        let mut rows = stmt.query([]).map_err(|e| DeckError::Query(e.to_string()))?;

        let mut columns: Vec<String> = Vec::new();
        let mut out: Vec<Row> = Vec::new();
        while let Some(row) = rows.next().map_err(|e| DeckError::Query(e.to_string()))? {
            if columns.is_empty() {
                columns = row
                    .as_ref()
                    .column_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
            }
            let mut record = Map::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                let v = row
                    .get_ref(i)
                    .map_err(|e| DeckError::Query(e.to_string()))?;
                record.insert(column.clone(), value_ref_to_json(v));
            }
            out.push(record);
        }
        drop(rows);
        // No rows seen: recover column names from the prepared statement.
        if columns.is_empty() {
            columns = (0..stmt.column_count())
                .map(|i| stmt.column_name(i).map(|s| s.to_string()).unwrap_or_default())
                .collect();
        }

        let row_count = out.len();
        Ok(QueryResult {
            columns,
            rows: out,
            row_count,
        })
    }
}

/// Leading-keyword check for statements that produce a result set.
fn returns_rows(sql: &str) -> bool {
    let first = sql
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    matches!(
        first.as_str(),
        "select" | "with" | "show" | "describe" | "explain" | "pragma" | "from" | "values"
    )
}

fn value_ref_to_json(v: duckdb::types::ValueRef<'_>) -> serde_json::Value {
    use duckdb::types::ValueRef;
    match v {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Boolean(b) => serde_json::Value::Bool(b),
        ValueRef::TinyInt(x) => (x as i64).into(),
        ValueRef::SmallInt(x) => (x as i64).into(),
        ValueRef::Int(x) => (x as i64).into(),
        ValueRef::BigInt(x) => x.into(),
        ValueRef::HugeInt(x) => {
            if let Ok(v) = i64::try_from(x) {
                v.into()
            } else {
                serde_json::Value::String(x.to_string())
            }
        }
        ValueRef::UTinyInt(x) => (x as u64).into(),
        ValueRef::USmallInt(x) => (x as u64).into(),
        ValueRef::UInt(x) => (x as u64).into(),
        ValueRef::UBigInt(x) => x.into(),
        ValueRef::Float(x) => (x as f64).into(),
        ValueRef::Double(x) => x.into(),
        ValueRef::Text(s) => serde_json::Value::String(String::from_utf8_lossy(s).to_string()),
        other => serde_json::Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::TabularBatch;
    use crate::registry::TableRegistry;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, QueryGateway) {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("deck.db");
        let registry = TableRegistry::new(&db).unwrap();
        let batch = TabularBatch::from_rows(
            vec!["city".to_string(), "pop".to_string()],
            vec![
                vec![json!("paris"), json!(2100000)],
                vec![json!("lyon"), json!(520000)],
                vec![json!("nice"), json!(340000)],
            ],
        )
        .unwrap();
        registry.register("cities", "cities.csv", &batch).unwrap();
        (dir, QueryGateway::new(&db))
    }

    #[test]
    fn select_returns_columns_and_rows() {
        let (_dir, gateway) = setup();
        let result = gateway
            .execute("SELECT city, pop FROM cities ORDER BY pop DESC")
            .unwrap();
        assert_eq!(result.columns, vec!["city", "pop"]);
        assert_eq!(result.row_count, 3);
        assert_eq!(result.rows[0]["city"], json!("paris"));
        assert_eq!(result.rows[0]["pop"], json!(2100000));
    }

    #[test]
    fn rows_are_keyed_by_column_name() {
        let (_dir, gateway) = setup();
        let result = gateway.execute("SELECT city FROM cities LIMIT 1").unwrap();
        let row = &result.rows[0];
        assert!(row.contains_key("city"));
        // Serialized rows are objects, not positional arrays.
        let serialized = serde_json::to_value(&result).unwrap();
        assert!(serialized["rows"][0].is_object());
        assert_eq!(serialized["rows"][0]["city"], row["city"]);
    }

    #[test]
    fn aggregate_over_registered_table() {
        let (_dir, gateway) = setup();
        let result = gateway.execute("SELECT COUNT(*) AS n FROM cities").unwrap();
        assert_eq!(result.rows[0]["n"], json!(3));
    }

    #[test]
    fn engine_errors_come_back_verbatim_as_query_errors() {
        let (_dir, gateway) = setup();
        let err = gateway.execute("SELECT * FROM no_such_table").unwrap_err();
        match err {
            DeckError::Query(msg) => assert!(msg.contains("no_such_table")),
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn empty_sql_is_invalid_params() {
        let (_dir, gateway) = setup();
        let err = gateway.execute("   ").unwrap_err();
        assert!(matches!(err, DeckError::InvalidParams(_)));
    }

    #[test]
    fn non_select_statements_execute_with_empty_result() {
        let (_dir, gateway) = setup();
        let result = gateway
            .execute("CREATE TABLE scratch AS SELECT 1 AS one")
            .unwrap();
        assert_eq!(result.row_count, 0);
        let check = gateway.execute("SELECT one FROM scratch").unwrap();
        assert_eq!(check.rows[0]["one"], json!(1));
    }

    #[test]
    fn zero_row_select_still_reports_columns() {
        let (_dir, gateway) = setup();
        let result = gateway
            .execute("SELECT city FROM cities WHERE pop > 99999999")
            .unwrap();
        assert_eq!(result.columns, vec!["city"]);
        assert_eq!(result.row_count, 0);
    }
}
