//! Table registry backed by DuckDB.
//!
//! Every registered upload becomes a real DuckDB table plus a row in the
//! `datadeck_catalog` side table, which carries provenance and ordering.
//! Registration is transactional: a failure partway leaves neither the
//! table nor the catalog row behind.

use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::batch::TabularBatch;
use crate::error::{DeckError, Result};

/// Name of the side table; user tables can never claim it.
const CATALOG_TABLE: &str = "datadeck_catalog";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub source_file: String,
    pub row_count: i64,
    pub column_count: i64,
    pub columns: Vec<ColumnMeta>,
    pub created_at: DateTime<Utc>,
}

pub struct TableRegistry {
    db_path: PathBuf,
}

impl TableRegistry {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let registry = Self { db_path };
        registry.initialize_db()?;
        Ok(registry)
    }

    fn initialize_db(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS datadeck_catalog (
                name TEXT PRIMARY KEY,
                source_file TEXT NOT NULL,
                row_count BIGINT NOT NULL,
                column_count BIGINT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(persistence)?;
        Ok(())
    }

    fn get_connection(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .map_err(|e| DeckError::Persistence(format!("failed to open database: {e}")))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Register a batch under `desired_name`, suffixing `_1`, `_2`, ... if
    /// the name is already taken. Returns the metadata actually stored.
    pub fn register(&self, desired_name: &str, source_file: &str, batch: &TabularBatch) -> Result<TableMeta> {
        let conn = self.get_connection()?;
        let name = self.unique_name(&conn, desired_name)?;
        let created_at = Utc::now();

        conn.execute("BEGIN TRANSACTION", []).map_err(persistence)?;
        match self.insert_batch(&conn, &name, source_file, batch, created_at) {
            Ok(()) => {
                conn.execute("COMMIT", []).map_err(persistence)?;
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                return Err(e);
            }
        }

        info!(table = %name, rows = batch.row_count(), "registered table");
        Ok(TableMeta {
            name: name.clone(),
            source_file: source_file.to_string(),
            row_count: batch.row_count() as i64,
            column_count: batch.column_count() as i64,
            columns: self.columns(&conn, &name)?,
            created_at,
        })
    }

    fn insert_batch(
        &self,
        conn: &Connection,
        name: &str,
        source_file: &str,
        batch: &TabularBatch,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let column_defs: Vec<String> = batch
            .columns
            .iter()
            .zip(&batch.column_types)
            .map(|(col, ty)| format!("\"{col}\" {}", ty.sql_type()))
            .collect();
        conn.execute(
            &format!("CREATE TABLE \"{name}\" ({})", column_defs.join(", ")),
            [],
        )
        .map_err(persistence)?;

        if !batch.rows.is_empty() {
            let placeholders = vec!["?"; batch.column_count()].join(", ");
            let mut stmt = conn
                .prepare(&format!("INSERT INTO \"{name}\" VALUES ({placeholders})"))
                .map_err(persistence)?;
            for row in &batch.rows {
                let values: Vec<duckdb::types::Value> = row.iter().map(json_to_duckdb).collect();
                stmt.execute(duckdb::params_from_iter(values))
                    .map_err(persistence)?;
            }
        }

        conn.execute(
            "INSERT INTO datadeck_catalog (name, source_file, row_count, column_count, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                name,
                source_file,
                batch.row_count() as i64,
                batch.column_count() as i64,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(persistence)?;
        Ok(())
    }

    /// All registered tables, oldest first.
    pub fn list(&self) -> Result<Vec<TableMeta>> {
        let conn = self.get_connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, source_file, row_count, column_count, created_at
                 FROM datadeck_catalog
                 ORDER BY created_at ASC, name ASC",
            )
            .map_err(persistence)?;
        let metas = stmt
            .query_map([], |row| {
                let created_at_str: String = row.get(4)?;
                Ok(TableMeta {
                    name: row.get(0)?,
                    source_file: row.get(1)?,
                    row_count: row.get(2)?,
                    column_count: row.get(3)?,
                    columns: Vec::new(),
                    created_at: DateTime::parse_from_rfc3339(&created_at_str)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(persistence)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(persistence)?;

        let mut result = Vec::new();
        for mut meta in metas {
            meta.columns = self.columns(&conn, &meta.name)?;
            result.push(meta);
        }
        Ok(result)
    }

    pub fn meta(&self, name: &str) -> Result<Option<TableMeta>> {
        let conn = self.get_connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, source_file, row_count, column_count, created_at
                 FROM datadeck_catalog WHERE name = ?",
            )
            .map_err(persistence)?;
        let mut rows = stmt
            .query_map([name], |row| {
                let created_at_str: String = row.get(4)?;
                Ok(TableMeta {
                    name: row.get(0)?,
                    source_file: row.get(1)?,
                    row_count: row.get(2)?,
                    column_count: row.get(3)?,
                    columns: Vec::new(),
                    created_at: DateTime::parse_from_rfc3339(&created_at_str)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(persistence)?;

        if let Some(row) = rows.next() {
            let mut meta = row.map_err(persistence)?;
            meta.columns = self.columns(&conn, &meta.name)?;
            Ok(Some(meta))
        } else {
            Ok(None)
        }
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        let conn = self.get_connection()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM datadeck_catalog WHERE name = ?",
                [name],
                |row| row.get(0),
            )
            .map_err(persistence)?;
        Ok(count > 0)
    }

    /// The most recently registered table, if any. Used to resolve data
    /// questions that do not name a table.
    pub fn most_recent(&self) -> Result<Option<TableMeta>> {
        let conn = self.get_connection()?;
        let name = match conn.query_row(
            "SELECT name FROM datadeck_catalog ORDER BY created_at DESC, name DESC LIMIT 1",
            [],
            |row| row.get::<_, String>(0),
        ) {
            Ok(name) => name,
            Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(persistence(e)),
        };
        self.meta(&name)
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        if !self.exists(name)? {
            return Err(DeckError::TableNotFound(name.to_string()));
        }
        let conn = self.get_connection()?;
        conn.execute("BEGIN TRANSACTION", []).map_err(persistence)?;
        let dropped = conn
            .execute(&format!("DROP TABLE IF EXISTS \"{name}\""), [])
            .and_then(|_| conn.execute("DELETE FROM datadeck_catalog WHERE name = ?", params![name]));
        match dropped {
            Ok(_) => {
                conn.execute("COMMIT", []).map_err(persistence)?;
                debug!(table = %name, "dropped table");
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(persistence(e))
            }
        }
    }

    fn unique_name(&self, conn: &Connection, desired: &str) -> Result<String> {
        let base = clean_table_name(desired);
        let mut candidate = base.clone();
        let mut suffix = 0usize;
        loop {
            let registered: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM datadeck_catalog WHERE name = ?",
                    [&candidate],
                    |row| row.get(0),
                )
                .map_err(persistence)?;
            // The catalog does not list itself, so reserve it explicitly.
            if registered == 0 && candidate != CATALOG_TABLE {
                return Ok(candidate);
            }
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        }
    }

    fn columns(&self, conn: &Connection, table: &str) -> Result<Vec<ColumnMeta>> {
        let mut stmt = conn
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns
                 WHERE table_name = ? ORDER BY ordinal_position",
            )
            .map_err(persistence)?;
        let columns = stmt
            .query_map([table], |row| {
                Ok(ColumnMeta {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                })
            })
            .map_err(persistence)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(persistence)?;
        Ok(columns)
    }
}

fn persistence(e: duckdb::Error) -> DeckError {
    DeckError::Persistence(e.to_string())
}

fn json_to_duckdb(value: &serde_json::Value) -> duckdb::types::Value {
    use duckdb::types::Value;
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::BigInt(i)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// Derive a SQL-safe table name from a filename stem: lowercase, runs of
/// non-alphanumerics collapsed to underscores, leading digit prefixed.
pub fn clean_table_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut name = String::with_capacity(lowered.len());
    let mut last_underscore = false;
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() {
            name.push(ch);
            last_underscore = false;
        } else if !last_underscore && !name.is_empty() {
            name.push('_');
            last_underscore = true;
        }
    }
    let name = name.trim_end_matches('_').to_string();
    if name.is_empty() {
        return "uploaded_table".to_string();
    }
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("table_{name}")
    } else {
        name
    }
}
