//! Table summaries: mode-templated LLM prompts over a deterministic
//! sample, with a fully deterministic fallback when no model is
//! configured or the model cannot be reached.
//!
//! The fallback is a normal success path, not an error: it reports the
//! same profile the prompt is built from, so the endpoint behaves the
//! same with or without a backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{DeckError, Result};
use crate::llm::LlmBackend;
use crate::query::{QueryGateway, QueryResult};
use crate::registry::{TableMeta, TableRegistry};

pub const MIN_SAMPLE_ROWS: usize = 1;
pub const MAX_SAMPLE_ROWS: usize = 500;
pub const DEFAULT_SAMPLE_ROWS: usize = 100;

/// Provider tag reported when the deterministic path produced the text.
pub const FALLBACK_PROVIDER: &str = "fallback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    Overview,
    Statistical,
    Insights,
    Business,
}

impl SummaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryMode::Overview => "overview",
            SummaryMode::Statistical => "statistical",
            SummaryMode::Insights => "insights",
            SummaryMode::Business => "business",
        }
    }
}

impl fmt::Display for SummaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryMode {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            // "general" is the legacy alias for overview.
            "overview" | "general" | "" => Ok(SummaryMode::Overview),
            "statistical" => Ok(SummaryMode::Statistical),
            "insights" => Ok(SummaryMode::Insights),
            "business" => Ok(SummaryMode::Business),
            other => Err(DeckError::InvalidParams(format!(
                "unknown summary mode '{other}'; available: overview, statistical, insights, business"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOutcome {
    pub table: String,
    pub mode: SummaryMode,
    pub summary: String,
    /// Backend that produced the text, or [`FALLBACK_PROVIDER`].
    pub provider: String,
    pub sampled_rows: usize,
}

/// Per-column profile computed with SQL over the full table.
#[derive(Debug, Clone)]
struct ColumnProfile {
    name: String,
    data_type: String,
    null_count: i64,
    distinct_count: i64,
    min: Option<String>,
    max: Option<String>,
    avg: Option<f64>,
}

pub struct SummaryEngine {
    registry: Arc<TableRegistry>,
    gateway: Arc<QueryGateway>,
    llm: Option<Arc<dyn LlmBackend>>,
}

impl SummaryEngine {
    pub fn new(
        registry: Arc<TableRegistry>,
        gateway: Arc<QueryGateway>,
        llm: Option<Arc<dyn LlmBackend>>,
    ) -> Self {
        Self { registry, gateway, llm }
    }

    /// Summarize a registered table. `sample_size` is clamped to
    /// [`MIN_SAMPLE_ROWS`]..=[`MAX_SAMPLE_ROWS`]; `None` uses the default.
    pub async fn summarize(
        &self,
        table: &str,
        mode: SummaryMode,
        sample_size: Option<usize>,
    ) -> Result<SummaryOutcome> {
        let meta = self
            .registry
            .meta(table)?
            .ok_or_else(|| DeckError::TableNotFound(table.to_string()))?;

        let sample_size = sample_size
            .unwrap_or(DEFAULT_SAMPLE_ROWS)
            .clamp(MIN_SAMPLE_ROWS, MAX_SAMPLE_ROWS);
        let sample = self.sample(table, sample_size)?;
        let profiles = self.profile_columns(&meta)?;

        if let Some(llm) = &self.llm {
            let prompt = build_prompt(&meta, mode, &sample, &profiles);
            match llm.chat(SYSTEM_PROMPT, &prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Ok(SummaryOutcome {
                        table: meta.name,
                        mode,
                        summary: text.trim().to_string(),
                        provider: llm.name().to_string(),
                        sampled_rows: sample.row_count,
                    });
                }
                Ok(_) => warn!(table = %meta.name, "model returned an empty summary"),
                Err(e) => warn!(table = %meta.name, error = %e, "model summary failed"),
            }
        } else {
            debug!(table = %meta.name, "no model configured, using deterministic summary");
        }

        Ok(SummaryOutcome {
            table: meta.name.clone(),
            mode,
            summary: fallback_summary(&meta, mode, &profiles),
            provider: FALLBACK_PROVIDER.to_string(),
            sampled_rows: sample.row_count,
        })
    }

    /// First N rows in insertion order, so repeated calls see the same
    /// sample.
    fn sample(&self, table: &str, limit: usize) -> Result<QueryResult> {
        self.gateway
            .execute(&format!("SELECT * FROM \"{table}\" LIMIT {limit}"))
    }

    fn profile_columns(&self, meta: &TableMeta) -> Result<Vec<ColumnProfile>> {
        let mut profiles = Vec::with_capacity(meta.columns.len());
        for col in &meta.columns {
            let numeric = is_numeric_type(&col.data_type);
            let avg_expr = if numeric {
                format!("AVG(\"{}\")", col.name)
            } else {
                "NULL".to_string()
            };
            let stats_sql = format!(
                "SELECT COUNT(*) - COUNT(\"{0}\") AS null_count,
                        COUNT(DISTINCT \"{0}\") AS distinct_count,
                        MIN(\"{0}\")::VARCHAR AS min_value,
                        MAX(\"{0}\")::VARCHAR AS max_value,
                        {2} AS avg_value
                 FROM \"{1}\"",
                col.name, meta.name, avg_expr
            );
            let result = self.gateway.execute(&stats_sql)?;
            let row = result.rows.first().cloned().unwrap_or_default();
            profiles.push(ColumnProfile {
                name: col.name.clone(),
                data_type: col.data_type.clone(),
                null_count: row.get("null_count").and_then(|v| v.as_i64()).unwrap_or(0),
                distinct_count: row
                    .get("distinct_count")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0),
                min: row.get("min_value").and_then(|v| v.as_str().map(str::to_string)),
                max: row.get("max_value").and_then(|v| v.as_str().map(str::to_string)),
                avg: row.get("avg_value").and_then(|v| v.as_f64()),
            });
        }
        Ok(profiles)
    }
}

fn is_numeric_type(data_type: &str) -> bool {
    let t = data_type.to_uppercase();
    t.contains("INT") || t.contains("DOUBLE") || t.contains("FLOAT") || t.contains("DECIMAL")
}

const SYSTEM_PROMPT: &str = "You are a data analyst. You are given a table profile and a \
sample of rows. Answer concisely in plain prose, grounded only in the data shown.";

fn mode_instruction(mode: SummaryMode) -> &'static str {
    match mode {
        SummaryMode::Overview => {
            "Give a short overview of what this dataset contains: its subject, \
             its columns, and the rough shape of the data."
        }
        SummaryMode::Statistical => {
            "Describe the statistical properties of the data: ranges, averages, \
             distinct counts, nulls, and anything unusual about the distributions."
        }
        SummaryMode::Insights => {
            "Point out notable patterns, outliers, and relationships between \
             columns that a reader should look into."
        }
        SummaryMode::Business => {
            "Explain what this data means for business decisions: trends worth \
             acting on, risks, and opportunities, in non-technical language."
        }
    }
}

fn build_prompt(
    meta: &TableMeta,
    mode: SummaryMode,
    sample: &QueryResult,
    profiles: &[ColumnProfile],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Table '{}' has {} rows and {} columns.\n\nColumn profile:\n",
        meta.name, meta.row_count, meta.column_count
    ));
    for p in profiles {
        prompt.push_str(&format!(
            "- {} ({}): {} distinct, {} null",
            p.name, p.data_type, p.distinct_count, p.null_count
        ));
        if let Some(avg) = p.avg {
            prompt.push_str(&format!(
                ", min {}, max {}, avg {avg:.2}",
                p.min.as_deref().unwrap_or("-"),
                p.max.as_deref().unwrap_or("-")
            ));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("\nSample of the first {} rows:\n", sample.row_count));
    prompt.push_str(&format!("{}\n", sample.columns.join(" | ")));
    for row in &sample.rows {
        let cells: Vec<String> = sample
            .columns
            .iter()
            .map(|col| render_cell(row.get(col).unwrap_or(&serde_json::Value::Null)))
            .collect();
        prompt.push_str(&format!("{}\n", cells.join(" | ")));
    }
    prompt.push_str(&format!("\n{}\n", mode_instruction(mode)));
    prompt
}

fn render_cell(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Deterministic summary built only from the computed profile. Same table
/// state and mode always yield the same text.
fn fallback_summary(meta: &TableMeta, mode: SummaryMode, profiles: &[ColumnProfile]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Table '{}' contains {} rows across {} columns.",
        meta.name, meta.row_count, meta.column_count
    ));

    match mode {
        SummaryMode::Overview => {
            let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
            out.push_str(&format!(" Columns: {}.", names.join(", ")));
            out.push_str(&format!(
                " The data was loaded from '{}'.",
                meta.source_file
            ));
        }
        SummaryMode::Statistical => {
            for p in profiles {
                out.push_str(&format!(
                    " Column '{}' ({}) has {} distinct values and {} nulls",
                    p.name,
                    p.data_type.to_lowercase(),
                    p.distinct_count,
                    p.null_count
                ));
                if let Some(avg) = p.avg {
                    out.push_str(&format!(
                        "; range {} to {}, mean {avg:.2}",
                        p.min.as_deref().unwrap_or("-"),
                        p.max.as_deref().unwrap_or("-")
                    ));
                }
                out.push('.');
            }
        }
        SummaryMode::Insights => {
            if let Some(widest) = profiles.iter().max_by_key(|p| p.distinct_count) {
                out.push_str(&format!(
                    " The most varied column is '{}' with {} distinct values.",
                    widest.name, widest.distinct_count
                ));
            }
            let with_nulls: Vec<&ColumnProfile> =
                profiles.iter().filter(|p| p.null_count > 0).collect();
            if with_nulls.is_empty() {
                out.push_str(" No column contains null values.");
            } else {
                for p in with_nulls {
                    out.push_str(&format!(
                        " Column '{}' is missing {} values.",
                        p.name, p.null_count
                    ));
                }
            }
        }
        SummaryMode::Business => {
            let numeric: Vec<&ColumnProfile> =
                profiles.iter().filter(|p| p.avg.is_some()).collect();
            if numeric.is_empty() {
                out.push_str(" The table holds descriptive data with no numeric measures.");
            } else {
                for p in numeric {
                    if let Some(avg) = p.avg {
                        out.push_str(&format!(
                            " Measure '{}' averages {avg:.2} over the recorded rows.",
                            p.name
                        ));
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::TabularBatch;
    use serde_json::json;
    use tempfile::TempDir;

    fn engine() -> (TempDir, SummaryEngine) {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("deck.db");
        let registry = Arc::new(TableRegistry::new(&db).unwrap());
        let batch = TabularBatch::from_rows(
            vec!["product".to_string(), "units".to_string()],
            vec![
                vec![json!("widget"), json!(12)],
                vec![json!("gadget"), json!(30)],
                vec![json!("widget"), json!(8)],
            ],
        )
        .unwrap();
        registry.register("sales", "sales.csv", &batch).unwrap();
        let gateway = Arc::new(QueryGateway::new(&db));
        (dir, SummaryEngine::new(registry, gateway, None))
    }

    #[test]
    fn mode_parsing_and_aliases() {
        assert_eq!("overview".parse::<SummaryMode>().unwrap(), SummaryMode::Overview);
        assert_eq!("general".parse::<SummaryMode>().unwrap(), SummaryMode::Overview);
        assert_eq!("Business".parse::<SummaryMode>().unwrap(), SummaryMode::Business);
        assert!("poetic".parse::<SummaryMode>().is_err());
    }

    #[tokio::test]
    async fn fallback_summary_is_deterministic() {
        let (_dir, engine) = engine();
        let a = engine
            .summarize("sales", SummaryMode::Statistical, None)
            .await
            .unwrap();
        let b = engine
            .summarize("sales", SummaryMode::Statistical, None)
            .await
            .unwrap();
        assert_eq!(a.summary, b.summary);
        assert_eq!(a.provider, FALLBACK_PROVIDER);
        assert!(a.summary.contains("3 rows"));
        assert!(a.summary.contains("units"));
    }

    #[tokio::test]
    async fn sample_size_is_clamped() {
        let (_dir, engine) = engine();
        let outcome = engine
            .summarize("sales", SummaryMode::Overview, Some(10_000))
            .await
            .unwrap();
        // Table only has 3 rows; the clamp caps the LIMIT, not the result.
        assert_eq!(outcome.sampled_rows, 3);
    }

    #[tokio::test]
    async fn unknown_table_is_not_found() {
        let (_dir, engine) = engine();
        let err = engine
            .summarize("ghost", SummaryMode::Overview, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DeckError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn modes_produce_distinct_fallback_text() {
        let (_dir, engine) = engine();
        let overview = engine.summarize("sales", SummaryMode::Overview, None).await.unwrap();
        let business = engine.summarize("sales", SummaryMode::Business, None).await.unwrap();
        assert_ne!(overview.summary, business.summary);
        assert!(business.summary.contains("averages"));
    }
}
