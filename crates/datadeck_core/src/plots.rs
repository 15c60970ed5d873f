//! Vega-Lite plot artifacts written to disk and served by file name.
//!
//! Plot generation is heuristic: numeric columns become binned histograms,
//! low-cardinality text columns become bar charts of counts, and at most
//! [`MAX_PLOTS`] specs are produced per table.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::batch::{ColumnType, TabularBatch};
use crate::error::{DeckError, Result};

pub const MAX_PLOTS: usize = 3;
/// Rows of data embedded into each spec.
const MAX_PLOT_VALUES: usize = 200;
/// Text columns with more distinct values than this are skipped.
const MAX_BAR_CATEGORIES: usize = 20;

const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotKind {
    Histogram,
    Bar,
    Line,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotDescriptor {
    pub column: String,
    pub kind: PlotKind,
    /// File name under the plot directory.
    pub file: String,
    /// Path the HTTP layer serves the spec from.
    pub url: String,
}

pub struct PlotStore {
    dir: PathBuf,
}

impl PlotStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write one spec and return its generated file name.
    pub fn write_spec(&self, spec: &Value) -> Result<String> {
        let file = format!("{}.json", Uuid::new_v4());
        let path = self.dir.join(&file);
        std::fs::write(&path, serde_json::to_vec_pretty(spec)?)?;
        debug!(file = %file, "wrote plot spec");
        Ok(file)
    }

    /// Resolve a served file name back to a path, refusing anything that
    /// escapes the plot directory.
    pub fn resolve(&self, file: &str) -> Result<PathBuf> {
        let candidate = self.dir.join(file);
        let dir = self.dir.canonicalize()?;
        let resolved = candidate
            .canonicalize()
            .map_err(|_| DeckError::InvalidParams(format!("unknown plot '{file}'")))?;
        if !resolved.starts_with(&dir) {
            return Err(DeckError::InvalidParams(format!("unknown plot '{file}'")));
        }
        Ok(resolved)
    }

    /// Build plot specs for a freshly registered table.
    pub fn generate(&self, table: &str, batch: &TabularBatch) -> Result<Vec<PlotDescriptor>> {
        let mut plots = Vec::new();

        // A temporal-looking column next to a numeric one becomes a line
        // chart over that axis.
        if let Some((time_idx, value_idx)) = line_pair(batch) {
            let spec = build_line_spec(table, batch, time_idx, value_idx);
            let file = self.write_spec(&spec)?;
            plots.push(PlotDescriptor {
                column: batch.columns[value_idx].clone(),
                kind: PlotKind::Line,
                url: format!("/artifacts/{file}"),
                file,
            });
        }

        for (idx, (column, ty)) in batch.columns.iter().zip(&batch.column_types).enumerate() {
            if plots.len() >= MAX_PLOTS {
                break;
            }
            let kind = match ty {
                _ if ty.is_numeric() => PlotKind::Histogram,
                ColumnType::Text if distinct_count(batch, idx) <= MAX_BAR_CATEGORIES => {
                    PlotKind::Bar
                }
                _ => continue,
            };
            let spec = build_spec(table, column, kind, column_values(batch, idx));
            let file = self.write_spec(&spec)?;
            let url = format!("/artifacts/{file}");
            plots.push(PlotDescriptor {
                column: column.clone(),
                kind,
                file,
                url,
            });
        }
        Ok(plots)
    }
}

fn column_values(batch: &TabularBatch, idx: usize) -> Vec<Value> {
    batch
        .rows
        .iter()
        .take(MAX_PLOT_VALUES)
        .filter(|row| !row[idx].is_null())
        .map(|row| json!({ batch.columns[idx].clone(): row[idx].clone() }))
        .collect()
}

fn distinct_count(batch: &TabularBatch, idx: usize) -> usize {
    let mut seen: Vec<&Value> = Vec::new();
    for row in &batch.rows {
        let v = &row[idx];
        if !v.is_null() && !seen.contains(&v) {
            seen.push(v);
        }
    }
    seen.len()
}

fn build_spec(table: &str, column: &str, kind: PlotKind, values: Vec<Value>) -> Value {
    let encoding = match kind {
        PlotKind::Histogram => json!({
            "x": { "bin": true, "field": column, "type": "quantitative" },
            "y": { "aggregate": "count", "type": "quantitative" }
        }),
        // Bar and single-column line both count occurrences per value.
        PlotKind::Bar | PlotKind::Line => json!({
            "x": { "field": column, "type": "nominal", "sort": "-y" },
            "y": { "aggregate": "count", "type": "quantitative" }
        }),
    };
    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": format!("{table}: {column}"),
        "data": { "values": values },
        "mark": "bar",
        "encoding": encoding
    })
}

/// A text column that looks like a time axis, paired with the first numeric
/// column, if both exist.
fn line_pair(batch: &TabularBatch) -> Option<(usize, usize)> {
    const TIME_HINTS: &[&str] = &["date", "time", "month", "year", "day", "week"];
    let time_idx = batch.columns.iter().enumerate().position(|(i, name)| {
        let lowered = name.to_lowercase();
        batch.column_types[i] == ColumnType::Text
            && TIME_HINTS.iter().any(|h| lowered.contains(h))
    })?;
    let value_idx = batch
        .column_types
        .iter()
        .position(|ty| ty.is_numeric())?;
    Some((time_idx, value_idx))
}

fn build_line_spec(table: &str, batch: &TabularBatch, time_idx: usize, value_idx: usize) -> Value {
    let time_col = &batch.columns[time_idx];
    let value_col = &batch.columns[value_idx];
    let values: Vec<Value> = batch
        .rows
        .iter()
        .take(MAX_PLOT_VALUES)
        .filter(|row| !row[time_idx].is_null() && !row[value_idx].is_null())
        .map(|row| {
            json!({
                time_col.clone(): row[time_idx].clone(),
                value_col.clone(): row[value_idx].clone()
            })
        })
        .collect();
    json!({
        "$schema": VEGA_LITE_SCHEMA,
        "title": format!("{table}: {value_col} over {time_col}"),
        "data": { "values": values },
        "mark": "line",
        "encoding": {
            "x": { "field": time_col, "type": "ordinal" },
            "y": { "field": value_col, "type": "quantitative" }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn batch() -> TabularBatch {
        TabularBatch::from_rows(
            vec!["city".to_string(), "pop".to_string(), "note".to_string()],
            vec![
                vec![json!("paris"), json!(2_100_000), json!("a")],
                vec![json!("lyon"), json!(520_000), json!("b")],
                vec![json!("paris"), json!(2_100_000), json!("c")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn generates_histogram_and_bar_specs() {
        let dir = TempDir::new().unwrap();
        let store = PlotStore::new(dir.path()).unwrap();
        let plots = store.generate("cities", &batch()).unwrap();

        assert!(plots.len() >= 2);
        let by_col = |name: &str| plots.iter().find(|p| p.column == name).unwrap();
        assert_eq!(by_col("pop").kind, PlotKind::Histogram);
        assert_eq!(by_col("city").kind, PlotKind::Bar);
        for plot in &plots {
            assert!(plot.url.starts_with("/artifacts/"));
            let written: Value =
                serde_json::from_slice(&std::fs::read(dir.path().join(&plot.file)).unwrap())
                    .unwrap();
            assert_eq!(written["$schema"], json!(VEGA_LITE_SCHEMA));
        }
    }

    #[test]
    fn never_more_than_the_plot_cap() {
        let dir = TempDir::new().unwrap();
        let store = PlotStore::new(dir.path()).unwrap();
        let wide = TabularBatch::from_rows(
            (0..6).map(|i| format!("n{i}")).collect(),
            vec![(0..6).map(|i| json!(i)).collect(), (0..6).map(|i| json!(i * 2)).collect()],
        )
        .unwrap();
        let plots = store.generate("wide", &wide).unwrap();
        assert_eq!(plots.len(), MAX_PLOTS);
    }

    #[test]
    fn temporal_column_produces_a_line_plot() {
        let dir = TempDir::new().unwrap();
        let store = PlotStore::new(dir.path()).unwrap();
        let series = TabularBatch::from_rows(
            vec!["month".to_string(), "sales".to_string()],
            vec![
                vec![json!("jan"), json!(10)],
                vec![json!("feb"), json!(14)],
                vec![json!("mar"), json!(9)],
            ],
        )
        .unwrap();
        let plots = store.generate("sales", &series).unwrap();
        assert_eq!(plots[0].kind, PlotKind::Line);
        assert_eq!(plots[0].column, "sales");
    }

    #[test]
    fn resolve_refuses_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = PlotStore::new(dir.path().join("plots")).unwrap();
        let file = store.write_spec(&json!({"mark": "bar"})).unwrap();
        assert!(store.resolve(&file).is_ok());
        assert!(store.resolve("../escape.json").is_err());
        assert!(store.resolve("missing.json").is_err());
    }
}
