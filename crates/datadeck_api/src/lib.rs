//! Request and response types shared by the DataDeck HTTP API and its
//! clients. These mirror the JSON wire contract exactly: every success
//! body carries `success: true`, every failure body `success: false` with
//! a machine-readable `kind`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use datadeck_core::chat::{ChatIntent, ChatReply};
pub use datadeck_core::plots::{PlotDescriptor, PlotKind};
pub use datadeck_core::query::{QueryResult, Row};
pub use datadeck_core::summary::SummaryMode;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Error body returned by every endpoint on failure.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub kind: String,
}

/// Root endpoint body describing the service.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiInfo {
    pub name: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadResponse {
    pub success: bool,
    pub table_name: String,
    pub row_count: i64,
    pub column_count: i64,
    pub columns: Vec<ColumnInfo>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub plot_data: Vec<PlotDescriptor>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QueryRequest {
    pub query: String,
    /// Advisory only; the statement itself names its tables.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub table_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QueryResponse {
    pub success: bool,
    pub columns: Vec<String>,
    /// Result rows as column-keyed objects.
    pub data: Vec<Row>,
    pub row_count: usize,
}

impl From<QueryResult> for QueryResponse {
    fn from(result: QueryResult) -> Self {
        Self {
            success: true,
            columns: result.columns,
            data: result.rows,
            row_count: result.row_count,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SummaryRequest {
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sample_size: Option<usize>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SummaryResponse {
    pub success: bool,
    pub table_name: String,
    pub summary: String,
    pub summary_type: SummaryMode,
    pub provider: String,
    pub sampled_rows: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TableInfo {
    pub name: String,
    pub source_file: String,
    pub row_count: i64,
    pub column_count: i64,
    pub columns: Vec<ColumnInfo>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TablesResponse {
    pub tables: Vec<TableInfo>,
    pub count: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicDataRequest {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub table_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicDataResponse {
    pub success: bool,
    pub source: String,
    pub table_name: String,
    pub row_count: i64,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatRequest {
    pub message: String,
}

/// Chat responses flatten the reply variant, so the body carries a `type`
/// tag of `text`, `sql`, or `plot` plus that variant's fields.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatResponse {
    pub success: bool,
    pub intent: ChatIntent,
    #[serde(flatten)]
    pub reply: ChatReply,
    pub provider: String,
}
