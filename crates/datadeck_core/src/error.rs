//! Error types shared across the DataDeck crates.

use thiserror::Error;

/// Main error type for DataDeck operations.
#[derive(Debug, Error)]
pub enum DeckError {
    /// Upload exceeds the configured size limit; rejected before parsing.
    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },

    /// Malformed or unsupported input data.
    #[error("parse error: {0}")]
    Parse(String),

    /// The embedded database rejected a write.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Referenced table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Query failed; carries the engine's message verbatim.
    #[error("{0}")]
    Query(String),

    /// Public data source or LLM backend could not be reached.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Outbound call exceeded its bounded timeout.
    #[error("upstream timed out: {0}")]
    UpstreamTimeout(String),

    /// Upstream response no longer matches the expected shape.
    #[error("upstream schema changed: {0}")]
    UpstreamSchemaChanged(String),

    /// Caller-supplied parameters are invalid.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl DeckError {
    /// Stable machine-readable tag used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            DeckError::FileTooLarge { .. } => "file_too_large",
            DeckError::Parse(_) => "parse_error",
            DeckError::Persistence(_) => "persistence_error",
            DeckError::TableNotFound(_) => "table_not_found",
            DeckError::Query(_) => "query_error",
            DeckError::UpstreamUnavailable(_) => "upstream_unavailable",
            DeckError::UpstreamTimeout(_) => "upstream_timeout",
            DeckError::UpstreamSchemaChanged(_) => "upstream_schema_changed",
            DeckError::InvalidParams(_) => "invalid_params",
            DeckError::Io(_) => "io_error",
            DeckError::Json(_) => "json_error",
            DeckError::Csv(_) => "parse_error",
        }
    }
}

/// Result type alias for DataDeck operations.
pub type Result<T> = std::result::Result<T, DeckError>;
