//! Per-format readers that normalize uploads into a [`TabularBatch`].

mod csv_file;
mod excel;
mod json_file;
mod pdf;

use crate::batch::TabularBatch;
use crate::error::{DeckError, Result};

pub use pdf::table_from_text;

/// Extensions accepted by the upload endpoint.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "json", "xlsx", "xls", "pdf"];

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub max_file_bytes: usize,
    /// When set, a PDF with no recoverable table becomes a single-column
    /// table of its extracted text lines instead of a parse error.
    pub pdf_text_fallback: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: crate::config::DEFAULT_MAX_UPLOAD_BYTES,
            pdf_text_fallback: false,
        }
    }
}

pub fn is_supported_extension(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.').to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Parse raw file bytes according to the declared extension.
///
/// The size gate runs before any format work so oversized files are
/// rejected cheaply.
pub fn parse(bytes: &[u8], extension: &str, config: &ParserConfig) -> Result<TabularBatch> {
    if bytes.len() > config.max_file_bytes {
        return Err(DeckError::FileTooLarge {
            size: bytes.len(),
            limit: config.max_file_bytes,
        });
    }
    let ext = extension.trim_start_matches('.').to_lowercase();
    match ext.as_str() {
        "csv" | "tsv" => csv_file::parse_csv(bytes),
        "json" => json_file::parse_json(bytes),
        "xlsx" | "xls" => excel::parse_excel(bytes),
        "pdf" => pdf::parse_pdf(bytes, config),
        other => Err(DeckError::Parse(format!(
            "unsupported file type '.{other}'; allowed: {}",
            SUPPORTED_EXTENSIONS
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_file_is_rejected_before_parsing() {
        let config = ParserConfig {
            max_file_bytes: 8,
            ..Default::default()
        };
        let err = parse(b"a,b\n1,2\n3,4\n", "csv", &config).unwrap_err();
        assert!(matches!(err, DeckError::FileTooLarge { .. }));
    }

    #[test]
    fn unknown_extension_is_a_parse_error() {
        let err = parse(b"...", "docx", &ParserConfig::default()).unwrap_err();
        assert!(matches!(err, DeckError::Parse(_)));
    }

    #[test]
    fn extension_allow_list() {
        assert!(is_supported_extension(".CSV"));
        assert!(is_supported_extension("xlsx"));
        assert!(!is_supported_extension("parquet"));
    }
}
