//! Static process configuration resolved from the environment at startup.

use anyhow::Result;
use directories::ProjectDirs;
use std::{env, fs, path::PathBuf};

/// Which inference backend serves chat calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    Ollama,
    LlamaCpp,
    Transformers,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub model: String,
    /// Base URL of the backend; each provider has its own default.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub max_upload_bytes: usize,
    /// Load PDFs with no recoverable table as a single text column instead
    /// of rejecting them.
    pub pdf_text_fallback: bool,
    pub public_sources_enabled: bool,
    pub covid_base_url: String,
    pub upstream_timeout_secs: u64,
    pub llm: Option<LlmConfig>,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
pub const DEFAULT_COVID_BASE_URL: &str = "https://disease.sh";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

fn app_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "DataDeck", "DataDeck")
        .ok_or_else(|| anyhow::anyhow!("ProjectDirs unavailable"))
}

/// Resolve the data directory, honoring the `DATADECK_DATA_DIR` override.
pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(custom) = env::var("DATADECK_DATA_DIR") {
        let dir = PathBuf::from(custom);
        fs::create_dir_all(&dir)?;
        return Ok(dir);
    }
    let pd = app_dirs()?;
    let dir = pd.data_dir().to_path_buf();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl AppConfig {
    /// Read the full configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let data_dir = default_data_dir()?;
        let db_path = env::var("DATADECK_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("datadeck.duckdb"));

        let host = env::var("DATADECK_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("DATADECK_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let max_upload_bytes = env::var("DATADECK_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        // Public sources default to enabled; set DATADECK_PUBLIC_SOURCES=0 to disable.
        let public_sources_enabled = env::var("DATADECK_PUBLIC_SOURCES")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let covid_base_url = env::var("DATADECK_COVID_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_COVID_BASE_URL.to_string());

        let upstream_timeout_secs = env::var("DATADECK_UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);

        Ok(Self {
            host,
            port,
            data_dir,
            db_path,
            max_upload_bytes,
            pdf_text_fallback: env_flag("DATADECK_PDF_TEXT_FALLBACK"),
            public_sources_enabled,
            covid_base_url,
            upstream_timeout_secs,
            llm: llm_config_from_env()?,
        })
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.data_dir.join("plots")
    }
}

fn llm_config_from_env() -> Result<Option<LlmConfig>> {
    let provider = match env::var("LLM_PROVIDER") {
        Ok(v) => v.to_lowercase(),
        Err(_) => return Ok(None),
    };
    let kind = match provider.as_str() {
        "ollama" => LlmProviderKind::Ollama,
        "llama-cpp" | "llama_cpp" | "llamacpp" => LlmProviderKind::LlamaCpp,
        "transformers" | "local" => LlmProviderKind::Transformers,
        "none" | "" => return Ok(None),
        other => anyhow::bail!("unknown LLM_PROVIDER: {other}"),
    };
    let model = env::var("LLM_MODEL").unwrap_or_else(|_| default_model(kind).to_string());
    let base_url = env::var("LLM_BASE_URL").ok();
    let timeout_secs = env::var("LLM_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(120);
    Ok(Some(LlmConfig {
        provider: kind,
        model,
        base_url,
        timeout_secs,
    }))
}

fn default_model(kind: LlmProviderKind) -> &'static str {
    match kind {
        LlmProviderKind::Ollama => "llama3.2",
        LlmProviderKind::LlamaCpp => "default",
        LlmProviderKind::Transformers => "default",
    }
}
