//! Optional LLM integration for summaries and chat.
//!
//! Every feature that talks to a model also has a deterministic path, so
//! the service works fully with no backend configured.
//!
//! Supported backends, all local-first and keyless:
//! - **Ollama** - `/api/chat` on a local Ollama daemon
//! - **llama.cpp** - an OpenAI-compatible `/v1/chat/completions` server
//! - **Transformers** - a plain `/generate` HTTP sidecar

mod llama_cpp;
mod ollama;
mod transformers;

use std::sync::Arc;

use async_trait::async_trait;

pub use llama_cpp::LlamaCppBackend;
pub use ollama::OllamaBackend;
pub use transformers::TransformersBackend;

use crate::config::{LlmConfig, LlmProviderKind};
use crate::error::{DeckError, Result};

/// A chat-capable model backend.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send one system + user exchange and return the assistant text.
    async fn chat(&self, system: &str, user: &str) -> Result<String>;
}

/// Build the backend named by the configuration.
pub fn backend_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>> {
    let backend: Arc<dyn LlmBackend> = match config.provider {
        LlmProviderKind::Ollama => Arc::new(OllamaBackend::new(config)?),
        LlmProviderKind::LlamaCpp => Arc::new(LlamaCppBackend::new(config)?),
        LlmProviderKind::Transformers => Arc::new(TransformersBackend::new(config)?),
    };
    Ok(backend)
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DeckError::InvalidParams(format!("cannot build HTTP client: {e}")))
}

pub(crate) fn map_transport(e: reqwest::Error) -> DeckError {
    if e.is_timeout() {
        DeckError::UpstreamTimeout(e.to_string())
    } else {
        DeckError::UpstreamUnavailable(e.to_string())
    }
}
