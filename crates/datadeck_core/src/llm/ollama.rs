//! Ollama backend: local models behind `/api/chat`, no API key.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{build_http_client, map_transport, LlmBackend};
use crate::config::LlmConfig;
use crate::error::{DeckError, Result};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaBackend {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            api_url: format!("{}/api/chat", base.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DeckError::UpstreamUnavailable(format!(
                "ollama error ({status}): {text}"
            )));
        }

        let parsed: OllamaResponse = response.json().await.map_err(|e| {
            DeckError::UpstreamSchemaChanged(format!("unexpected ollama response: {e}"))
        })?;
        Ok(parsed.message.content)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}
