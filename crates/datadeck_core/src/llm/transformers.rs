//! Transformers backend: a plain HTTP sidecar exposing `/generate`, for
//! models served straight from a Python process.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{build_http_client, map_transport, LlmBackend};
use crate::config::LlmConfig;
use crate::error::{DeckError, Result};

const DEFAULT_BASE_URL: &str = "http://localhost:8001";

pub struct TransformersBackend {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

impl TransformersBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            api_url: format!("{}/generate", base.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmBackend for TransformersBackend {
    fn name(&self) -> &'static str {
        "transformers"
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        // The sidecar takes a single flattened prompt.
        let body = json!({
            "model": self.model,
            "prompt": format!("{system}\n\n{user}"),
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
                "transformers sidecar error ({status}): {text}"
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            DeckError::UpstreamSchemaChanged(format!("unexpected sidecar response: {e}"))
        })?;
        Ok(parsed.text)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}
