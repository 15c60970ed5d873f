//! llama.cpp backend, speaking the OpenAI-compatible chat completions API
//! exposed by `llama-server`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{build_http_client, map_transport, LlmBackend};
use crate::config::LlmConfig;
use crate::error::{DeckError, Result};

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

pub struct LlamaCppBackend {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

impl LlamaCppBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            api_url: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmBackend for LlamaCppBackend {
    fn name(&self) -> &'static str {
        "llama-cpp"
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
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
                "llama.cpp error ({status}): {text}"
            )));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            DeckError::UpstreamSchemaChanged(format!("unexpected llama.cpp response: {e}"))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                DeckError::UpstreamSchemaChanged("llama.cpp returned no choices".to_string())
            })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}
