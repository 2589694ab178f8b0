use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::app::ports::TextExtractionPort;
use crate::config::ExtractionConfig;
use crate::error::{Result, ValidatorError};

/// OpenAI-compatible chat-completions adapter. Built only when the API key
/// is present in the environment; otherwise the AI path stays switched off
/// and raw requests short-circuit without a call.
#[derive(Debug)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionsClient {
    pub fn from_env(config: &ExtractionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ValidatorError::Config(format!(
                "extraction API key not set ({} is empty)",
                config.api_key_env
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl TextExtractionPort for ChatCompletionsClient {
    async fn extract(&self, instruction: &str, raw_text: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": instruction },
                { "role": "user", "content": raw_text },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ValidatorError::ExtractionUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ValidatorError::ExtractionUnavailable(format!(
                "text model returned status {}",
                response.status()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ValidatorError::ExtractionUnavailable(e.to_string()))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ValidatorError::ExtractionParse(
                    "model response carried no message content".to_string(),
                )
            })?;

        debug!(bytes = content.len(), "text model responded");
        Ok(content.to_string())
    }
}
