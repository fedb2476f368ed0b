use super::{Prompt, TextBackend};
use crate::error::{DuiError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

/// OpenAI-compatible chat completions backend
pub struct OpenAiBackend {
    name: String,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            name: "openai".to_string(),
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    /// Report under another provider name, for compatible endpoints
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl TextBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user}
            ],
            "temperature": 0.1,
            "max_tokens": 1000
        });

        debug!("Calling {} with model {}", self.base_url, self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DuiError::Backend(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &detail));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DuiError::Backend(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| DuiError::Backend("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

fn classify_failure(status: StatusCode, detail: &str) -> DuiError {
    let lowered = detail.to_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS || lowered.contains("quota") {
        DuiError::RateLimited(format!("HTTP {}", status.as_u16()))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        DuiError::Backend("invalid credentials".to_string())
    } else {
        DuiError::Backend(format!("HTTP {}: {}", status.as_u16(), detail.trim()))
    }
}
