use super::{Prompt, TextBackend};
use crate::error::{DuiError, Result};
use async_trait::async_trait;
use tracing::debug;

/// Local model served by Ollama
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": format!("{}\n\nUser question: {}", prompt.system, prompt.user),
            "stream": false,
            "format": "json",
            "options": {"temperature": 0.1}
        })
    }
}

#[async_trait]
impl TextBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<String> {
        debug!("Calling Ollama at {} with model {}", self.base_url, self.model);
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| DuiError::Backend(format!("Ollama call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DuiError::Backend(format!(
                "Ollama returned HTTP {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DuiError::Backend(format!("Failed to parse Ollama response: {}", e)))?;

        response_json["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DuiError::Backend("No response text from Ollama".to_string()))
    }
}
