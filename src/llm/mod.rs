//! Text-generation backends
//!
//! The SQL generator only depends on the [`TextBackend`] capability. One
//! implementation is chosen from configuration at startup and injected.

pub mod ollama;
pub mod openai;
pub mod stub;

use crate::config::{BackendKind, BackendSettings};
use crate::error::{DuiError, Result};
use crate::query_analyzer::{Intent, QueryType, Requirements};
use crate::schema_store::{ColumnDescriptor, ViewSchema};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use stub::StubBackend;

/// Schema summary for one selected view, reduced to the relevant columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSummary {
    pub view: String,
    pub description: String,
    pub relevant_columns: Vec<ColumnDescriptor>,
    pub total_columns: usize,
}

/// Plain-text generation rules, grouped by where they came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlRules {
    pub base_rules: Vec<String>,
    pub intent_rules: Vec<String>,
    pub type_rules: Vec<String>,
    pub requirement_rules: Vec<String>,
}

impl SqlRules {
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.base_rules
            .iter()
            .chain(&self.intent_rules)
            .chain(&self.type_rules)
            .chain(&self.requirement_rules)
    }
}

/// Everything the generator knows about one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub user_query: String,
    pub intent: Intent,
    pub query_type: QueryType,
    pub requirements: Requirements,
    pub selected_views: Vec<String>,
    pub schema_summary: Vec<ViewSummary>,
    pub rules: SqlRules,
    pub view_schemas: Vec<ViewSchema>,
    pub schema_prefix: String,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub context: GenerationContext,
}

impl Prompt {
    /// Size of the text actually sent to a hosted backend
    pub fn byte_len(&self) -> usize {
        self.system.len() + self.user.len()
    }
}

/// A backend that turns a rendered prompt into text
#[async_trait]
pub trait TextBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, prompt: &Prompt) -> Result<String>;
}

/// Construct the configured backend.
pub fn build_backend(settings: &BackendSettings) -> Result<Arc<dyn TextBackend>> {
    match settings.kind {
        BackendKind::Mock => Ok(Arc::new(StubBackend::new())),
        BackendKind::OpenAi | BackendKind::Gemini => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                DuiError::Config(format!(
                    "AI_API_KEY is required for the {} backend",
                    settings.kind.as_str()
                ))
            })?;
            let backend = OpenAiBackend::new(api_key, settings.base_url.clone(), settings.model.clone())
                .named(settings.kind.as_str());
            Ok(Arc::new(backend))
        }
        BackendKind::Ollama => Ok(Arc::new(OllamaBackend::new(
            settings.base_url.clone(),
            settings.model.clone(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_backend_by_kind() {
        let stub = build_backend(&BackendSettings::default()).unwrap();
        assert_eq!(stub.name(), "mock");

        let ollama = build_backend(&BackendSettings {
            kind: BackendKind::Ollama,
            model: "llama3.1:8b".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            ..BackendSettings::default()
        })
        .unwrap();
        assert_eq!(ollama.name(), "ollama");
    }

    #[test]
    fn test_openai_requires_api_key() {
        let settings = BackendSettings {
            kind: BackendKind::OpenAi,
            ..BackendSettings::default()
        };
        assert!(matches!(build_backend(&settings), Err(DuiError::Config(_))));
    }

    #[test]
    fn test_gemini_uses_compatible_endpoint() {
        let gemini = build_backend(&BackendSettings {
            kind: BackendKind::Gemini,
            model: "gemini-2.0-flash".to_string(),
            api_key: Some("g-test".to_string()),
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            ..BackendSettings::default()
        })
        .unwrap();
        assert_eq!(gemini.name(), "gemini");

        let missing_key = BackendSettings {
            kind: BackendKind::Gemini,
            ..BackendSettings::default()
        };
        match build_backend(&missing_key) {
            Err(DuiError::Config(msg)) => assert!(msg.contains("gemini")),
            other => panic!("expected config error, got {:?}", other.map(|b| b.name().to_string())),
        }
    }
}
