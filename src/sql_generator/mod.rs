//! SQL Generator
//!
//! Builds a bounded prompt from the selected views, calls the injected text
//! backend under a timeout, classifies the answer and normalizes the SQL.
//! Generation never fails outright: problems come back as a `GeneratedSql`
//! record with `success == false`.

pub mod prompt;
pub mod response;

use crate::config::{BackendKind, BackendSettings, DEFAULT_SCHEMA_PREFIX};
use crate::error::{DuiError, Result};
use crate::llm::{build_backend, Prompt, StubBackend, TextBackend};
use crate::query_analyzer::QueryAnalysis;
use crate::schema_store::SchemaStore;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub use response::{normalize_sql, views_referenced, BackendResponse, StructuredResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSql {
    pub success: bool,
    pub sql: String,
    pub explanation: String,
    pub views_referenced: Vec<String>,
    pub view_used: String,
    pub security_note: String,
    /// Backend that produced the text, including any fallback
    pub backend: String,
    pub prompt_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeneratedSql {
    fn failure(selected_views: &[String], backend: &str, prompt_bytes: usize, error: String) -> Self {
        Self {
            success: false,
            sql: String::new(),
            explanation: format!("SQL generation failed: {}", error),
            views_referenced: Vec::new(),
            view_used: selected_views.join(", "),
            security_note: "Generation failed".to_string(),
            backend: backend.to_string(),
            prompt_bytes,
            error: Some(error),
        }
    }
}

pub struct SqlGenerator {
    store: Arc<SchemaStore>,
    backend: Arc<dyn TextBackend>,
    fallback: Option<Arc<dyn TextBackend>>,
    timeout: Duration,
    schema_prefix: String,
}

impl SqlGenerator {
    pub fn new(store: Arc<SchemaStore>, backend: Arc<dyn TextBackend>) -> Self {
        Self {
            store,
            backend,
            fallback: None,
            timeout: DEFAULT_TIMEOUT,
            schema_prefix: DEFAULT_SCHEMA_PREFIX.to_string(),
        }
    }

    /// Build the configured backend; hosted and local backends get the
    /// deterministic backend as rate-limit substitute when enabled.
    pub fn from_settings(store: Arc<SchemaStore>, settings: &BackendSettings) -> Result<Self> {
        let backend = build_backend(settings)?;
        let mut generator = Self::new(store, backend).with_timeout(settings.timeout());
        if settings.fallback_on_rate_limit && settings.kind != BackendKind::Mock {
            generator = generator.with_fallback(Arc::new(StubBackend::new()));
        }
        Ok(generator)
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn TextBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_schema_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.schema_prefix = prefix.into();
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn schema_prefix(&self) -> &str {
        &self.schema_prefix
    }

    /// Render the prompt for a request, or `None` when no selected view resolves.
    pub fn build_prompt(
        &self,
        query: &str,
        selected_views: &[String],
        analysis: &QueryAnalysis,
    ) -> Option<Prompt> {
        let schemas = self.store.get_view_schemas(selected_views);
        if schemas.is_empty() {
            return None;
        }
        let context = prompt::build_context(
            query,
            &schemas,
            analysis,
            &self.schema_prefix,
            Local::now().date_naive(),
        );
        Some(prompt::build_prompt(context))
    }

    pub async fn generate(
        &self,
        query: &str,
        selected_views: &[String],
        analysis: &QueryAnalysis,
    ) -> GeneratedSql {
        let prompt = match self.build_prompt(query, selected_views, analysis) {
            Some(prompt) => prompt,
            None => {
                error!("SQL generation failed: no schemas for {:?}", selected_views);
                return GeneratedSql::failure(
                    selected_views,
                    self.backend.name(),
                    0,
                    "No valid schemas found for selected views".to_string(),
                );
            }
        };
        let prompt_bytes = prompt.byte_len();

        let (raw, backend) = match self.invoke(&prompt).await {
            Ok(result) => result,
            Err(e) => {
                error!("SQL generation failed: {}", e);
                return GeneratedSql::failure(
                    selected_views,
                    self.backend.name(),
                    prompt_bytes,
                    e.to_string(),
                );
            }
        };

        let (sql, explanation, view_used, security_note) = match BackendResponse::classify(&raw) {
            BackendResponse::Structured(resp) => (
                resp.sql_query,
                resp.explanation,
                resp.view_used,
                resp.security_note,
            ),
            BackendResponse::RawText(text) => (
                text,
                "Generated using direct model response".to_string(),
                prompt.context.selected_views.join(", "),
                "Standard security measures applied".to_string(),
            ),
        };

        let sql = normalize_sql(&sql, &self.schema_prefix, &prompt.context.selected_views);
        if sql.is_empty() {
            warn!("Backend {} returned no SQL", backend);
            return GeneratedSql::failure(
                selected_views,
                &backend,
                prompt_bytes,
                "Backend returned an empty query".to_string(),
            );
        }

        info!(
            "SQL generated with {} using {} views",
            backend,
            prompt.context.selected_views.len()
        );

        GeneratedSql {
            success: true,
            views_referenced: views_referenced(&sql, &self.schema_prefix),
            sql,
            explanation,
            view_used,
            security_note,
            backend,
            prompt_bytes,
            error: None,
        }
    }

    /// One call to the primary backend; on rate limiting, at most one call to
    /// the fallback. Returns the text and the provenance string.
    async fn invoke(&self, prompt: &Prompt) -> Result<(String, String)> {
        match call_with_timeout(self.backend.as_ref(), prompt, self.timeout).await {
            Ok(text) => Ok((text, self.backend.name().to_string())),
            Err(DuiError::RateLimited(reason)) => match &self.fallback {
                Some(fallback) => {
                    warn!(
                        "Backend {} rate limited ({}), falling back to {}",
                        self.backend.name(),
                        reason,
                        fallback.name()
                    );
                    let text = call_with_timeout(fallback.as_ref(), prompt, self.timeout).await?;
                    Ok((
                        text,
                        format!("{} (fallback to {})", self.backend.name(), fallback.name()),
                    ))
                }
                None => Err(DuiError::RateLimited(reason)),
            },
            Err(e) => Err(e),
        }
    }
}

async fn call_with_timeout(
    backend: &dyn TextBackend,
    prompt: &Prompt,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, backend.invoke(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(DuiError::Timeout(timeout.as_secs())),
    }
}
