//! Query pipeline
//!
//! Runs one question through analysis, view selection, SQL generation and
//! validation, then aggregates every intermediate artifact into a single
//! response. Execution is a separate, optional step behind an injected
//! [`SqlExecutor`].

use crate::config::Settings;
use crate::execution::{ExecutionOutcome, SqlExecutor, MAX_RESULT_ROWS};
use crate::query_analyzer::{analyze, QueryAnalysis};
use crate::schema_store::{CacheStats, DatabaseSummary, SchemaStore};
use crate::sql_generator::{GeneratedSql, SqlGenerator};
use crate::validation::{SqlValidator, ValidationReport};
use crate::view_selector::{ViewSelection, ViewSelector, MAX_SELECTED_VIEWS};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const ANALYZER_CONTEXT_KB: usize = 1;
const SELECTOR_CONTEXT_KB: usize = 1;
const VALIDATOR_CONTEXT_KB: usize = 5;
const GENERATOR_CONTEXT_KB_PER_VIEW: usize = 3;

/// Estimated context handed to each stage, for observability only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextUsage {
    pub query_analyzer_kb: usize,
    pub view_selector_kb: usize,
    pub sql_generator_kb: usize,
    pub validator_kb: usize,
    pub total_estimated_kb: usize,
    pub views_used: usize,
    /// Actual size of the rendered prompt
    pub prompt_bytes: usize,
}

impl ContextUsage {
    fn estimate(selection: &ViewSelection, generated: &GeneratedSql) -> Self {
        let sql_generator_kb = selection.estimated_context_kb;
        Self {
            query_analyzer_kb: ANALYZER_CONTEXT_KB,
            view_selector_kb: SELECTOR_CONTEXT_KB,
            sql_generator_kb,
            validator_kb: VALIDATOR_CONTEXT_KB,
            total_estimated_kb: ANALYZER_CONTEXT_KB
                + SELECTOR_CONTEXT_KB
                + sql_generator_kb
                + VALIDATOR_CONTEXT_KB,
            views_used: selection.views.len(),
            prompt_bytes: generated.prompt_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResponse {
    pub query_id: String,
    pub success: bool,
    pub user_query: String,
    pub query_analysis: QueryAnalysis,
    pub view_selection: ViewSelection,
    pub generated_sql: GeneratedSql,
    pub validation_report: ValidationReport,
    pub final_sql: String,
    pub is_valid: bool,
    pub context_usage: ContextUsage,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutedResponse {
    #[serde(flatten)]
    pub response: PipelineResponse,
    pub execution: ExecutionOutcome,
}

/// Per-stage context budget reported by `system_status`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBudget {
    pub query_analyzer_kb: usize,
    pub view_selector_kb: usize,
    pub sql_generator_kb: usize,
    pub validator_kb: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub status: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    pub total_views: usize,
    pub cache: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_summary: Option<DatabaseSummary>,
    pub context_budget: ContextBudget,
}

pub struct QueryPipeline {
    store: Arc<SchemaStore>,
    selector: ViewSelector,
    generator: SqlGenerator,
    validator: SqlValidator,
    executor: Option<Arc<dyn SqlExecutor>>,
}

impl QueryPipeline {
    pub fn new(store: Arc<SchemaStore>, generator: SqlGenerator, settings: &Settings) -> Self {
        let selector = ViewSelector::new(store.clone()).with_default_view(settings.default_view.clone());
        let validator = SqlValidator::new(store.clone()).with_schema_prefix(settings.schema_prefix.clone());
        let generator = generator.with_schema_prefix(settings.schema_prefix.clone());
        Self {
            store,
            selector,
            generator,
            validator,
            executor: None,
        }
    }

    /// Pipeline with the default view and schema prefix.
    pub fn with_defaults(store: Arc<SchemaStore>, generator: SqlGenerator) -> Self {
        Self::new(store, generator, &Settings::default())
    }

    pub fn with_executor(mut self, executor: Arc<dyn SqlExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn store(&self) -> &Arc<SchemaStore> {
        &self.store
    }

    /// Run the four stages. Never fails; problems are reported in the response.
    pub async fn process_query(&self, user_query: &str) -> PipelineResponse {
        let query_id = Uuid::new_v4().to_string();
        info!("[{}] Processing query: {}", query_id, user_query);

        let query_analysis = analyze(user_query);
        let view_selection = self.selector.select_ranked(&query_analysis);
        let selected = view_selection.view_names();

        let generated_sql = self
            .generator
            .generate(user_query, &selected, &query_analysis)
            .await;
        let validation_report = self
            .validator
            .validate(&generated_sql.sql, &selected, &query_analysis);

        let is_valid = validation_report.is_valid;
        let success = generated_sql.success && is_valid;
        let context_usage = ContextUsage::estimate(&view_selection, &generated_sql);
        let recommendations = recommend(&validation_report, &generated_sql);

        if success {
            info!("[{}] Query processed: {}", query_id, generated_sql.sql);
        } else {
            warn!(
                "[{}] Query not usable: generated={} valid={}",
                query_id, generated_sql.success, is_valid
            );
        }

        PipelineResponse {
            query_id,
            success,
            user_query: user_query.to_string(),
            final_sql: generated_sql.sql.clone(),
            query_analysis,
            view_selection,
            generated_sql,
            validation_report,
            is_valid,
            context_usage,
            recommendations,
        }
    }

    /// Process the question and, when the SQL is usable and an executor is
    /// configured, run it with the row cap.
    pub async fn execute_query(&self, user_query: &str) -> ExecutedResponse {
        let response = self.process_query(user_query).await;

        let execution = match (&self.executor, response.success) {
            (_, false) => ExecutionOutcome::skipped("Query is not valid for execution"),
            (None, true) => ExecutionOutcome::skipped("No database connection configured"),
            (Some(executor), true) => {
                match executor.execute(&response.final_sql, MAX_RESULT_ROWS).await {
                    Ok(rows) => {
                        info!(
                            "[{}] {} returned {} rows",
                            response.query_id,
                            executor.name(),
                            rows.rows.len()
                        );
                        ExecutionOutcome::completed(rows)
                    }
                    Err(e) => {
                        warn!("[{}] Execution failed: {}", response.query_id, e);
                        ExecutionOutcome::skipped(e.to_string())
                    }
                }
            }
        };

        ExecutedResponse {
            response,
            execution,
        }
    }

    pub fn system_status(&self) -> SystemStatus {
        let cache = self.store.cache_stats();
        SystemStatus {
            status: "operational".to_string(),
            backend: self.generator.backend_name().to_string(),
            executor: self.executor.as_ref().map(|e| e.name().to_string()),
            total_views: cache.total_views,
            cache,
            database_summary: self.store.database_summary().cloned(),
            context_budget: ContextBudget {
                query_analyzer_kb: ANALYZER_CONTEXT_KB,
                view_selector_kb: SELECTOR_CONTEXT_KB,
                sql_generator_kb: MAX_SELECTED_VIEWS * GENERATOR_CONTEXT_KB_PER_VIEW,
                validator_kb: VALIDATOR_CONTEXT_KB,
            },
        }
    }
}

fn recommend(report: &ValidationReport, generated: &GeneratedSql) -> Vec<String> {
    let mut recommendations = Vec::new();
    if !report.warnings.is_empty() {
        recommendations.push("Consider addressing validation warnings for better query quality".to_string());
    }
    if !report.security_issues.is_empty() {
        recommendations.push("Review security issues before executing query".to_string());
    }
    if !report.performance_notes.is_empty() {
        recommendations.push("Consider performance optimizations for large datasets".to_string());
    }
    if !generated.success {
        recommendations
            .push("SQL generation failed - check view availability and query complexity".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("Query looks good! Ready for execution.".to_string());
    }
    recommendations
}
