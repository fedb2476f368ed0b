//! Prompt assembly
//!
//! Only the selected views' schemas go into the prompt, and the schema summary
//! keeps just the columns that look relevant to the question.

use crate::llm::{GenerationContext, Prompt, SqlRules, ViewSummary};
use crate::query_analyzer::{Intent, QueryAnalysis, QueryType, Requirements};
use crate::schema_store::{ColumnDescriptor, ViewSchema};
use chrono::NaiveDate;
use itertools::Itertools;
use std::sync::Arc;

const COMMON_COLUMN_MARKERS: &[&str] = &["id", "name", "date", "time", "case", "defendant"];
const KEY_COLUMN_MARKERS: &[&str] = &["id", "name", "date"];
const FILTER_COLUMN_MARKERS: &[&str] = &["status", "type", "result"];

pub fn relevant_columns(schema: &ViewSchema, analysis: &QueryAnalysis) -> Vec<ColumnDescriptor> {
    let keywords: Vec<String> = analysis.keywords.iter().map(|k| k.to_lowercase()).collect();

    let relevant: Vec<ColumnDescriptor> = schema
        .columns
        .iter()
        .filter(|column| {
            let name = column.name.to_lowercase();
            let description = column.description.to_lowercase();

            let keyword_hit = keywords
                .iter()
                .any(|k| name.contains(k.as_str()) || description.contains(k.as_str()));
            let common = COMMON_COLUMN_MARKERS.iter().any(|m| name.contains(m));
            let intent_hit = match analysis.intent {
                Intent::Count => name.contains("count"),
                Intent::Filter => FILTER_COLUMN_MARKERS.iter().any(|m| name.contains(m)),
                _ => false,
            };

            keyword_hit || common || intent_hit
        })
        .cloned()
        .collect();

    if !relevant.is_empty() {
        return relevant;
    }

    schema
        .columns
        .iter()
        .filter(|column| {
            let name = column.name.to_lowercase();
            KEY_COLUMN_MARKERS.iter().any(|m| name.contains(m))
        })
        .cloned()
        .collect()
}

pub fn build_rules(
    intent: Intent,
    query_type: QueryType,
    requirements: &Requirements,
    schema_prefix: &str,
) -> SqlRules {
    let owned = |rules: &[&str]| rules.iter().map(|r| r.to_string()).collect::<Vec<_>>();

    let base_rules = vec![
        format!("Always use {} schema prefix: {}.view_name", schema_prefix, schema_prefix),
        "Use proper table aliases for readability".to_string(),
        "Include appropriate WHERE clauses".to_string(),
        "Use proper JOIN syntax with correct column names".to_string(),
        "Avoid using DISTINCT on text columns".to_string(),
        "Use exact column names from schema".to_string(),
    ];

    let intent_rules = match intent {
        Intent::Count => owned(&[
            "Use COUNT(*) for counting records",
            "Consider using GROUP BY if needed",
            "Use appropriate aggregation functions",
        ]),
        Intent::Filter => owned(&[
            "Use specific WHERE conditions",
            "Consider using multiple conditions with AND/OR",
            "Use appropriate comparison operators",
        ]),
        Intent::Compare => owned(&[
            "Use UNION or multiple SELECT statements",
            "Include comparison columns",
            "Use appropriate sorting",
        ]),
        _ => Vec::new(),
    };

    let type_rules = match query_type {
        QueryType::Aggregation => owned(&[
            "Use GROUP BY for aggregations",
            "Include appropriate aggregation functions",
            "Consider HAVING clause for aggregated filters",
        ]),
        QueryType::Filtered => owned(&[
            "Use specific WHERE conditions",
            "Consider using subqueries if needed",
            "Use appropriate comparison operators",
        ]),
        _ => Vec::new(),
    };

    let mut requirement_rules = Vec::new();
    if let Some(filter) = requirements.time_filter {
        requirement_rules.push(format!("Add time filter: {}", filter.as_str()));
    }
    if let Some(filter) = requirements.value_filter {
        requirement_rules.push(format!(
            "Add value filter: {} {}",
            filter.kind.as_str(),
            filter.value
        ));
    }
    if let Some(order) = requirements.sort_order {
        requirement_rules.push(format!("Add sorting: ORDER BY ... {}", order.as_str()));
    }
    if let Some(limit) = requirements.limit {
        requirement_rules.push(format!("Add limit: TOP {}", limit));
    }

    SqlRules {
        base_rules,
        intent_rules,
        type_rules,
        requirement_rules,
    }
}

pub fn build_context(
    query: &str,
    schemas: &[(String, Arc<ViewSchema>)],
    analysis: &QueryAnalysis,
    schema_prefix: &str,
    today: NaiveDate,
) -> GenerationContext {
    let schema_summary = schemas
        .iter()
        .map(|(name, schema)| ViewSummary {
            view: name.clone(),
            description: schema.description.clone(),
            relevant_columns: relevant_columns(schema, analysis),
            total_columns: schema.columns.len(),
        })
        .collect();

    GenerationContext {
        user_query: query.to_string(),
        intent: analysis.intent,
        query_type: analysis.query_type,
        requirements: analysis.requirements.clone(),
        selected_views: schemas.iter().map(|(name, _)| name.clone()).collect(),
        schema_summary,
        rules: build_rules(
            analysis.intent,
            analysis.query_type,
            &analysis.requirements,
            schema_prefix,
        ),
        view_schemas: schemas.iter().map(|(_, schema)| (**schema).clone()).collect(),
        schema_prefix: schema_prefix.to_string(),
        today,
    }
}

pub fn build_prompt(context: GenerationContext) -> Prompt {
    Prompt {
        system: render_system(&context),
        user: context.user_query.clone(),
        context,
    }
}

fn render_requirements(requirements: &Requirements) -> String {
    if requirements.is_empty() {
        return "none".to_string();
    }
    let mut parts = Vec::new();
    if let Some(filter) = requirements.time_filter {
        parts.push(format!("time_filter={}", filter.as_str()));
    }
    if let Some(filter) = requirements.value_filter {
        parts.push(format!("value_filter={} {}", filter.kind.as_str(), filter.value));
    }
    if let Some(order) = requirements.sort_order {
        parts.push(format!("sort_order={}", order.as_str()));
    }
    if let Some(limit) = requirements.limit {
        parts.push(format!("limit={}", limit));
    }
    parts.join(", ")
}

fn render_column(column: &ColumnDescriptor) -> String {
    if column.description.is_empty() {
        column.name.clone()
    } else {
        format!("{} ({})", column.name, column.description)
    }
}

fn render_system(context: &GenerationContext) -> String {
    let prefix = &context.schema_prefix;

    let summaries = context
        .schema_summary
        .iter()
        .map(|summary| {
            format!(
                "- {}.{} ({} columns): {}\n  relevant columns: {}",
                prefix,
                summary.view,
                summary.total_columns,
                summary.description,
                summary.relevant_columns.iter().map(render_column).join(", ")
            )
        })
        .join("\n");
    let rules = context.rules.all().map(|rule| format!("- {}", rule)).join("\n");
    let schemas = context
        .view_schemas
        .iter()
        .map(|schema| format!("- {}.{}: {}", prefix, schema.name, schema.column_names().join(", ")))
        .join("\n");

    format!(
        r#"You are a DUI database expert. Generate precise SQL Server queries using the provided view schemas.

Query Information:
- User Query: {query}
- Intent: {intent}
- Query Type: {query_type}
- Requirements: {requirements}
- Today's date: {today}

Selected Views: {selected}

Schema Summary:
{summaries}

SQL Generation Rules:
{rules}

Full View Schemas:
{schemas}

CRITICAL INSTRUCTIONS:
1. ALWAYS use {prefix} schema prefix: {prefix}.view_name
2. ONLY use views from the selected views list
3. Use exact column names from the schema
4. Ensure proper JOIN conditions
5. Include appropriate WHERE clauses based on requirements
6. Use proper SQL Server syntax
7. Consider security - avoid accessing sensitive data directly
8. Provide clear explanations for your choices

Return ONLY a JSON object with:
- sql_query: The generated SQL query (must use {prefix} schema prefix)
- explanation: Why you chose this approach
- view_used: Which view(s) you used
- security_note: Any security considerations
"#,
        query = context.user_query,
        intent = context.intent.as_str(),
        query_type = context.query_type.as_str(),
        requirements = render_requirements(&context.requirements),
        today = context.today.format("%Y-%m-%d"),
        selected = context.selected_views.join(", "),
        summaries = summaries,
        rules = rules,
        schemas = schemas,
        prefix = prefix,
    )
}
