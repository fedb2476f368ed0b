//! Deterministic backend
//!
//! Builds a plausible SQL Server query straight from the structured context.
//! Used when no model is configured, as the rate-limit substitute, and in tests.

use super::{GenerationContext, Prompt, TextBackend};
use crate::error::{DuiError, Result};
use crate::query_analyzer::{Intent, SortOrder, TimeFilter};
use crate::schema_store::{ColumnKind, ViewSchema};
use async_trait::async_trait;

const ALIAS: &str = "t";
const MAX_SELECT_COLUMNS: usize = 6;

#[derive(Debug, Default, Clone)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }

    pub fn build_sql(context: &GenerationContext) -> Result<String> {
        let view = pick_view(context)
            .ok_or_else(|| DuiError::Generation("No view schema available".to_string()))?;
        let requirements = &context.requirements;

        let date_column = first_of_kind(view, ColumnKind::Temporal);
        let measure_column = measure_for(view, &query_words(&context.user_query));
        let counting = context.intent == Intent::Count;

        let mut sql = String::from("SELECT ");
        if counting {
            sql.push_str("COUNT(*) AS total_count");
        } else {
            if let Some(limit) = requirements.limit {
                sql.push_str(&format!("TOP {} ", limit));
            }
            sql.push_str(&select_list(context, view).join(", "));
        }
        sql.push_str(&format!(
            " FROM {}.{} {}",
            context.schema_prefix, view.name, ALIAS
        ));

        let mut conditions = Vec::new();
        if let (Some(filter), Some(column)) = (requirements.time_filter, date_column) {
            conditions.push(time_condition(filter, column));
        }
        if let (Some(filter), Some(column)) = (requirements.value_filter, measure_column) {
            conditions.push(format!(
                "{}.{} {} {}",
                ALIAS,
                column,
                filter.kind.operator(),
                filter.value
            ));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !counting {
            if let Some(order) = requirements.sort_order {
                let sort_column = if requirements.value_filter.is_some() {
                    measure_column.or(date_column)
                } else {
                    date_column.or(measure_column)
                };
                if let Some(column) = sort_column {
                    let direction = match order {
                        SortOrder::Asc => "ASC",
                        SortOrder::Desc => "DESC",
                    };
                    sql.push_str(&format!(" ORDER BY {}.{} {}", ALIAS, column, direction));
                }
            }
        }

        Ok(sql)
    }
}

#[async_trait]
impl TextBackend for StubBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<String> {
        let context = &prompt.context;
        let sql = Self::build_sql(context)?;
        let view_used = pick_view(context).map(|v| v.name.clone()).unwrap_or_default();

        let response = serde_json::json!({
            "sql_query": sql,
            "explanation": format!(
                "Deterministic {} query over {}",
                context.intent.as_str(),
                view_used
            ),
            "view_used": view_used,
            "security_note": "Generated without a language model; reads only from schema-qualified views"
        });
        Ok(response.to_string())
    }
}

fn query_words(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_string)
        .collect()
}

/// First selected view that can satisfy the time and value filters, preferring
/// one whose measure column is named in the question; else the first view.
fn pick_view(context: &GenerationContext) -> Option<&ViewSchema> {
    let requirements = &context.requirements;
    let words = query_words(&context.user_query);
    let has_time = |view: &ViewSchema| {
        requirements.time_filter.is_none() || first_of_kind(view, ColumnKind::Temporal).is_some()
    };
    let has_measure = |view: &ViewSchema| {
        requirements.value_filter.is_none() || first_of_kind(view, ColumnKind::Measure).is_some()
    };
    let names_measure = |view: &ViewSchema| {
        requirements.value_filter.is_none() || named_measure(view, &words).is_some()
    };

    let views = &context.view_schemas;
    views
        .iter()
        .find(|v| has_time(*v) && names_measure(*v))
        .or_else(|| views.iter().find(|v| has_time(*v) && has_measure(*v)))
        .or_else(|| views.first())
}

fn first_of_kind(view: &ViewSchema, kind: ColumnKind) -> Option<&str> {
    view.columns
        .iter()
        .find(|c| c.kind == kind)
        .map(|c| c.name.as_str())
}

fn named_measure<'a>(view: &'a ViewSchema, words: &[String]) -> Option<&'a str> {
    view.columns
        .iter()
        .filter(|c| c.kind == ColumnKind::Measure)
        .map(|c| c.name.as_str())
        .find(|name| {
            let lowered = name.to_lowercase();
            words.iter().any(|w| lowered.contains(w.as_str()))
        })
}

fn measure_for<'a>(view: &'a ViewSchema, words: &[String]) -> Option<&'a str> {
    named_measure(view, words).or_else(|| first_of_kind(view, ColumnKind::Measure))
}

fn select_list(context: &GenerationContext, view: &ViewSchema) -> Vec<String> {
    let relevant = context
        .schema_summary
        .iter()
        .find(|s| s.view == view.name)
        .map(|s| s.relevant_columns.as_slice())
        .unwrap_or(&[]);

    let preferred = |kind: ColumnKind| {
        matches!(
            kind,
            ColumnKind::Identifier | ColumnKind::Name | ColumnKind::Temporal | ColumnKind::Measure
        )
    };

    let mut columns: Vec<&str> = relevant
        .iter()
        .filter(|c| preferred(c.kind))
        .map(|c| c.name.as_str())
        .collect();
    if columns.is_empty() {
        columns = view.columns.iter().map(|c| c.name.as_str()).collect();
    }
    columns.truncate(MAX_SELECT_COLUMNS);

    if columns.is_empty() {
        return vec!["COUNT(*) AS total_records".to_string()];
    }
    columns
        .into_iter()
        .map(|c| format!("{}.{}", ALIAS, c))
        .collect()
}

fn time_condition(filter: TimeFilter, column: &str) -> String {
    let column = format!("{}.{}", ALIAS, column);
    match filter {
        TimeFilter::Today => format!("CAST({} AS DATE) = CAST(GETDATE() AS DATE)", column),
        TimeFilter::Yesterday => format!(
            "CAST({} AS DATE) = CAST(DATEADD(day, -1, GETDATE()) AS DATE)",
            column
        ),
        TimeFilter::LastWeek => format!("{} >= DATEADD(day, -7, GETDATE())", column),
        TimeFilter::LastMonth => format!("{} >= DATEADD(month, -1, GETDATE())", column),
        TimeFilter::Last30Days => format!("{} >= DATEADD(day, -30, GETDATE())", column),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{SqlRules, ViewSummary};
    use crate::query_analyzer::{QueryType, Requirements, ValueFilter, ValueFilterKind};
    use chrono::NaiveDate;

    fn context(intent: Intent, requirements: Requirements) -> GenerationContext {
        let view = ViewSchema::new(
            "v_specimenreport_with_caseheaders",
            "Specimen reports with case headers",
            &["CaseId", "DefendantName", "TestDate", "BacResult", "Notes"],
        );
        GenerationContext {
            user_query: "defendants with bac results".to_string(),
            intent,
            query_type: QueryType::General,
            requirements,
            selected_views: vec![view.name.clone()],
            schema_summary: vec![ViewSummary {
                view: view.name.clone(),
                description: view.description.clone(),
                relevant_columns: view.columns.clone(),
                total_columns: view.columns.len(),
            }],
            rules: SqlRules::default(),
            view_schemas: vec![view],
            schema_prefix: "DUI".to_string(),
            today: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }
    }

    #[test]
    fn test_listing_query() {
        let sql = StubBackend::build_sql(&context(Intent::List, Requirements::default())).unwrap();
        assert_eq!(
            sql,
            "SELECT t.CaseId, t.DefendantName, t.TestDate, t.BacResult FROM DUI.v_specimenreport_with_caseheaders t"
        );
    }

    #[test]
    fn test_count_with_value_filter() {
        let requirements = Requirements {
            value_filter: Some(ValueFilter {
                kind: ValueFilterKind::Above,
                value: 0.08,
            }),
            ..Requirements::default()
        };
        let sql = StubBackend::build_sql(&context(Intent::Count, requirements)).unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS total_count FROM DUI.v_specimenreport_with_caseheaders t WHERE t.BacResult > 0.08"
        );
    }

    #[test]
    fn test_value_filter_prefers_named_measure() {
        let mut ctx = context(
            Intent::Count,
            Requirements {
                value_filter: Some(ValueFilter {
                    kind: ValueFilterKind::Above,
                    value: 0.08,
                }),
                ..Requirements::default()
            },
        );
        ctx.user_query = "count defendants with bac above 0.08".to_string();
        ctx.view_schemas.insert(
            0,
            ViewSchema::new(
                "v_defendants_with_caseheaders",
                "Defendants with case headers",
                &["DefendantId", "CaseNumber", "DefendantName"],
            ),
        );
        let sql = StubBackend::build_sql(&ctx).unwrap();
        assert!(sql.contains("FROM DUI.v_specimenreport_with_caseheaders t WHERE t.BacResult > 0.08"));
    }

    #[test]
    fn test_time_filter_sort_and_limit() {
        let requirements = Requirements {
            time_filter: Some(TimeFilter::Last30Days),
            sort_order: Some(SortOrder::Desc),
            limit: Some(5),
            ..Requirements::default()
        };
        let sql = StubBackend::build_sql(&context(Intent::List, requirements)).unwrap();
        assert!(sql.starts_with("SELECT TOP 5 t.CaseId"));
        assert!(sql.contains("WHERE t.TestDate >= DATEADD(day, -30, GETDATE())"));
        assert!(sql.ends_with("ORDER BY t.TestDate DESC"));
    }

    #[tokio::test]
    async fn test_invoke_returns_structured_json() {
        let ctx = context(Intent::List, Requirements::default());
        let prompt = Prompt {
            system: String::new(),
            user: ctx.user_query.clone(),
            context: ctx,
        };
        let raw = StubBackend::new().invoke(&prompt).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["sql_query"].as_str().unwrap().contains("DUI.v_specimenreport"));
        assert_eq!(value["view_used"], "v_specimenreport_with_caseheaders");
    }

    #[test]
    fn test_no_views_is_an_error() {
        let mut ctx = context(Intent::List, Requirements::default());
        ctx.view_schemas.clear();
        assert!(StubBackend::build_sql(&ctx).is_err());
    }
}
