//! SQL Validator
//!
//! Static, read-only checks over generated SQL. Every check is independent and
//! only appends findings; a query is valid exactly when no check reported an
//! error. Schema and column mismatches are warnings because backend output is
//! often slightly imprecise about names.

pub mod report;
pub mod rules;

use crate::config::DEFAULT_SCHEMA_PREFIX;
use crate::query_analyzer::{Intent, QueryAnalysis};
use crate::schema_store::SchemaStore;
use crate::sql_text::{inside_function_call, mask};
use regex::Regex;
use sqlparser::dialect::MsSqlDialect;
use sqlparser::parser::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub use report::ValidationReport;
use rules::*;

pub struct SqlValidator {
    store: Arc<SchemaStore>,
    schema_prefix: String,
}

impl SqlValidator {
    pub fn new(store: Arc<SchemaStore>) -> Self {
        Self {
            store,
            schema_prefix: DEFAULT_SCHEMA_PREFIX.to_string(),
        }
    }

    pub fn with_schema_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.schema_prefix = prefix.into();
        self
    }

    pub fn validate(
        &self,
        sql: &str,
        selected_views: &[String],
        analysis: &QueryAnalysis,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        if sql.trim().is_empty() {
            report.errors.push("No SQL query to validate".to_string());
            return report.finalize();
        }

        // Keyword and table scans never look inside literals or comments
        let masked = mask(sql);
        self.check_syntax(sql, &masked, &mut report);
        check_security(sql, &mut report);
        self.check_schema(&masked, selected_views, &mut report);
        check_performance(&masked, &mut report);
        check_intent_alignment(sql, analysis, &mut report);

        let report = report.finalize();
        info!(
            "SQL validation completed: valid={} ({} errors, {} warnings)",
            report.is_valid,
            report.errors.len(),
            report.warnings.len()
        );
        report
    }

    fn check_syntax(&self, sql: &str, masked: &str, report: &mut ValidationReport) {
        if !STARTS_WITH_SELECT.is_match(masked) {
            report.errors.push("Query must start with SELECT".to_string());
        }
        if !FROM_CLAUSE.is_match(masked) {
            report.errors.push("Missing FROM clause".to_string());
        }

        for caps in TABLE_REFERENCE.captures_iter(masked) {
            if caps
                .get(0)
                .map_or(false, |m| inside_function_call(masked, m.start()))
            {
                continue;
            }
            let clause = caps[1].to_uppercase();
            let target = &caps[2];
            match target.split_once('.') {
                None => report.errors.push(format!(
                    "Missing {} schema prefix in {} clause: {}",
                    self.schema_prefix, clause, target
                )),
                Some((schema, _)) => {
                    let schema = schema.trim_matches(|c| c == '[' || c == ']');
                    if !schema.eq_ignore_ascii_case(&self.schema_prefix) {
                        report.errors.push(format!(
                            "{} clause references '{}' outside the {} schema",
                            clause, target, self.schema_prefix
                        ));
                    }
                }
            }
        }

        for label in destructive_labels(masked) {
            report
                .errors
                .push(format!("Dangerous SQL operation detected: {}", label));
        }

        if sql.matches('(').count() != sql.matches(')').count() {
            report.warnings.push("Mismatched parentheses detected".to_string());
        }
        if sql.matches('\'').count() % 2 != 0 {
            report.warnings.push("Unmatched quotes detected".to_string());
        }

        if let Err(e) = Parser::parse_sql(&MsSqlDialect {}, sql) {
            debug!("sqlparser rejected query: {}", e);
            report
                .warnings
                .push(format!("SQL parser could not fully parse the query: {}", e));
        }
    }

    fn check_schema(&self, sql: &str, selected_views: &[String], report: &mut ValidationReport) {
        let aliases = self.referenced_views(sql);

        for (view, _) in &aliases {
            if !is_selected(view, selected_views) {
                report
                    .warnings
                    .push(format!("Referenced view '{}' not in selected views", view));
            }
        }

        for (view, alias) in &aliases {
            let schema = match self.store.get_view_schema(view) {
                Some(schema) => schema,
                None => continue,
            };
            let column_ref = match Regex::new(&format!(
                r"(?i)(?:^|[^A-Za-z0-9_.])({})\.([A-Za-z_][A-Za-z0-9_]*)",
                regex::escape(alias)
            )) {
                Ok(re) => re,
                Err(_) => continue,
            };

            let mut reported = Vec::new();
            for caps in column_ref.captures_iter(sql) {
                let column = &caps[2];
                let lowered = column.to_lowercase();
                if schema.has_column(column)
                    || EXEMPT_COLUMN_MARKERS.iter().any(|m| lowered.contains(m))
                    || reported.contains(&lowered)
                {
                    continue;
                }
                report.warnings.push(format!(
                    "Column '{}' not found in view '{}'",
                    column, view
                ));
                reported.push(lowered);
            }
        }
    }

    /// Views referenced as `<prefix>.<view>` after FROM/JOIN, mapped to the
    /// alias the query uses for them (the view name when unaliased).
    fn referenced_views(&self, sql: &str) -> Vec<(String, String)> {
        let pattern = format!(
            r"(?i)\b(?:FROM|JOIN)\s+\[?{}\]?\.\[?([A-Za-z_][A-Za-z0-9_]*)\]?(?:\s+(?:AS\s+)?([A-Za-z_][A-Za-z0-9_]*))?",
            regex::escape(&self.schema_prefix)
        );
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(_) => return Vec::new(),
        };

        let mut views: HashMap<String, String> = HashMap::new();
        let mut order = Vec::new();
        for caps in re.captures_iter(sql) {
            let view = caps[1].to_string();
            let alias = caps
                .get(2)
                .map(|m| m.as_str())
                .filter(|a| !NON_ALIAS_WORDS.contains(&a.to_lowercase().as_str()))
                .unwrap_or(view.as_str())
                .to_string();
            if !views.contains_key(&view) {
                order.push(view.clone());
                views.insert(view, alias);
            }
        }

        order
            .into_iter()
            .filter_map(|view| views.remove(&view).map(|alias| (view, alias)))
            .collect()
    }
}

fn is_selected(view: &str, selected_views: &[String]) -> bool {
    let view = view.to_lowercase();
    selected_views.iter().any(|selected| {
        let selected = selected.to_lowercase();
        selected == view
            || selected.contains(&view)
            || view.contains(&selected)
            || strsim::jaro_winkler(&selected, &view) >= VIEW_NAME_SIMILARITY
    })
}

fn check_security(sql: &str, report: &mut ValidationReport) {
    for rule in INJECTION_RULES.iter() {
        if rule.pattern.is_match(sql) {
            report.security_issues.push(format!(
                "Potential SQL injection pattern detected: {}",
                rule.label
            ));
        }
    }
    if STRING_COMPARISON
        .captures_iter(sql)
        .any(|caps| caps[1] == caps[2])
    {
        report.security_issues.push(
            "Potential SQL injection pattern detected: tautological string comparison".to_string(),
        );
    }

    if SELECT_STAR.is_match(sql) {
        report
            .security_issues
            .push("Using SELECT * - consider selecting specific columns for security".to_string());
    }

    for rule in SENSITIVE_COLUMN_RULES.iter() {
        if rule.pattern.is_match(sql) {
            report.security_issues.push(format!(
                "Accessing potentially sensitive column: {}",
                rule.label
            ));
        }
    }
}

fn check_performance(sql: &str, report: &mut ValidationReport) {
    let notes = &mut report.performance_notes;
    if SELECT_STAR.is_match(sql) {
        notes.push("SELECT * may impact performance - consider specific columns".to_string());
    }
    if DISTINCT.is_match(sql) {
        notes.push("DISTINCT operation may be expensive on large datasets".to_string());
    }
    if ORDER_BY.is_match(sql) && !ROW_LIMIT.is_match(sql) {
        notes.push("ORDER BY without TOP may return large result sets".to_string());
    }
    let joins = JOIN_CLAUSE.find_iter(sql).count();
    if joins > 0 && !WHERE_CLAUSE.is_match(sql) {
        notes.push("Consider adding WHERE clause to limit results".to_string());
    }
    if joins > 2 {
        notes.push("Multiple JOINs detected - ensure proper join conditions".to_string());
    }
}

fn check_intent_alignment(sql: &str, analysis: &QueryAnalysis, report: &mut ValidationReport) {
    let suggestions = &mut report.suggestions;
    let requirements = &analysis.requirements;

    if analysis.intent == Intent::Count && !COUNT_CALL.is_match(sql) {
        suggestions.push("Query intent is 'count' but no COUNT function found".to_string());
    }
    if analysis.intent == Intent::Filter && !WHERE_CLAUSE.is_match(sql) {
        suggestions.push("Query intent is 'filter' but no WHERE clause found".to_string());
    }
    if requirements.time_filter.is_some() && !DATE_CONSTRUCT.is_match(sql) {
        suggestions.push("Time filter requirement not implemented in query".to_string());
    }
    if requirements.sort_order.is_some() && !ORDER_BY.is_match(sql) {
        suggestions.push("Sort order requirement not implemented in query".to_string());
    }
    if requirements.limit.is_some() && !ROW_LIMIT.is_match(sql) {
        suggestions.push("Limit requirement not implemented in query".to_string());
    }
    if requirements.value_filter.is_some() && !COMPARISON.is_match(sql) {
        suggestions.push("Value filter requirement not implemented in query".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_analyzer::analyze;
    use crate::schema_store::ViewSchema;

    fn validator() -> SqlValidator {
        SqlValidator::new(Arc::new(SchemaStore::from_views(vec![
            ViewSchema::new(
                "v_caseheaders",
                "Secure access to CaseHeaders data",
                &["CaseId", "CaseNumber", "TimeOfOff", "Narrative"],
            ),
            ViewSchema::new(
                "v_specimenreport_with_caseheaders",
                "Specimen reports",
                &["CaseId", "BacResult", "TestDate"],
            ),
        ])))
    }

    fn selected() -> Vec<String> {
        vec!["v_caseheaders".to_string()]
    }

    #[test]
    fn test_empty_sql() {
        let report = validator().validate("   ", &selected(), &analyze("list cases"));
        assert!(!report.is_valid);
        assert_eq!(report.errors, vec!["No SQL query to validate"]);
    }

    #[test]
    fn test_clean_query_is_valid() {
        let report = validator().validate(
            "SELECT t.CaseId, t.Narrative FROM DUI.v_caseheaders t",
            &selected(),
            &analyze("list cases"),
        );
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert!(report.is_valid);
        assert_eq!(report.summary, "Query is valid and ready for execution");
    }

    #[test]
    fn test_delete_is_invalid() {
        let report = validator().validate(
            "DELETE FROM DUI.v_caseheaders",
            &selected(),
            &analyze("remove cases"),
        );
        assert!(!report.is_valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.starts_with("Dangerous SQL operation detected")));
    }

    #[test]
    fn test_destructive_keyword_wins_over_valid_shape() {
        let report = validator().validate(
            "SELECT t.CaseId FROM DUI.v_caseheaders t; DROP TABLE DUI.v_caseheaders",
            &selected(),
            &analyze("list cases"),
        );
        assert!(!report.is_valid);
        assert!(report
            .security_issues
            .iter()
            .any(|s| s.contains("stacked statements")));
    }

    #[test]
    fn test_every_destructive_keyword_is_invalid() {
        let cases = [
            ("SELECT t.CaseId FROM DUI.v_caseheaders t; ALTER ROLE db_owner ADD MEMBER mallory", "ALTER"),
            ("SELECT t.CaseId FROM DUI.v_caseheaders t; DROP SEQUENCE DUI.case_seq", "DROP"),
            ("SELECT t.CaseId FROM DUI.v_caseheaders t; CREATE ROLE mallory", "CREATE"),
            ("SELECT t.CaseId FROM DUI.v_caseheaders t; DROP/**/TABLE DUI.v_caseheaders", "DROP"),
            ("SELECT t.CaseId FROM DUI.v_caseheaders t; TRUNCATE TABLE DUI.v_caseheaders", "TRUNCATE"),
            ("SELECT t.CaseId FROM DUI.v_caseheaders t; DELETE DUI.v_caseheaders", "DELETE"),
            ("SELECT t.CaseId FROM DUI.v_caseheaders t; INSERT DUI.v_caseheaders VALUES (1)", "INSERT"),
            ("SELECT t.CaseId FROM DUI.v_caseheaders t; UPDATE DUI.v_caseheaders SET CaseId = 0", "UPDATE"),
            ("SELECT t.CaseId FROM DUI.v_caseheaders t; MERGE DUI.v_caseheaders USING x ON 1 = 1", "MERGE"),
            ("SELECT t.CaseId FROM DUI.v_caseheaders t;EXECUTE/**/sp_configure", "EXEC"),
            ("SELECT t.CaseId FROM DUI.v_caseheaders t; GRANT CONTROL TO mallory", "GRANT"),
        ];
        for (sql, label) in cases {
            let report = validator().validate(sql, &selected(), &analyze("list cases"));
            assert!(!report.is_valid, "{}", sql);
            assert!(
                report
                    .errors
                    .contains(&format!("Dangerous SQL operation detected: {}", label)),
                "{} -> {:?}",
                sql,
                report.errors
            );
        }
    }

    #[test]
    fn test_literals_and_function_from_are_not_table_references() {
        for sql in [
            "SELECT t.CaseId FROM DUI.v_caseheaders t WHERE t.Narrative = 'released from custody'",
            "SELECT TRIM(' ' FROM t.Narrative) FROM DUI.v_caseheaders t",
            "SELECT EXTRACT(YEAR FROM t.TimeOfOff) FROM DUI.v_caseheaders t",
            "SELECT t.CaseId FROM DUI.v_caseheaders t WHERE t.Narrative LIKE '%left join of the ramp; drop it%'",
            "SELECT t.CaseId FROM DUI.v_caseheaders t WHERE t.Narrative = 'it''s from dbo'",
        ] {
            let report = validator().validate(sql, &selected(), &analyze("list cases"));
            assert!(report.errors.is_empty(), "{} -> {:?}", sql, report.errors);
            assert!(report.is_valid);
        }
    }

    #[test]
    fn test_subquery_targets_are_still_checked() {
        let report = validator().validate(
            "SELECT t.CaseId FROM DUI.v_caseheaders t WHERE t.CaseId IN (SELECT c.CaseId FROM dbo.Cases c)",
            &selected(),
            &analyze("list cases"),
        );
        assert_eq!(
            report.errors,
            vec!["FROM clause references 'dbo.Cases' outside the DUI schema"]
        );
    }

    #[test]
    fn test_unqualified_and_foreign_schema_references() {
        let report = validator().validate(
            "SELECT a.CaseId FROM v_caseheaders a JOIN dbo.Cases c ON a.CaseId = c.CaseId",
            &selected(),
            &analyze("list cases"),
        );
        assert_eq!(
            report.errors,
            vec![
                "Missing DUI schema prefix in FROM clause: v_caseheaders",
                "JOIN clause references 'dbo.Cases' outside the DUI schema",
            ]
        );
    }

    #[test]
    fn test_schema_mismatches_are_warnings() {
        let report = validator().validate(
            "SELECT s.BacLevel, s.CaseId FROM DUI.v_specimenreport_with_caseheaders s WHERE s.Narrative > 1",
            &selected(),
            &analyze("list results"),
        );
        assert!(report.is_valid);
        assert!(report
            .warnings
            .contains(&"Referenced view 'v_specimenreport_with_caseheaders' not in selected views".to_string()));
        assert!(report
            .warnings
            .contains(&"Column 'BacLevel' not found in view 'v_specimenreport_with_caseheaders'".to_string()));
        assert!(report
            .warnings
            .contains(&"Column 'Narrative' not found in view 'v_specimenreport_with_caseheaders'".to_string()));
    }

    #[test]
    fn test_near_miss_view_name_is_accepted() {
        assert!(is_selected("v_caseheader", &selected()));
        assert!(is_selected("V_CASEHEADERS", &selected()));
        assert!(!is_selected("v_vehicles", &selected()));
    }

    #[test]
    fn test_security_findings() {
        let report = validator().validate(
            "SELECT * FROM DUI.v_caseheaders t WHERE t.Email = '' OR 'a' = 'a' -- trailing",
            &selected(),
            &analyze("list cases"),
        );
        let issues = report.security_issues.join("\n");
        assert!(issues.contains("tautological string comparison"));
        assert!(issues.contains("inline comment"));
        assert!(issues.contains("Using SELECT *"));
        assert!(issues.contains("sensitive column: email"));
        assert!(report
            .performance_notes
            .contains(&"SELECT * may impact performance - consider specific columns".to_string()));
    }

    #[test]
    fn test_performance_notes() {
        let report = validator().validate(
            "SELECT DISTINCT a.CaseId FROM DUI.v_caseheaders a JOIN DUI.v_caseheaders b ON a.CaseId = b.CaseId JOIN DUI.v_caseheaders c ON a.CaseId = c.CaseId JOIN DUI.v_caseheaders d ON a.CaseId = d.CaseId ORDER BY a.CaseId",
            &selected(),
            &analyze("list cases"),
        );
        assert_eq!(
            report.performance_notes,
            vec![
                "DISTINCT operation may be expensive on large datasets",
                "ORDER BY without TOP may return large result sets",
                "Consider adding WHERE clause to limit results",
                "Multiple JOINs detected - ensure proper join conditions",
            ]
        );
    }

    #[test]
    fn test_intent_alignment_suggestions() {
        let analysis = analyze("Count defendants with BAC above 0.08");
        let report = validator().validate(
            "SELECT t.CaseId FROM DUI.v_caseheaders t",
            &selected(),
            &analysis,
        );
        assert!(report.is_valid);
        assert!(report
            .suggestions
            .contains(&"Query intent is 'count' but no COUNT function found".to_string()));
        assert!(report
            .suggestions
            .contains(&"Value filter requirement not implemented in query".to_string()));

        let analysis = analyze("top 5 highest cases from last week");
        let report = validator().validate(
            "SELECT t.CaseId FROM DUI.v_caseheaders t",
            &selected(),
            &analysis,
        );
        assert_eq!(
            report.suggestions,
            vec![
                "Time filter requirement not implemented in query",
                "Sort order requirement not implemented in query",
                "Limit requirement not implemented in query",
            ]
        );
    }
}
