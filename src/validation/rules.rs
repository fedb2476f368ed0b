//! Validation rule tables
//!
//! Each table pairs a label with a case-insensitive pattern. Checks in the
//! parent module walk these tables; adding a rule never touches control flow.

use lazy_static::lazy_static;
use regex::Regex;

pub struct Rule {
    pub label: &'static str,
    pub pattern: Regex,
}

fn rule(label: &'static str, pattern: &str) -> Rule {
    Rule {
        label,
        pattern: Regex::new(&format!("(?i){}", pattern)).unwrap(),
    }
}

lazy_static! {
    /// Statements that modify data, schema or permissions. Matched as whole
    /// words against masked SQL (see [`crate::sql_text::mask`]), so column
    /// names like `UpdateDate` and literal text never trigger them. Any match
    /// makes the query invalid.
    pub static ref DESTRUCTIVE_RULES: Vec<Rule> = vec![
        rule("DROP", r"\bDROP\b"),
        rule("DELETE", r"\bDELETE\b"),
        rule("TRUNCATE", r"\bTRUNCATE\b"),
        rule("ALTER", r"\bALTER\b"),
        rule("CREATE", r"\bCREATE\b"),
        rule("INSERT", r"\bINSERT\b"),
        rule("UPDATE", r"\bUPDATE\b"),
        rule("MERGE", r"\bMERGE\b"),
        rule("EXEC", r"\bEXEC(?:UTE)?\b"),
        rule("GRANT", r"\b(?:GRANT|REVOKE|DENY)\b"),
    ];

    /// Injection heuristics, reported as security issues
    pub static ref INJECTION_RULES: Vec<Rule> = vec![
        rule("quote followed by statement terminator", r"';"),
        rule("inline comment", r"--"),
        rule("block comment", r"/\*"),
        rule("UNION SELECT", r"\bUNION\s+(?:ALL\s+)?SELECT\b"),
        rule("OR 1=1", r"\bOR\s+1\s*=\s*1\b"),
        rule("stacked statements", r";\s*[A-Za-z]"),
    ];

    /// `OR '<a>' = '<b>'`; tautological when both literals are equal
    pub static ref STRING_COMPARISON: Regex =
        Regex::new(r"(?i)\bOR\s+'([^']*)'\s*=\s*'([^']*)'").unwrap();

    pub static ref SENSITIVE_COLUMN_RULES: Vec<Rule> = vec![
        rule("password", r"password"),
        rule("ssn", r"(?:\b|_)ssn(?:\b|_)"),
        rule("social_security", r"social_?security"),
        rule("credit_card", r"credit_?card"),
        rule("phone", r"phone"),
        rule("email", r"e_?mail"),
        rule("address", r"address"),
        rule("date_of_birth", r"date_?of_?birth|(?:\b|_)dob(?:\b|_)"),
    ];

    pub static ref SELECT_STAR: Regex =
        Regex::new(r"(?i)\bSELECT\s+(?:DISTINCT\s+)?(?:TOP\s*\(?\s*\d+\s*\)?\s+)?\*").unwrap();
    pub static ref STARTS_WITH_SELECT: Regex = Regex::new(r"(?i)^\s*SELECT\b").unwrap();
    pub static ref FROM_CLAUSE: Regex = Regex::new(r"(?i)\bFROM\b").unwrap();
    /// FROM/JOIN followed by a table reference (subqueries start with '(' and never match)
    pub static ref TABLE_REFERENCE: Regex = Regex::new(
        r"(?i)\b(FROM|JOIN)\s+(\[?[A-Za-z_#@][A-Za-z0-9_\]]*(?:\.\[?[A-Za-z_][A-Za-z0-9_\]]*)*)"
    )
    .unwrap();
    pub static ref WHERE_CLAUSE: Regex = Regex::new(r"(?i)\bWHERE\b").unwrap();
    pub static ref JOIN_CLAUSE: Regex = Regex::new(r"(?i)\bJOIN\b").unwrap();
    pub static ref DISTINCT: Regex = Regex::new(r"(?i)\bDISTINCT\b").unwrap();
    pub static ref ORDER_BY: Regex = Regex::new(r"(?i)\bORDER\s+BY\b").unwrap();
    pub static ref ROW_LIMIT: Regex = Regex::new(r"(?i)\b(?:TOP|LIMIT|FETCH)\b").unwrap();
    pub static ref COUNT_CALL: Regex = Regex::new(r"(?i)\bCOUNT\s*\(").unwrap();
    pub static ref DATE_CONSTRUCT: Regex =
        Regex::new(r"(?i)DATE|TIME|\bYEAR\s*\(|\bMONTH\s*\(|\bDAY\s*\(").unwrap();
    pub static ref COMPARISON: Regex = Regex::new(r"(?i)[<>]|\bBETWEEN\b").unwrap();

    /// Words that can follow a table reference but are never aliases
    pub static ref NON_ALIAS_WORDS: Vec<&'static str> = vec![
        "where", "join", "inner", "left", "right", "full", "cross", "outer", "on", "group",
        "order", "having", "union", "with", "as", "option", "for",
    ];
}

/// Column names matching these markers are too generic to flag when missing
pub const EXEMPT_COLUMN_MARKERS: &[&str] = &[
    "id", "name", "date", "time", "status", "type", "number", "count",
];

/// Minimum Jaro-Winkler similarity for a near-miss view name to be accepted
pub const VIEW_NAME_SIMILARITY: f64 = 0.9;

/// Labels of every destructive rule matching `masked`, in table order
pub fn destructive_labels(masked: &str) -> Vec<&'static str> {
    DESTRUCTIVE_RULES
        .iter()
        .filter(|r| r.pattern.is_match(masked))
        .map(|r| r.label)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_text::mask;

    fn destructive(sql: &str) -> Option<&'static str> {
        destructive_labels(&mask(sql)).first().copied()
    }

    #[test]
    fn test_destructive_statements() {
        assert_eq!(destructive("DELETE FROM DUI.v_caseheaders"), Some("DELETE"));
        assert_eq!(destructive("delete DUI.v_caseheaders where 1=1"), Some("DELETE"));
        assert_eq!(destructive("SELECT 1; DROP TABLE cases"), Some("DROP"));
        assert_eq!(destructive("truncate table x"), Some("TRUNCATE"));
        assert_eq!(destructive("UPDATE DUI.v_caseheaders SET StatusId = 1"), Some("UPDATE"));
        assert_eq!(destructive("INSERT INTO t VALUES (1)"), Some("INSERT"));
        assert_eq!(destructive("EXEC sp_who"), Some("EXEC"));
        assert_eq!(destructive("execute('SELECT 1')"), Some("EXEC"));
        assert_eq!(destructive("CREATE VIEW v AS SELECT 1"), Some("CREATE"));
        assert_eq!(destructive("MERGE DUI.v_caseheaders AS t USING s ON 1 = 1"), Some("MERGE"));
        assert_eq!(destructive("GRANT SELECT ON DUI.v_caseheaders TO mallory"), Some("GRANT"));
    }

    #[test]
    fn test_destructive_object_kinds_and_comment_separators() {
        assert_eq!(destructive("SELECT 1; ALTER ROLE db_owner ADD MEMBER mallory"), Some("ALTER"));
        assert_eq!(destructive("SELECT 1; DROP SEQUENCE DUI.case_seq"), Some("DROP"));
        assert_eq!(destructive("SELECT 1; CREATE ROLE mallory"), Some("CREATE"));
        assert_eq!(destructive("SELECT 1; DROP/**/TABLE DUI.v_caseheaders"), Some("DROP"));
        assert_eq!(destructive("SELECT 1;--x\nDELETE/* */DUI.v_caseheaders"), Some("DELETE"));
        assert_eq!(
            destructive_labels(&mask("SELECT 1; UPDATE t SET a = 1; INSERT t VALUES (1)")),
            vec!["INSERT", "UPDATE"]
        );
    }

    #[test]
    fn test_read_only_queries_are_not_destructive() {
        assert_eq!(destructive("SELECT t.UpdateDate, t.DeletedFlag FROM DUI.v_caseheaders t"), None);
        assert_eq!(destructive("SELECT t.CreatedDate FROM DUI.v_caseheaders t ORDER BY t.CreatedDate"), None);
        assert_eq!(
            destructive("SELECT t.CaseId FROM DUI.v_caseheaders t WHERE t.Narrative = 'refused to drop the keys'"),
            None
        );
        assert_eq!(destructive("SELECT t.CaseId -- update later\nFROM DUI.v_caseheaders t"), None);
    }

    #[test]
    fn test_sensitive_column_markers() {
        let hits: Vec<&str> = SENSITIVE_COLUMN_RULES
            .iter()
            .filter(|r| r.pattern.is_match("SELECT d.SSN, d.Home_Phone, d.DOB, d.ClassName FROM x"))
            .map(|r| r.label)
            .collect();
        assert_eq!(hits, vec!["ssn", "phone", "date_of_birth"]);
    }
}
