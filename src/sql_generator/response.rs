//! Backend response classification and SQL post-processing

use crate::sql_text::{inside_function_call, mask, segments, SegmentKind};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").unwrap();
    static ref VIEW_REFERENCE: Regex =
        Regex::new(r"(?i)\b(FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)")
            .unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// The four-field JSON object backends are asked to return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub sql_query: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub view_used: String,
    #[serde(default)]
    pub security_note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    Structured(StructuredResponse),
    RawText(String),
}

impl BackendResponse {
    /// Strip code fences, then accept the text as structured JSON if it
    /// carries `sql_query`; anything else is raw SQL text.
    pub fn classify(raw: &str) -> Self {
        let text = strip_code_fence(raw);

        if let Ok(parsed) = serde_json::from_str::<StructuredResponse>(text) {
            return BackendResponse::Structured(parsed);
        }

        // Local models sometimes wrap the object in prose
        if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
            if start < end {
                if let Ok(parsed) = serde_json::from_str::<StructuredResponse>(&text[start..=end]) {
                    return BackendResponse::Structured(parsed);
                }
            }
        }

        BackendResponse::RawText(text.to_string())
    }
}

fn strip_code_fence(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => raw.trim(),
    }
}

/// Qualify bare view references after FROM/JOIN with `schema_prefix` and
/// collapse whitespace. Names already carrying a schema are left alone, and
/// string literals and comments come through untouched.
pub fn normalize_sql(sql: &str, schema_prefix: &str, known_views: &[String]) -> String {
    let masked = mask(sql);
    let mut qualified = String::with_capacity(sql.len() + schema_prefix.len());
    let mut copied = 0;

    for caps in VIEW_REFERENCE.captures_iter(&masked) {
        let target = match caps.get(2) {
            Some(target) => target,
            None => continue,
        };
        let name = target.as_str();
        let is_view = name.to_lowercase().starts_with("v_")
            || known_views.iter().any(|v| v.eq_ignore_ascii_case(name));
        if name.contains('.') || !is_view || inside_function_call(&masked, target.start()) {
            continue;
        }
        qualified.push_str(&sql[copied..target.start()]);
        qualified.push_str(schema_prefix);
        qualified.push('.');
        copied = target.start();
    }
    qualified.push_str(&sql[copied..]);

    collapse_whitespace(&qualified)
}

fn collapse_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    for segment in segments(sql.trim()) {
        match segment.kind {
            SegmentKind::Code => out.push_str(&WHITESPACE.replace_all(segment.text, " ")),
            SegmentKind::LineComment => {
                out.push_str(segment.text);
                out.push('\n');
            }
            SegmentKind::Literal | SegmentKind::BlockComment => out.push_str(segment.text),
        }
    }
    out.trim().to_string()
}

/// Views named as `<schema_prefix>.<view>` in the SQL, in order of appearance.
pub fn views_referenced(sql: &str, schema_prefix: &str) -> Vec<String> {
    let pattern = format!(r"(?i)\b{}\.([A-Za-z_][A-Za-z0-9_]*)", regex::escape(schema_prefix));
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures_iter(&mask(sql))
            .map(|caps| caps[1].to_string())
            .unique()
            .collect(),
        Err(_) => Vec::new(),
    }
}
