//! Query Analyzer
//!
//! Rule-based extraction of intent, keywords, requirements, query type and
//! complexity from a natural-language question. All matching is driven by the
//! pattern tables below; no backend call is involved.

use crate::error::{DuiError, Result};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    List,
    Count,
    Filter,
    Compare,
    Aggregate,
    Search,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::List => "list",
            Intent::Count => "count",
            Intent::Filter => "filter",
            Intent::Compare => "compare",
            Intent::Aggregate => "aggregate",
            Intent::Search => "search",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Aggregation,
    Comparison,
    Filtered,
    Listing,
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Aggregation => "aggregation",
            QueryType::Comparison => "comparison",
            QueryType::Filtered => "filtered",
            QueryType::Listing => "listing",
            QueryType::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFilter {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "yesterday")]
    Yesterday,
    #[serde(rename = "last_week")]
    LastWeek,
    #[serde(rename = "last_month")]
    LastMonth,
    #[serde(rename = "last_30_days")]
    Last30Days,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Today => "today",
            TimeFilter::Yesterday => "yesterday",
            TimeFilter::LastWeek => "last_week",
            TimeFilter::LastMonth => "last_month",
            TimeFilter::Last30Days => "last_30_days",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFilterKind {
    Above,
    Below,
    Over,
    Under,
}

impl ValueFilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueFilterKind::Above => "above",
            ValueFilterKind::Below => "below",
            ValueFilterKind::Over => "over",
            ValueFilterKind::Under => "under",
        }
    }

    /// SQL comparison operator the filter translates to
    pub fn operator(&self) -> &'static str {
        match self {
            ValueFilterKind::Above | ValueFilterKind::Over => ">",
            ValueFilterKind::Below | ValueFilterKind::Under => "<",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueFilter {
    #[serde(rename = "type")]
    pub kind: ValueFilterKind,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Constraints detected in the question; `None` means unconstrained
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    pub time_filter: Option<TimeFilter>,
    pub value_filter: Option<ValueFilter>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<u32>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        self.time_filter.is_none()
            && self.value_filter.is_none()
            && self.sort_order.is_none()
            && self.limit.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub original_query: String,
    pub intent: Intent,
    pub keywords: Vec<String>,
    pub requirements: Requirements,
    pub query_type: QueryType,
    pub complexity: Complexity,
    /// Set when analysis failed and this is the degraded result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl QueryAnalysis {
    pub fn degraded(query: &str, diagnostic: impl Into<String>) -> Self {
        Self {
            original_query: query.to_string(),
            intent: Intent::List,
            keywords: Vec::new(),
            requirements: Requirements::default(),
            query_type: QueryType::General,
            complexity: Complexity::Simple,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "can", "this", "that", "these", "those",
];

const DOMAIN_TERMS: &[&str] = &[
    "case", "defendant", "officer", "evidence", "test", "report", "blood", "alcohol", "bac",
    "sobriety", "field", "vehicle", "offense", "charge", "court", "date", "time", "location",
];

/// Build a word-bounded alternation; spaces inside phrases match any
/// whitespace and the last word may carry a plural `s`/`es`.
fn phrase_regex(phrases: &[&str]) -> Regex {
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p).replace(' ', r"\s+"))
        .join("|");
    Regex::new(&format!(r"\b(?:{})(?:e?s)?\b", alternation)).unwrap()
}

lazy_static! {
    static ref INTENT_RULES: Vec<(Intent, Regex)> = vec![
        (Intent::List, phrase_regex(&["show", "list", "get", "find", "display", "retrieve"])),
        (Intent::Count, phrase_regex(&["count", "how many", "total number", "number of"])),
        (Intent::Filter, phrase_regex(&["where", "filter", "only", "just", "with"])),
        (Intent::Compare, phrase_regex(&["compare", "versus", "vs", "difference", "between"])),
        (Intent::Aggregate, phrase_regex(&["sum", "average", "total", "maximum", "minimum"])),
        (Intent::Search, phrase_regex(&["search", "look for", "find", "locate"])),
    ];

    static ref QUERY_TYPE_RULES: Vec<(QueryType, Regex)> = vec![
        (QueryType::Aggregation, phrase_regex(&["count", "how many", "total"])),
        (QueryType::Comparison, phrase_regex(&["compare", "versus", "vs"])),
        (QueryType::Filtered, phrase_regex(&["where", "filter", "only"])),
        (QueryType::Listing, phrase_regex(&["list", "show", "get"])),
    ];

    static ref TIME_RULES: Vec<(TimeFilter, Regex)> = vec![
        (TimeFilter::Last30Days, Regex::new(r"\b(?:last|past|recent)\s+30\s+days?\b").unwrap()),
        (TimeFilter::LastMonth, Regex::new(r"\b(?:last|past|recent)\s+month\b").unwrap()),
        (TimeFilter::LastWeek, Regex::new(r"\b(?:last|past|recent)\s+week\b").unwrap()),
        (TimeFilter::Today, Regex::new(r"\btoday\b|\bcurrent\s+day\b").unwrap()),
        (TimeFilter::Yesterday, Regex::new(r"\byesterday\b").unwrap()),
    ];

    static ref VALUE_RULES: Vec<(ValueFilterKind, Regex)> = vec![
        (ValueFilterKind::Above, Regex::new(r"\babove\s+(\d+(?:\.\d+)?)").unwrap()),
        (ValueFilterKind::Below, Regex::new(r"\bbelow\s+(\d+(?:\.\d+)?)").unwrap()),
        (ValueFilterKind::Over, Regex::new(r"\bover\s+(\d+(?:\.\d+)?)").unwrap()),
        (ValueFilterKind::Under, Regex::new(r"\bunder\s+(\d+(?:\.\d+)?)").unwrap()),
    ];

    static ref SORT_DESC: Regex = phrase_regex(&["highest", "top"]);
    static ref SORT_ASC: Regex = phrase_regex(&["lowest", "bottom"]);
    static ref LIMIT: Regex = Regex::new(r"\btop\s+(\d+)\b").unwrap();
    static ref WORD: Regex = Regex::new(r"\b\w+\b").unwrap();

    // (pattern, weight) pairs for the complexity score; and/or count per occurrence
    static ref COMPLEXITY_CLAUSES: Vec<(Regex, u32)> = vec![
        (Regex::new(r"\bwhere\b").unwrap(), 1),
        (Regex::new(r"\border\s+by\b").unwrap(), 1),
        (Regex::new(r"\bgroup\s+by\b").unwrap(), 1),
        (Regex::new(r"\bjoin\b").unwrap(), 2),
    ];
    static ref CONDITION: Regex = Regex::new(r"\b(?:and|or)\b").unwrap();
}

/// Analyze a question. Never fails: errors yield a degraded analysis with a
/// diagnostic.
pub fn analyze(query: &str) -> QueryAnalysis {
    match try_analyze(query) {
        Ok(analysis) => {
            info!(
                "Query analyzed: {} | keywords: {:?}",
                analysis.intent.as_str(),
                analysis.keywords
            );
            analysis
        }
        Err(e) => {
            warn!("Query analysis failed, using degraded analysis: {}", e);
            QueryAnalysis::degraded(query, e.to_string())
        }
    }
}

pub fn try_analyze(query: &str) -> Result<QueryAnalysis> {
    let lowered = query.to_lowercase();

    Ok(QueryAnalysis {
        original_query: query.to_string(),
        intent: extract_intent(&lowered),
        keywords: extract_keywords(&lowered),
        requirements: extract_requirements(&lowered)?,
        query_type: classify_query_type(&lowered),
        complexity: assess_complexity(&lowered),
        diagnostic: None,
    })
}

fn extract_intent(lowered: &str) -> Intent {
    INTENT_RULES
        .iter()
        .find(|(_, pattern)| pattern.is_match(lowered))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::List)
}

fn extract_keywords(lowered: &str) -> Vec<String> {
    let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();

    let tokens = WORD
        .find_iter(lowered)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() > 2 && !stop_words.contains(w))
        .map(str::to_string);

    let domain_terms = DOMAIN_TERMS
        .iter()
        .filter_map(|term| lowered.find(term).map(|pos| (pos, *term)))
        .sorted_by_key(|(pos, _)| *pos)
        .map(|(_, term)| term.to_string());

    tokens.chain(domain_terms).unique().collect()
}

fn extract_requirements(lowered: &str) -> Result<Requirements> {
    let time_filter = TIME_RULES
        .iter()
        .find(|(_, pattern)| pattern.is_match(lowered))
        .map(|(filter, _)| *filter);

    let mut value_filter = None;
    for (kind, pattern) in VALUE_RULES.iter() {
        if let Some(caps) = pattern.captures(lowered) {
            let raw = &caps[1];
            let value = raw.parse::<f64>().map_err(|e| {
                DuiError::Analysis(format!("Invalid {} value '{}': {}", kind.as_str(), raw, e))
            })?;
            value_filter = Some(ValueFilter { kind: *kind, value });
            break;
        }
    }

    let sort_order = if SORT_DESC.is_match(lowered) {
        Some(SortOrder::Desc)
    } else if SORT_ASC.is_match(lowered) {
        Some(SortOrder::Asc)
    } else {
        None
    };

    let limit = match LIMIT.captures(lowered) {
        Some(caps) => {
            let raw = &caps[1];
            Some(raw.parse::<u32>().map_err(|e| {
                DuiError::Analysis(format!("Invalid result limit '{}': {}", raw, e))
            })?)
        }
        None => None,
    };

    Ok(Requirements {
        time_filter,
        value_filter,
        sort_order,
        limit,
    })
}

fn classify_query_type(lowered: &str) -> QueryType {
    QUERY_TYPE_RULES
        .iter()
        .find(|(_, pattern)| pattern.is_match(lowered))
        .map(|(query_type, _)| *query_type)
        .unwrap_or(QueryType::General)
}

fn assess_complexity(lowered: &str) -> Complexity {
    let clauses: u32 = COMPLEXITY_CLAUSES
        .iter()
        .filter(|(pattern, _)| pattern.is_match(lowered))
        .map(|(_, weight)| *weight)
        .sum();
    let conditions = CONDITION.find_iter(lowered).count() as u32;

    match clauses + conditions {
        0..=1 => Complexity::Simple,
        2..=3 => Complexity::Moderate,
        _ => Complexity::Complex,
    }
}
