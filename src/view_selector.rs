//! View Selector
//!
//! Scores every catalog view against an analysis and returns a short ranked
//! list, so later stages only ever see the schemas of a handful of views.

use crate::config::DEFAULT_VIEW;
use crate::query_analyzer::{Intent, QueryAnalysis, QueryType};
use crate::schema_store::{SchemaStore, ViewCategory};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const MAX_SELECTED_VIEWS: usize = 5;
const MIN_SELECTED_SCORE: f64 = 0.5;
const MAX_ALTERNATIVES: usize = 3;
const CONTEXT_KB_PER_VIEW: usize = 3;
const PRE_JOINED_MARKER: &str = "_with_caseheaders";
const DEFAULT_CASE_VIEWS: &[&str] = &["v_caseheaders", "v_caseoffenses_with_caseheaders"];

lazy_static! {
    /// Curated keyword -> views boosts for the DUI catalog
    static ref KEYWORD_VIEWS: HashMap<&'static str, &'static [&'static str]> = {
        let table: &[(&str, &[&str])] = &[
            ("case", &["v_caseheaders", "v_caseoffenses_with_caseheaders"]),
            ("defendant", &["v_defendants", "v_defendants_with_caseheaders"]),
            ("offense", &["v_caseoffenses_with_caseheaders", "v_tbl_opt_offense"]),
            ("evidence", &["v_physicalevidence", "v_physicalevidence_with_caseheaders"]),
            ("blood", &["v_specimenreport_with_caseheaders"]),
            ("alcohol", &["v_specimenreport_with_caseheaders"]),
            ("bac", &["v_specimenreport_with_caseheaders"]),
            ("test", &["v_fieldsobrietytests", "v_specimenreport_with_caseheaders"]),
            ("sobriety", &["v_fieldsobrietytests"]),
            ("field", &["v_fieldsobrietytests"]),
            ("officer", &["v_otherofficers_with_caseheaders", "v_officers"]),
            ("personnel", &["v_otherofficers_with_caseheaders", "v_officers"]),
            ("vehicle", &["v_vehicles", "v_vehicles_with_caseheaders"]),
            ("property", &["v_vehicles", "v_vehicles_with_caseheaders"]),
            ("time", &["v_caseoffenses_with_caseheaders"]),
            ("date", &["v_caseoffenses_with_caseheaders"]),
            ("month", &["v_caseoffenses_with_caseheaders"]),
            ("last", &["v_caseoffenses_with_caseheaders"]),
            ("court", &["v_caseheaders"]),
            ("legal", &["v_caseheaders"]),
            ("location", &["v_caseheaders"]),
            ("address", &["v_caseheaders"]),
            ("statistics", &["v_caseheaders", "v_caseoffenses_with_caseheaders"]),
            ("report", &["v_specimenreport_with_caseheaders", "v_fieldsobrietytests"]),
            ("summary", &["v_caseheaders", "v_caseoffenses_with_caseheaders"]),
        ];
        table.iter().copied().collect()
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredView {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSelection {
    pub views: Vec<ScoredView>,
    pub reasoning: String,
    pub alternatives: Vec<String>,
    pub estimated_context_kb: usize,
    /// True when nothing scored and the configured default view was used
    pub used_fallback: bool,
}

impl ViewSelection {
    pub fn view_names(&self) -> Vec<String> {
        self.views.iter().map(|v| v.name.clone()).collect()
    }
}

pub struct ViewSelector {
    store: Arc<SchemaStore>,
    default_view: String,
}

impl ViewSelector {
    pub fn new(store: Arc<SchemaStore>) -> Self {
        Self {
            store,
            default_view: DEFAULT_VIEW.to_string(),
        }
    }

    pub fn with_default_view(mut self, view: impl Into<String>) -> Self {
        self.default_view = view.into();
        self
    }

    pub fn select(&self, analysis: &QueryAnalysis) -> Vec<String> {
        self.select_ranked(analysis).view_names()
    }

    pub fn select_ranked(&self, analysis: &QueryAnalysis) -> ViewSelection {
        let scores = self.score_views(&analysis.keywords);
        let scores = reweight_for_intent(scores, analysis.intent, analysis.query_type);
        let mut views = self.top_views(scores);

        let used_fallback = views.is_empty();
        if used_fallback {
            debug!("No view scored, falling back to {}", self.default_view);
            views.push(ScoredView {
                name: self.default_view.clone(),
                score: 0.0,
            });
        }

        let names: Vec<String> = views.iter().map(|v| v.name.clone()).collect();
        info!("Selected views: {:?}", names);

        ViewSelection {
            reasoning: explain_selection(analysis, &names),
            alternatives: self.alternatives(&names),
            estimated_context_kb: names.len() * CONTEXT_KB_PER_VIEW,
            views,
            used_fallback,
        }
    }

    fn score_views(&self, keywords: &[String]) -> Vec<ScoredView> {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

        self.store
            .view_names_with_descriptions()
            .iter()
            .filter_map(|entry| {
                let name = entry.name.to_lowercase();
                let mut score = 0.0;

                for keyword in &keywords {
                    if name.contains(keyword.as_str()) {
                        score += 2.0;
                    }
                    if let Some(mapped) = KEYWORD_VIEWS.get(keyword.as_str()) {
                        if mapped.contains(&entry.name.as_str()) {
                            score += 3.0;
                        }
                    }
                }

                score += match entry.category {
                    ViewCategory::Primary => 0.5,
                    ViewCategory::Supporting => 0.3,
                    ViewCategory::Reference => 0.0,
                };

                if name.contains(PRE_JOINED_MARKER) {
                    score += 1.0;
                }

                (score > 0.0).then(|| ScoredView {
                    name: entry.name.clone(),
                    score,
                })
            })
            .collect()
    }

    fn top_views(&self, mut scores: Vec<ScoredView>) -> Vec<ScoredView> {
        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut selected: Vec<ScoredView> = scores
            .into_iter()
            .take(MAX_SELECTED_VIEWS)
            .filter(|v| v.score > MIN_SELECTED_SCORE)
            .collect();

        // Larger selections should still anchor on case data
        if selected.len() > 3 && !selected.iter().any(|v| v.name.to_lowercase().contains("case")) {
            if let Some(case_view) = DEFAULT_CASE_VIEWS.iter().find(|v| self.store.contains(v)) {
                let score = selected.first().map(|v| v.score).unwrap_or(0.0);
                selected.insert(
                    0,
                    ScoredView {
                        name: case_view.to_string(),
                        score,
                    },
                );
            }
        }

        selected.truncate(MAX_SELECTED_VIEWS);
        selected
    }

    fn alternatives(&self, selected: &[String]) -> Vec<String> {
        let selected_bases: Vec<&str> = selected.iter().map(|s| base_name(s)).collect();
        self.store
            .list_view_names()
            .into_iter()
            .filter(|name| !selected.contains(name))
            .filter(|name| selected_bases.contains(&base_name(name)))
            .take(MAX_ALTERNATIVES)
            .collect()
    }
}

fn reweight_for_intent(
    mut scores: Vec<ScoredView>,
    intent: Intent,
    query_type: QueryType,
) -> Vec<ScoredView> {
    let (markers, factor): (&[&str], f64) =
        if intent == Intent::Count || query_type == QueryType::Aggregation {
            (&[PRE_JOINED_MARKER], 1.5)
        } else if intent == Intent::Filter || query_type == QueryType::Filtered {
            (&["detailed", "full"], 1.3)
        } else if intent == Intent::Compare || query_type == QueryType::Comparison {
            (&["summary"], 1.4)
        } else {
            return scores;
        };

    for view in scores.iter_mut() {
        let name = view.name.to_lowercase();
        if markers.iter().any(|m| name.contains(m)) {
            view.score *= factor;
        }
    }
    scores
}

fn base_name(view: &str) -> &str {
    let view = view.strip_suffix(PRE_JOINED_MARKER).unwrap_or(view);
    view.strip_suffix("_detailed").unwrap_or(view)
}

fn explain_selection(analysis: &QueryAnalysis, selected: &[String]) -> String {
    selected
        .iter()
        .map(|view| {
            let lowered = view.to_lowercase();
            if analysis.keywords.iter().any(|k| lowered.contains(&k.to_lowercase())) {
                format!("{}: Direct keyword match", view)
            } else if lowered.contains(PRE_JOINED_MARKER) {
                format!("{}: Pre-joined with case data", view)
            } else {
                format!("{}: Related to query intent ({})", view, analysis.intent.as_str())
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
