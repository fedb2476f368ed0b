//! Schema Store
//!
//! Catalog of the database views the query pipeline is allowed to use. The
//! offline analysis produces one consolidated schema document; on first use it
//! is split into one file per view plus small index files, and every later
//! process start reads the index and loads individual view schemas lazily.

use crate::error::{DuiError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

const VIEWS_DIR: &str = "views";
const SCHEMAS_DIR: &str = "schemas";
const ANALYSIS_DIR: &str = "analysis";
const VIEW_NAMES_FILE: &str = "view_names.json";
const VIEW_CATEGORIES_FILE: &str = "view_categories.json";
const VIEW_RELATIONSHIPS_FILE: &str = "view_relationships.json";
const DATABASE_SUMMARY_FILE: &str = "database_summary.json";

/// Views most queries end up touching
pub const COMMON_VIEWS: &[&str] = &[
    "v_caseheaders",
    "v_defendants",
    "v_caseoffenses_with_caseheaders",
    "v_specimenreport_with_caseheaders",
    "v_fieldsobrietytests",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewCategory {
    Primary,
    Supporting,
    Reference,
}

impl ViewCategory {
    pub const ALL: [ViewCategory; 3] = [
        ViewCategory::Primary,
        ViewCategory::Supporting,
        ViewCategory::Reference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewCategory::Primary => "primary",
            ViewCategory::Supporting => "supporting",
            ViewCategory::Reference => "reference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Some(ViewCategory::Primary),
            "supporting" => Some(ViewCategory::Supporting),
            "reference" => Some(ViewCategory::Reference),
            _ => None,
        }
    }

    /// Categorize a view from its name: high-volume case data is primary,
    /// lookup tables are reference data, everything else is supporting.
    pub fn infer(view_name: &str) -> Self {
        let name = view_name.to_lowercase();
        let has_any = |words: &[&str]| words.iter().any(|w| name.contains(w));

        if has_any(&["case", "defendant", "offense", "evidence"]) {
            ViewCategory::Primary
        } else if has_any(&["officer", "vehicle", "test", "report"]) {
            ViewCategory::Supporting
        } else if has_any(&["lookup", "reference", "type", "status"]) {
            ViewCategory::Reference
        } else {
            ViewCategory::Supporting
        }
    }
}

/// Semantic category of a column, inferred from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Identifier,
    Temporal,
    Name,
    Status,
    Measure,
    Text,
}

impl ColumnKind {
    pub fn infer(column_name: &str) -> Self {
        let name = column_name.to_lowercase();
        if name.ends_with("id") || name.ends_with("_key") {
            ColumnKind::Identifier
        } else if name.contains("date") || name.contains("time") || name.ends_with("_at") {
            ColumnKind::Temporal
        } else if name.contains("name") {
            ColumnKind::Name
        } else if ["status", "type", "code", "flag"].iter().any(|w| name.contains(w)) {
            ColumnKind::Status
        } else if ["count", "amount", "bac", "level", "result", "total", "number", "qty"]
            .iter()
            .any(|w| name.contains(w))
        {
            ColumnKind::Measure
        } else {
            ColumnKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ColumnKind,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = ColumnKind::infer(&name);
        Self {
            name,
            description: String::new(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSchema {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnDescriptor>,
    pub category: ViewCategory,
    /// Generator-assigned shape (simple, relationship, comprehensive, analytical)
    #[serde(default)]
    pub view_type: Option<String>,
}

impl ViewSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, columns: &[&str]) -> Self {
        let name = name.into();
        let category = ViewCategory::infer(&name);
        Self {
            name,
            description: description.into(),
            columns: columns.iter().map(|c| ColumnDescriptor::new(*c)).collect(),
            category,
            view_type: None,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(column))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// One row of the persisted view index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewIndexEntry {
    pub name: String,
    pub description: String,
    pub columns_count: usize,
    pub category: ViewCategory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub primary_views: usize,
    pub supporting_views: usize,
    pub reference_views: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub total_views: usize,
    pub total_tables: u64,
    pub database_name: String,
    pub last_updated: String,
    pub restructured_at: String,
    pub key_statistics: CategoryCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub cached_views: usize,
    pub total_views: usize,
    pub cache_hit_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestructureOutcome {
    Restructured { views: usize },
    AlreadyCached,
}

// Source document written by the offline view analysis. Columns come either
// as bare names or as objects with a description.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceColumn {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        kind: Option<ColumnKind>,
    },
}

impl SourceColumn {
    fn into_descriptor(self) -> ColumnDescriptor {
        match self {
            SourceColumn::Name(name) => ColumnDescriptor::new(name),
            SourceColumn::Detailed {
                name,
                description,
                kind,
            } => {
                let kind = kind.unwrap_or_else(|| ColumnKind::infer(&name));
                ColumnDescriptor {
                    name,
                    description,
                    kind,
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SourceView {
    #[serde(rename = "type", default)]
    view_type: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    columns: Vec<SourceColumn>,
    #[serde(default)]
    category: Option<ViewCategory>,
}

#[derive(Debug, Deserialize)]
struct SourceDocument {
    views: BTreeMap<String, SourceView>,
}

#[derive(Debug, Default, Deserialize)]
struct SourceAnalysis {
    #[serde(default)]
    database_name: String,
    #[serde(default)]
    total_tables: u64,
    #[serde(default)]
    last_updated: String,
}

/// Read-only view catalog with a lazily populated per-view cache
pub struct SchemaStore {
    schema_dir: Option<PathBuf>,
    index: Vec<ViewIndexEntry>,
    categories: HashMap<ViewCategory, Vec<String>>,
    relationships: HashMap<String, Vec<String>>,
    summary: Option<DatabaseSummary>,
    cache: RwLock<HashMap<String, Arc<ViewSchema>>>,
}

impl SchemaStore {
    /// Open the store under `data_dir`, restructuring `source_schema` first
    /// if no cache exists yet.
    pub fn open(
        data_dir: impl AsRef<Path>,
        source_schema: impl AsRef<Path>,
        source_analysis: Option<&Path>,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        match restructure(data_dir, source_schema.as_ref(), source_analysis)? {
            RestructureOutcome::AlreadyCached => info!("Schema cache found, loading"),
            RestructureOutcome::Restructured { views } => {
                info!("Restructured {} views into {}", views, data_dir.display())
            }
        }
        Self::load(data_dir)
    }

    /// Load an already restructured cache directory.
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self> {
        let views_dir = data_dir.as_ref().join(VIEWS_DIR);

        let index: Vec<ViewIndexEntry> = read_json(&views_dir.join(VIEW_NAMES_FILE))?;
        let raw_categories: HashMap<String, Vec<String>> =
            read_json(&views_dir.join(VIEW_CATEGORIES_FILE))?;
        let relationships: HashMap<String, Vec<String>> =
            read_json_or_default(&views_dir.join(VIEW_RELATIONSHIPS_FILE))?;
        let summary: Option<DatabaseSummary> = {
            let path = data_dir.as_ref().join(ANALYSIS_DIR).join(DATABASE_SUMMARY_FILE);
            if path.exists() {
                Some(read_json(&path)?)
            } else {
                None
            }
        };

        let mut categories = HashMap::new();
        for (raw, names) in raw_categories {
            match ViewCategory::parse(&raw) {
                Some(category) => {
                    categories.insert(category, names);
                }
                None => warn!("Ignoring unknown view category '{}' in cache", raw),
            }
        }

        info!("Schema store loaded with {} views", index.len());

        Ok(Self {
            schema_dir: Some(views_dir.join(SCHEMAS_DIR)),
            index,
            categories,
            relationships,
            summary,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Build a fully in-memory store. Every schema is cached up front.
    pub fn from_views(views: Vec<ViewSchema>) -> Self {
        let index = views.iter().map(index_entry).collect();
        let categories = group_by_category(&views);
        let names: Vec<String> = views.iter().map(|v| v.name.clone()).collect();
        let relationships = derive_relationships(&names);
        let cache = views
            .into_iter()
            .map(|v| (v.name.clone(), Arc::new(v)))
            .collect();

        Self {
            schema_dir: None,
            index,
            categories,
            relationships,
            summary: None,
            cache: RwLock::new(cache),
        }
    }

    pub fn list_view_names(&self) -> Vec<String> {
        self.index.iter().map(|e| e.name.clone()).collect()
    }

    pub fn view_names_with_descriptions(&self) -> &[ViewIndexEntry] {
        &self.index
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.iter().any(|e| e.name == name)
    }

    /// Look up a view schema. Unknown names and unreadable files yield `None`.
    pub fn get_view_schema(&self, name: &str) -> Option<Arc<ViewSchema>> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(schema) = cache.get(name) {
                return Some(schema.clone());
            }
        }

        if !self.contains(name) {
            debug!("Unknown view requested: {}", name);
            return None;
        }

        let schema_dir = self.schema_dir.as_ref()?;
        let path = schema_dir.join(format!("{}.json", name));
        match read_json::<ViewSchema>(&path) {
            Ok(schema) => {
                let schema = Arc::new(schema);
                let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
                let entry = cache.entry(name.to_string()).or_insert(schema);
                Some(entry.clone())
            }
            Err(e) => {
                warn!("Failed to load schema for view {}: {}", name, e);
                None
            }
        }
    }

    /// Batch lookup in request order; unresolvable names are skipped.
    pub fn get_view_schemas<S: AsRef<str>>(&self, names: &[S]) -> Vec<(String, Arc<ViewSchema>)> {
        let mut schemas = Vec::new();
        for name in names {
            let name = name.as_ref();
            if schemas.iter().any(|(n, _): &(String, _)| n == name) {
                continue;
            }
            if let Some(schema) = self.get_view_schema(name) {
                schemas.push((name.to_string(), schema));
            }
        }
        schemas
    }

    pub fn get_views_by_category(&self, category: ViewCategory) -> Vec<String> {
        self.categories.get(&category).cloned().unwrap_or_default()
    }

    pub fn view_category(&self, name: &str) -> ViewCategory {
        self.index
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.category)
            .unwrap_or(ViewCategory::Supporting)
    }

    /// Case-insensitive substring search over view names and descriptions.
    pub fn search_views<S: AsRef<str>>(&self, keywords: &[S]) -> Vec<String> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        self.index
            .iter()
            .filter(|entry| {
                let name = entry.name.to_lowercase();
                let description = entry.description.to_lowercase();
                keywords
                    .iter()
                    .any(|k| name.contains(k.as_str()) || description.contains(k.as_str()))
            })
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn relationships(&self, name: &str) -> Vec<String> {
        self.relationships.get(name).cloned().unwrap_or_default()
    }

    pub fn database_summary(&self) -> Option<&DatabaseSummary> {
        self.summary.as_ref()
    }

    /// Warm the cache for the given views, returning how many are now cached.
    pub fn preload<S: AsRef<str>>(&self, names: &[S]) -> usize {
        let loaded = names
            .iter()
            .filter(|n| self.get_view_schema(n.as_ref()).is_some())
            .count();
        debug!("Preloaded {} of {} views", loaded, names.len());
        loaded
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cached_views = self.cache.read().unwrap_or_else(|e| e.into_inner()).len();
        let total_views = self.index.len();
        let cache_hit_ratio = if total_views == 0 {
            0.0
        } else {
            cached_views as f64 / total_views as f64
        };
        CacheStats {
            cached_views,
            total_views,
            cache_hit_ratio,
        }
    }

    /// Drop lazily loaded schemas. In-memory stores have nothing to reload
    /// from, so their cache is kept.
    pub fn clear_cache(&self) {
        if self.schema_dir.is_some() {
            self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
            info!("Schema cache cleared");
        }
    }
}

/// Split the consolidated schema document into per-view files and indexes.
/// A no-op when the cache directory already holds a view index.
pub fn restructure(
    data_dir: &Path,
    source_schema: &Path,
    source_analysis: Option<&Path>,
) -> Result<RestructureOutcome> {
    let views_dir = data_dir.join(VIEWS_DIR);
    if views_dir.join(VIEW_NAMES_FILE).exists() {
        return Ok(RestructureOutcome::AlreadyCached);
    }

    if !source_schema.exists() {
        return Err(DuiError::Schema(format!(
            "Schema source not found: {}",
            source_schema.display()
        )));
    }

    let document: SourceDocument = read_json(source_schema)?;
    let analysis: SourceAnalysis = match source_analysis {
        Some(path) if path.exists() => read_json(path)?,
        Some(path) => {
            warn!("Analysis source {} not found, summary will be partial", path.display());
            SourceAnalysis::default()
        }
        None => SourceAnalysis::default(),
    };

    let schemas_dir = views_dir.join(SCHEMAS_DIR);
    std::fs::create_dir_all(&schemas_dir)?;
    std::fs::create_dir_all(data_dir.join(ANALYSIS_DIR))?;

    let mut views = Vec::with_capacity(document.views.len());
    for (name, source) in document.views {
        if !is_safe_view_name(&name) {
            warn!("Skipping view with unusable name '{}'", name);
            continue;
        }
        let category = source.category.unwrap_or_else(|| ViewCategory::infer(&name));
        let schema = ViewSchema {
            columns: source
                .columns
                .into_iter()
                .map(SourceColumn::into_descriptor)
                .collect(),
            name,
            description: source.description,
            category,
            view_type: source.view_type,
        };
        write_json(&schemas_dir.join(format!("{}.json", schema.name)), &schema)?;
        views.push(schema);
    }

    let index: Vec<ViewIndexEntry> = views.iter().map(index_entry).collect();
    let categories: HashMap<String, Vec<String>> = group_by_category(&views)
        .into_iter()
        .map(|(category, names)| (category.as_str().to_string(), names))
        .collect();
    let names: Vec<String> = views.iter().map(|v| v.name.clone()).collect();
    let relationships = derive_relationships(&names);

    let count_of = |category: ViewCategory| views.iter().filter(|v| v.category == category).count();
    let summary = DatabaseSummary {
        total_views: views.len(),
        total_tables: analysis.total_tables,
        database_name: analysis.database_name,
        last_updated: analysis.last_updated,
        restructured_at: Utc::now().to_rfc3339(),
        key_statistics: CategoryCounts {
            primary_views: count_of(ViewCategory::Primary),
            supporting_views: count_of(ViewCategory::Supporting),
            reference_views: count_of(ViewCategory::Reference),
        },
    };

    write_json(&views_dir.join(VIEW_CATEGORIES_FILE), &categories)?;
    write_json(&views_dir.join(VIEW_RELATIONSHIPS_FILE), &relationships)?;
    write_json(&data_dir.join(ANALYSIS_DIR).join(DATABASE_SUMMARY_FILE), &summary)?;
    // Written last: its presence marks the cache as complete.
    write_json(&views_dir.join(VIEW_NAMES_FILE), &index)?;

    Ok(RestructureOutcome::Restructured { views: views.len() })
}

fn index_entry(view: &ViewSchema) -> ViewIndexEntry {
    ViewIndexEntry {
        name: view.name.clone(),
        description: view.description.clone(),
        columns_count: view.columns.len(),
        category: view.category,
    }
}

fn group_by_category(views: &[ViewSchema]) -> HashMap<ViewCategory, Vec<String>> {
    let mut categories: HashMap<ViewCategory, Vec<String>> = HashMap::new();
    for view in views {
        categories
            .entry(view.category)
            .or_insert_with(Vec::new)
            .push(view.name.clone());
    }
    categories
}

/// Pre-joined views are named `v_<base>_with_<other>`; map each to the
/// catalog views it combines.
fn derive_relationships(names: &[String]) -> HashMap<String, Vec<String>> {
    let mut relationships = HashMap::new();
    for name in names {
        if let Some((base, other)) = name.split_once("_with_") {
            let other = format!("v_{}", other);
            let related: Vec<String> = [base.to_string(), other]
                .into_iter()
                .filter(|candidate| names.contains(candidate))
                .collect();
            if !related.is_empty() {
                relationships.insert(name.clone(), related);
            }
        }
    }
    relationships
}

fn is_safe_view_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DuiError::Schema(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| DuiError::Schema(format!("Failed to parse {}: {}", path.display(), e)))
}

fn read_json_or_default<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    if path.exists() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}
