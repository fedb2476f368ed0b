use dui_query_engine::error::DuiError;
use dui_query_engine::schema_store::{restructure, ColumnKind, RestructureOutcome, SchemaStore, ViewCategory};
use std::path::PathBuf;
use std::sync::Arc;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("metadata").join(name)
}

#[test]
fn test_restructure_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let source = fixture("dui_view_schema.json");

    let first = restructure(dir.path(), &source, None).unwrap();
    assert_eq!(first, RestructureOutcome::Restructured { views: 13 });
    let index_before = std::fs::read_to_string(dir.path().join("views/view_names.json")).unwrap();

    let second = restructure(dir.path(), &source, None).unwrap();
    assert_eq!(second, RestructureOutcome::AlreadyCached);
    let index_after = std::fs::read_to_string(dir.path().join("views/view_names.json")).unwrap();
    assert_eq!(index_before, index_after);

    let store = SchemaStore::load(dir.path()).unwrap();
    assert_eq!(store.list_view_names().len(), 13);
    assert!(dir
        .path()
        .join("views/schemas/v_specimenreport_with_caseheaders.json")
        .exists());
}

#[test]
fn test_missing_source_is_a_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = restructure(dir.path(), &dir.path().join("absent.json"), None).unwrap_err();
    assert!(matches!(err, DuiError::Schema(_)));
}

#[test]
fn test_unsafe_view_names_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("schema.json");
    std::fs::write(
        &source,
        r#"{"views": {
            "v_caseheaders": {"description": "Cases", "columns": ["CaseId", "TimeOfOff"]},
            "../escape": {"description": "Bad", "columns": ["x"]}
        }}"#,
    )
    .unwrap();

    let outcome = restructure(&dir.path().join("data"), &source, None).unwrap();
    assert_eq!(outcome, RestructureOutcome::Restructured { views: 1 });
    let store = SchemaStore::load(dir.path().join("data")).unwrap();
    assert_eq!(store.list_view_names(), vec!["v_caseheaders".to_string()]);
}

#[test]
fn test_cache_returns_the_same_schema() {
    let dir = tempfile::tempdir().unwrap();
    let store = SchemaStore::open(dir.path(), fixture("dui_view_schema.json"), None).unwrap();

    assert_eq!(store.cache_stats().cached_views, 0);
    let first = store.get_view_schema("v_specimenreport_with_caseheaders").unwrap();
    let second = store.get_view_schema("v_specimenreport_with_caseheaders").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.cache_stats().cached_views, 1);

    let bac = first.columns.iter().find(|c| c.name == "BacResult").unwrap();
    assert_eq!(bac.kind, ColumnKind::Measure);
    assert_eq!(bac.description, "Blood alcohol concentration");
    let tested = first.columns.iter().find(|c| c.name == "TestDate").unwrap();
    assert_eq!(tested.kind, ColumnKind::Temporal);

    store.clear_cache();
    assert_eq!(store.cache_stats().cached_views, 0);
    let reloaded = store.get_view_schema("v_specimenreport_with_caseheaders").unwrap();
    assert_eq!(*reloaded, *first);

    assert!(store.get_view_schema("v_missing").is_none());
    assert!(store.get_view_schema("../v_caseheaders").is_none());
}

#[test]
fn test_catalog_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let store = SchemaStore::open(
        dir.path(),
        fixture("dui_view_schema.json"),
        Some(&fixture("dui_database_analysis.json")),
    )
    .unwrap();

    assert_eq!(
        store.get_views_by_category(ViewCategory::Reference),
        vec!["v_tbl_opt_offense".to_string()]
    );
    assert_eq!(store.view_category("v_officers"), ViewCategory::Supporting);
    assert_eq!(
        store.relationships("v_defendants_with_caseheaders"),
        vec!["v_defendants".to_string(), "v_caseheaders".to_string()]
    );
    assert!(store
        .search_views(&["vehicle"])
        .contains(&"v_vehicles_with_caseheaders".to_string()));

    let summary = store.database_summary().unwrap();
    assert_eq!(summary.database_name, "LEADRS_DUI_STAGE");
    assert_eq!(summary.total_tables, 42);
    assert_eq!(summary.total_views, 13);
    let counts = &summary.key_statistics;
    assert_eq!(counts.primary_views + counts.supporting_views + counts.reference_views, 13);
    assert_eq!(counts.reference_views, 1);
}
