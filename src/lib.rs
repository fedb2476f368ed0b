//! Natural-language questions over the DUI case database, answered as
//! validated SQL.
//!
//! A question flows through [`query_analyzer`], [`view_selector`],
//! [`sql_generator`] and [`validation`]; [`pipeline::QueryPipeline`] ties the
//! stages together and optionally hands the result to an [`execution`]
//! backend.

pub mod config;
pub mod error;
pub mod execution;
pub mod llm;
pub mod pipeline;
pub mod query_analyzer;
pub mod schema_store;
pub mod sql_generator;
pub mod sql_text;
pub mod validation;
pub mod view_selector;

pub use config::{BackendKind, BackendSettings, Settings};
pub use error::{DuiError, Result};
pub use execution::{ExecutionOutcome, SqlExecutor, SqliteExecutor};
pub use llm::{StubBackend, TextBackend};
pub use pipeline::{ExecutedResponse, PipelineResponse, QueryPipeline, SystemStatus};
pub use query_analyzer::{analyze, QueryAnalysis};
pub use schema_store::{restructure, RestructureOutcome, SchemaStore, ViewCategory, ViewSchema};
pub use sql_generator::{GeneratedSql, SqlGenerator};
pub use validation::{SqlValidator, ValidationReport};
pub use view_selector::{ViewSelection, ViewSelector};
