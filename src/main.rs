use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dui_query_engine::config::{BackendKind, Settings};
use dui_query_engine::execution::SqliteExecutor;
use dui_query_engine::pipeline::{ExecutedResponse, PipelineResponse, QueryPipeline};
use dui_query_engine::schema_store::{restructure, RestructureOutcome, SchemaStore, ViewCategory};
use dui_query_engine::sql_generator::SqlGenerator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dui-query")]
#[command(about = "Natural-language questions over the DUI case database, answered as validated SQL")]
struct Args {
    /// Backend: mock, openai, gemini or ollama (overrides AI_MODEL_TYPE)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Model name (overrides AI_MODEL_NAME)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Restructured schema cache directory (overrides DUI_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Consolidated view schema document (overrides DUI_SCHEMA_SOURCE)
    #[arg(long, global = true)]
    schema_source: Option<PathBuf>,

    /// SQLite database used for --execute (overrides DUI_SQLITE_PATH)
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate a question into validated SQL
    Query {
        text: String,

        /// Run the SQL against the configured database
        #[arg(long)]
        execute: bool,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// List catalog views
    Views {
        /// primary, supporting or reference
        #[arg(long)]
        category: Option<String>,

        /// Keep views whose name or description mentions any keyword
        #[arg(long, num_args = 1..)]
        search: Vec<String>,
    },
    /// Split the schema document into the per-view cache
    Restructure,
    /// Print pipeline status as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = settings_for(&args)?;

    match &args.command {
        Command::Restructure => {
            let outcome = restructure(
                &settings.data_dir,
                &settings.schema_source,
                settings.analysis_source.as_deref(),
            )?;
            match outcome {
                RestructureOutcome::Restructured { views } => {
                    println!("Restructured {} views into {}", views, settings.data_dir.display())
                }
                RestructureOutcome::AlreadyCached => {
                    println!("Schema cache already present in {}", settings.data_dir.display())
                }
            }
        }
        Command::Views { category, search } => {
            let store = open_store(&settings)?;
            let mut names = match category {
                Some(raw) => {
                    let category = ViewCategory::parse(raw)
                        .with_context(|| format!("Unknown view category '{}'", raw))?;
                    store.get_views_by_category(category)
                }
                None => store.list_view_names(),
            };
            if !search.is_empty() {
                let matches = store.search_views(search.as_slice());
                names.retain(|n| matches.contains(n));
            }
            for entry in store.view_names_with_descriptions() {
                if names.contains(&entry.name) {
                    println!("{:<45} {:<10} {}", entry.name, entry.category.as_str(), entry.description);
                }
            }
        }
        Command::Status => {
            let pipeline = build_pipeline(&settings)?;
            println!("{}", serde_json::to_string_pretty(&pipeline.system_status())?);
        }
        Command::Query {
            text,
            execute,
            json,
        } => {
            let pipeline = build_pipeline(&settings)?;
            info!("Using backend {}", settings.backend.kind.as_str());
            if *execute {
                let executed = pipeline.execute_query(text).await;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&executed)?);
                } else {
                    print_executed(&executed);
                }
            } else {
                let response = pipeline.process_query(text).await;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                } else {
                    print_response(&response);
                }
            }
        }
    }

    Ok(())
}

fn settings_for(args: &Args) -> Result<Settings> {
    let mut settings = Settings::from_env()?;
    if let Some(kind) = args.backend {
        settings.backend.switch_kind(kind);
    }
    if let Some(model) = &args.model {
        settings.backend.model = model.clone();
    }
    if let Some(dir) = &args.data_dir {
        settings.data_dir = dir.clone();
    }
    if let Some(source) = &args.schema_source {
        settings.schema_source = source.clone();
    }
    if let Some(path) = &args.sqlite {
        settings.sqlite_path = Some(path.clone());
    }
    Ok(settings)
}

fn open_store(settings: &Settings) -> Result<Arc<SchemaStore>> {
    let store = SchemaStore::open(
        &settings.data_dir,
        &settings.schema_source,
        settings.analysis_source.as_deref(),
    )
    .with_context(|| format!("Failed to open schema store in {}", settings.data_dir.display()))?;
    Ok(Arc::new(store))
}

fn build_pipeline(settings: &Settings) -> Result<QueryPipeline> {
    let store = open_store(settings)?;
    let generator = SqlGenerator::from_settings(store.clone(), &settings.backend)?;
    let mut pipeline = QueryPipeline::new(store, generator, settings);
    if let Some(path) = &settings.sqlite_path {
        let executor = SqliteExecutor::open(path, &settings.schema_prefix)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        pipeline = pipeline.with_executor(Arc::new(executor));
    }
    Ok(pipeline)
}

fn print_response(response: &PipelineResponse) {
    println!("\n=== Query Analysis ===");
    println!("Intent: {}", response.query_analysis.intent.as_str());
    println!("Type: {}", response.query_analysis.query_type.as_str());
    println!("Keywords: {}", response.query_analysis.keywords.join(", "));

    println!("\n=== Selected Views ===");
    for view in &response.view_selection.views {
        println!("  {} ({:.2})", view.name, view.score);
    }
    println!("Reasoning: {}", response.view_selection.reasoning);

    println!("\n=== Generated SQL ({}) ===", response.generated_sql.backend);
    if response.final_sql.is_empty() {
        println!("(none)");
    } else {
        println!("{}", response.final_sql);
    }
    println!("{}", response.generated_sql.explanation);

    println!("\n=== Validation ===");
    println!("{}", response.validation_report.render());

    println!("\n=== Recommendations ===");
    for recommendation in &response.recommendations {
        println!("  - {}", recommendation);
    }
    println!(
        "\nContext: ~{}KB across {} views",
        response.context_usage.total_estimated_kb, response.context_usage.views_used
    );
}

fn print_executed(executed: &ExecutedResponse) {
    print_response(&executed.response);

    println!("\n=== Execution ===");
    let execution = &executed.execution;
    if !execution.executed {
        println!(
            "Not executed: {}",
            execution.reason.as_deref().unwrap_or("unknown reason")
        );
        return;
    }
    println!("{}", execution.columns.join(" | "));
    for row in &execution.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
    let suffix = if execution.truncated { " (truncated)" } else { "" };
    println!("{} rows{}", execution.rows_returned, suffix);
}
