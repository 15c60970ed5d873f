//! DataDeck command line: run the server or work with the local database
//! directly, without going through HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use datadeck_core::config::AppConfig;
use datadeck_core::parsers::{self, ParserConfig};
use datadeck_core::query::QueryGateway;
use datadeck_core::registry::TableRegistry;
use datadeck_core::summary::{SummaryEngine, SummaryMode};

#[derive(Parser)]
#[command(name = "datadeck", version, about = "Data explorer over an embedded DuckDB database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Load a data file into a table
    Ingest {
        /// CSV, TSV, JSON, Excel, or PDF file
        path: PathBuf,
        /// Table name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Run a SQL statement and print the result as JSON
    Query {
        sql: String,
    },
    /// List registered tables
    Tables,
    /// Summarize a table
    Summarize {
        table: String,
        /// overview, statistical, insights, or business
        #[arg(long, default_value = "overview")]
        mode: String,
        #[arg(long)]
        sample_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Serve => datadeck_server::serve(config).await,
        Commands::Ingest { path, name } => ingest(&config, &path, name),
        Commands::Query { sql } => {
            let gateway = QueryGateway::new(&config.db_path);
            let result = gateway.execute(&sql)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Tables => {
            let registry = TableRegistry::new(&config.db_path)?;
            for meta in registry.list()? {
                println!(
                    "{}\t{} rows\t{} columns\t{}",
                    meta.name, meta.row_count, meta.column_count, meta.source_file
                );
            }
            Ok(())
        }
        Commands::Summarize {
            table,
            mode,
            sample_size,
        } => {
            let mode: SummaryMode = mode.parse()?;
            let registry = Arc::new(TableRegistry::new(&config.db_path)?);
            let gateway = Arc::new(QueryGateway::new(&config.db_path));
            let llm = match &config.llm {
                Some(llm_config) => Some(datadeck_core::llm::backend_from_config(llm_config)?),
                None => None,
            };
            let engine = SummaryEngine::new(registry, gateway, llm);
            let outcome = engine.summarize(&table, mode, sample_size).await?;
            println!("[{}] {}", outcome.provider, outcome.summary);
            Ok(())
        }
    }
}

fn ingest(config: &AppConfig, path: &PathBuf, name: Option<String>) -> Result<()> {
    let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
        bail!("{} has no file extension", path.display());
    };
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let parser_config = ParserConfig {
        max_file_bytes: config.max_upload_bytes,
        pdf_text_fallback: config.pdf_text_fallback,
    };
    let batch = parsers::parse(&bytes, extension, &parser_config)?;

    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let hint = name.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "uploaded_table".to_string())
    });

    let registry = TableRegistry::new(&config.db_path)?;
    let meta = registry.register(&hint, &file_name, &batch)?;
    println!(
        "loaded {} rows into table '{}' ({} columns)",
        meta.row_count, meta.name, meta.column_count
    );
    Ok(())
}
