//! vidstat CLI - load the video export and answer questions about it
//!
//! `serve` is the long-running service: it loads the export on first start
//! and then answers questions over HTTP.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use vidstat::config::AppConfig;
use vidstat::diesel_runtime::{ensure_tables, Database, StoreError};
use vidstat::ingest::{load_if_needed, IngestOutcome, MissingSource};
use vidstat::query::{MistralTranslator, PgExecutor, QueryPipeline};
use vidstat::server::{self, AppState};

#[derive(Parser)]
#[command(name = "vidstat")]
#[command(version, about = "Natural-language analytics over a video engagement dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the export if needed, then answer questions over HTTP
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load the export into the database and exit
    Ingest {
        /// Path to the JSON export (overrides DATA_JSON_PATH)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Fail instead of skipping when the export does not exist
        #[arg(long)]
        fail_on_missing: bool,
    },

    /// Answer a single question and print the reply
    Ask {
        /// The question, e.g. "Сколько всего видео?"
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Create the database tables and exit
    InitDb,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve { port } => serve(config, port).await,
        Commands::Ingest {
            source,
            fail_on_missing,
        } => ingest(config, source, fail_on_missing).await,
        Commands::Ask { question } => ask(config, question.join(" ")).await,
        Commands::InitDb => connect(&config).await.map(|_| ()),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

/// Open the pool and make sure the tables exist
async fn connect(config: &AppConfig) -> Result<Database, String> {
    let url = config.database_url.clone();
    let db_config = config.database.clone();

    tokio::task::spawn_blocking(move || -> Result<Database, StoreError> {
        let db = Database::new_with_config(url.expose(), db_config)?;
        let mut conn = db.get_connection()?;
        ensure_tables(&mut conn)?;
        Ok(db)
    })
    .await
    .map_err(|e| format!("Database setup task failed: {}", e))?
    .map_err(|e| format!("Failed to prepare database: {}", e))
}

fn pipeline(
    config: &AppConfig,
    db: &Database,
) -> Result<QueryPipeline<MistralTranslator, PgExecutor>, String> {
    let template = config.load_template().map_err(|e| e.to_string())?;
    let translator_config = config.translator_config().map_err(|e| e.to_string())?;
    let translator = MistralTranslator::new(translator_config, template)
        .map_err(|e| format!("Failed to build LLM client: {}", e))?;
    let executor = PgExecutor::new(db.clone(), config.query_limits);
    Ok(QueryPipeline::new(translator, executor))
}

async fn serve(config: AppConfig, port: Option<u16>) -> Result<(), String> {
    tracing::info!("Starting vidstat...");

    let db = connect(&config).await?;
    let pipeline = pipeline(&config, &db)?;

    // Questions are only accepted once the load attempt is over.
    match load_if_needed(db.clone(), config.ingest_options()).await {
        Ok(outcome) => log_outcome(&outcome),
        Err(e) => tracing::error!("Data load failed, serving existing data: {}", e),
    }

    let state = AppState {
        pipeline: Arc::new(pipeline),
        db,
    };
    server::serve(state, port.unwrap_or(config.port))
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    tracing::info!("Disconnected");
    Ok(())
}

async fn ingest(
    config: AppConfig,
    source: Option<PathBuf>,
    fail_on_missing: bool,
) -> Result<(), String> {
    let db = connect(&config).await?;

    let mut options = config.ingest_options();
    if let Some(source) = source {
        options.source = source;
    }
    if fail_on_missing {
        options.missing_source = MissingSource::Fail;
    }

    let outcome = load_if_needed(db, options)
        .await
        .map_err(|e| format!("Ingestion failed: {}", e))?;
    log_outcome(&outcome);
    Ok(())
}

async fn ask(config: AppConfig, question: String) -> Result<(), String> {
    let db = connect(&config).await?;
    let pipeline = pipeline(&config, &db)?;
    println!("{}", pipeline.handle(&question).await);
    Ok(())
}

fn log_outcome(outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Completed(stats) => tracing::info!(
            "Loaded {} videos and {} snapshots ({} batches)",
            stats.videos,
            stats.snapshots,
            stats.batches
        ),
        IngestOutcome::Skipped(reason) => tracing::info!("Data already loaded: {}", reason),
        IngestOutcome::SourceMissing(path) => {
            tracing::warn!("Nothing loaded: {} does not exist", path.display())
        }
    }
}
