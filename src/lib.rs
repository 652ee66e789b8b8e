//! # vidstat: natural-language analytics over video engagement data
//!
//! vidstat loads a JSON export of videos and their engagement snapshots into
//! PostgreSQL, then answers questions such as "Сколько всего видео?" by asking
//! a language model for SQL and running it read-only for a single number.
//!
//! ## Features
//!
//! - **Streaming ingestion**: the export is read element by element and
//!   written in atomic batches of videos with their snapshots
//! - **Resumable loads**: an ingestion marker records committed progress, so
//!   a failed load continues where it stopped
//! - **Guarded query execution**: generated SQL must parse as a single query
//!   and runs in a read-only transaction with a statement timeout
//! - **HTTP and CLI front ends**: `vidstat serve` and `vidstat ask`
//!
//! ## Example
//!
//! ```ignore
//! let db = Database::new("postgres://localhost/videos")?;
//! let outcome = load_if_needed(db.clone(), IngestOptions::new("data/videos.json")).await?;
//!
//! let pipeline = QueryPipeline::new(translator, PgExecutor::new(db, ExecutorLimits::default()));
//! let reply = pipeline.handle("Сколько всего видео?").await;
//! ```

pub mod config;
pub mod diesel_runtime;
pub mod ingest;
pub mod models;
pub mod query;
pub mod schema;
pub mod server;

// Re-export key types
pub use config::{AppConfig, ConfigError, Secret};
pub use diesel_runtime::{Database, DatabaseConfig, StoreError};
pub use ingest::{
    load_if_needed, run_ingestion, BatchSink, IngestError, IngestOptions, IngestOutcome,
    IngestStats, IngestionLedger, MissingSource, PgStore,
};
pub use models::{Snapshot, Video, VideoRecord};
pub use query::{
    ExecutorLimits, PgExecutor, QueryError, QueryPipeline, ReplyMessages, ScalarExecutor,
    SqlTranslator,
};
