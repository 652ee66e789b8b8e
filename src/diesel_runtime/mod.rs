//! Diesel ORM runtime infrastructure
//!
//! Connection pooling and table bootstrap shared by the ingestion pipeline and
//! the query executor.

pub mod database;

// Re-export key types
pub use database::{
    ensure_tables, Database, DatabaseConfig, DbConnection, Pool, PooledConnection, StoreError,
};
