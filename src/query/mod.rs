//! Natural-language question answering.
//!
//! A question is translated to SQL by a language model
//! ([`SqlTranslator`]), cleaned up ([`sanitize_sql`]), run read-only for one
//! scalar ([`ScalarExecutor`]) and rendered as text ([`format_scalar`]).
//! [`QueryPipeline`] strings the steps together and maps each failure to a
//! fixed user-facing reply.

pub mod executor;
pub mod format;
pub mod pipeline;
pub mod sanitize;
pub mod translator;

use std::fmt;

use crate::diesel_runtime::StoreError;

pub use executor::{validate_statement, ExecutorLimits, PgExecutor, ScalarExecutor};
pub use format::format_scalar;
pub use pipeline::{QueryPipeline, ReplyMessages};
pub use sanitize::sanitize_sql;
pub use translator::{
    InstructionTemplate, MistralTranslator, SqlTranslator, TranslateError, TranslatorConfig,
};

/// Error type for executing a generated statement
#[derive(Debug)]
pub enum QueryError {
    /// The statement is not a single read-only query
    Rejected(String),
    /// The planner expects the statement to scan too many rows
    ScanLimit { estimated: f64, limit: u64 },
    Store(StoreError),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Rejected(reason) => write!(f, "Statement rejected: {}", reason),
            QueryError::ScanLimit { estimated, limit } => write!(
                f,
                "Statement would scan about {:.0} rows (limit {})",
                estimated, limit
            ),
            QueryError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<StoreError> for QueryError {
    fn from(e: StoreError) -> Self {
        QueryError::Store(e)
    }
}

impl From<diesel::result::Error> for QueryError {
    fn from(e: diesel::result::Error) -> Self {
        QueryError::Store(StoreError::Database(e))
    }
}
