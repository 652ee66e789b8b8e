//! Bulk ingestion of the JSON video export.
//!
//! The pipeline streams `{"videos": [...]}` element by element
//! ([`VideoReader`]), groups each video with its snapshots into batches
//! ([`BatchWriter`]) and commits every batch in one transaction through a
//! [`BatchSink`]. [`guard::decide`] runs first and decides whether the load
//! happens at all.

pub mod batch;
pub mod guard;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod store;

use std::fmt;
use std::path::PathBuf;

use crate::diesel_runtime::StoreError;

pub use batch::{Batch, BatchSink, BatchWriter, IngestStats, DEFAULT_BATCH_SIZE};
pub use guard::{GuardDecision, IngestProgress, IngestionLedger, SkipReason};
pub use pipeline::{load_if_needed, run_ingestion, IngestOptions, IngestOutcome, MissingSource};
pub use reader::VideoReader;
pub use store::PgStore;

/// Error type for an ingestion run. Any of these aborts the whole run.
#[derive(Debug)]
pub enum IngestError {
    Io(std::io::Error),
    /// The document is not valid JSON or an element has the wrong shape
    Parse(serde_json::Error),
    /// A video element parsed but one of its fields is unusable
    InvalidRecord {
        index: u64,
        field: String,
        reason: String,
    },
    SourceMissing(PathBuf),
    /// The reader thread died without reporting an error
    Reader(String),
    Store(StoreError),
}

impl IngestError {
    pub(crate) fn invalid(index: u64, field: impl Into<String>, reason: impl Into<String>) -> Self {
        IngestError::InvalidRecord {
            index,
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Io(e) => write!(f, "IO error: {}", e),
            IngestError::Parse(e) => write!(f, "Parse error: {}", e),
            IngestError::InvalidRecord { index, field, reason } => {
                write!(f, "Invalid video #{}: field '{}': {}", index, field, reason)
            }
            IngestError::SourceMissing(path) => {
                write!(f, "Source file {} not found", path.display())
            }
            IngestError::Reader(msg) => write!(f, "Reader failed: {}", msg),
            IngestError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Io(e)
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Parse(e)
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        IngestError::Store(e)
    }
}
