//! Guarded ingestion run: guard, stream, batch, mark complete.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::diesel_runtime::{Database, StoreError};
use crate::ingest::batch::{BatchSink, BatchWriter, IngestStats, DEFAULT_BATCH_SIZE};
use crate::ingest::guard::{self, GuardDecision, IngestionLedger, SkipReason};
use crate::ingest::reader::VideoReader;
use crate::ingest::store::PgStore;
use crate::ingest::IngestError;

/// What to do when the source document does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingSource {
    /// Log an error and report [`IngestOutcome::SourceMissing`]
    #[default]
    Skip,
    /// Fail the run with [`IngestError::SourceMissing`]
    Fail,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub source: PathBuf,
    pub batch_size: usize,
    pub missing_source: MissingSource,
}

impl IngestOptions {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            missing_source: MissingSource::default(),
        }
    }

    /// Key under which progress for this source is recorded.
    pub fn source_key(&self) -> String {
        self.source.display().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Completed(IngestStats),
    Skipped(SkipReason),
    SourceMissing(PathBuf),
}

/// Load `options.source` into `store` unless the guard says otherwise.
///
/// Blocking. Batches committed before an error stay committed and the marker
/// records how far the run got, so the next run resumes after them.
pub fn run_ingestion<S>(store: &mut S, options: &IngestOptions) -> Result<IngestOutcome, IngestError>
where
    S: BatchSink + IngestionLedger,
{
    let result = ingest(store, options);
    if let Err(e) = &result {
        error!("Ingestion of {} failed: {}", options.source.display(), e);
    }
    result
}

fn ingest<S>(store: &mut S, options: &IngestOptions) -> Result<IngestOutcome, IngestError>
where
    S: BatchSink + IngestionLedger,
{
    let source = options.source_key();

    let skip = match guard::decide(&mut *store, &source)? {
        GuardDecision::Skip(reason) => {
            info!("Skipping ingestion of {}: {}", source, reason);
            return Ok(IngestOutcome::Skipped(reason));
        }
        GuardDecision::Fresh => 0,
        GuardDecision::Resume { skip } => {
            info!("Resuming ingestion of {} after {} committed videos", source, skip);
            skip
        }
    };

    let mut reader = match VideoReader::open(&options.source) {
        Ok(reader) => reader,
        Err(IngestError::SourceMissing(path)) if options.missing_source == MissingSource::Skip => {
            error!("Source file {} not found, nothing loaded", path.display());
            return Ok(IngestOutcome::SourceMissing(path));
        }
        Err(e) => return Err(e),
    };

    info!("Starting ingestion from {}", source);

    let skipped = reader.skip_committed(skip)?;
    if skipped < skip {
        warn!(
            "Marker for {} records {} videos but the source only has {}",
            source, skip, skipped
        );
    }

    let mut writer =
        BatchWriter::new(&mut *store, source.as_str(), options.batch_size).with_offset(skipped);
    for record in reader {
        writer.push(record?)?;
    }
    let stats = writer.finish()?;

    store.mark_complete(&source, stats.videos_committed)?;
    info!(
        "Ingestion of {} complete: {} videos and {} snapshots in {} batches",
        source, stats.videos, stats.snapshots, stats.batches
    );

    Ok(IngestOutcome::Completed(stats))
}

/// Run the guarded ingestion against PostgreSQL on the blocking pool.
pub async fn load_if_needed(db: Database, options: IngestOptions) -> Result<IngestOutcome, IngestError> {
    tokio::task::spawn_blocking(move || {
        let mut store = PgStore::new(db);
        run_ingestion(&mut store, &options)
    })
    .await
    .map_err(|e| IngestError::Store(StoreError::from(e)))?
}
