//! Startup guard: decide whether a source needs loading.

use std::fmt;

use crate::diesel_runtime::StoreError;

/// Marker state recorded for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestProgress {
    pub videos_committed: u64,
    pub completed: bool,
}

/// Read/write access to the ingestion marker and the video count.
pub trait IngestionLedger {
    fn video_count(&mut self) -> Result<u64, StoreError>;

    fn progress(&mut self, source: &str) -> Result<Option<IngestProgress>, StoreError>;

    fn mark_complete(&mut self, source: &str, videos_committed: u64) -> Result<(), StoreError>;
}

impl<L: IngestionLedger + ?Sized> IngestionLedger for &mut L {
    fn video_count(&mut self) -> Result<u64, StoreError> {
        (**self).video_count()
    }

    fn progress(&mut self, source: &str) -> Result<Option<IngestProgress>, StoreError> {
        (**self).progress(source)
    }

    fn mark_complete(&mut self, source: &str, videos_committed: u64) -> Result<(), StoreError> {
        (**self).mark_complete(source, videos_committed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The marker says this source finished loading
    AlreadyLoaded,
    /// No marker, but the store already holds videos
    StoreNotEmpty { videos: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyLoaded => write!(f, "source already loaded"),
            SkipReason::StoreNotEmpty { videos } => {
                write!(f, "store already holds {} videos", videos)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Fresh,
    Resume { skip: u64 },
    Skip(SkipReason),
}

pub fn decide<L: IngestionLedger>(ledger: &mut L, source: &str) -> Result<GuardDecision, StoreError> {
    if let Some(progress) = ledger.progress(source)? {
        return Ok(if progress.completed {
            GuardDecision::Skip(SkipReason::AlreadyLoaded)
        } else {
            GuardDecision::Resume {
                skip: progress.videos_committed,
            }
        });
    }

    match ledger.video_count()? {
        0 => Ok(GuardDecision::Fresh),
        videos => Ok(GuardDecision::Skip(SkipReason::StoreNotEmpty { videos })),
    }
}
