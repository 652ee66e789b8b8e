//! Fixed-threshold batching of video records.

use tracing::{debug, info};

use crate::diesel_runtime::StoreError;
use crate::models::{Snapshot, Video, VideoRecord};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Videos and snapshots written together in one transaction.
///
/// A video's snapshots are always in the same batch as the video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub videos: Vec<Video>,
    pub snapshots: Vec<Snapshot>,
    /// Source videos committed once this batch lands, counting earlier batches
    /// and any prefix skipped on resume.
    pub videos_committed: u64,
}

impl Batch {
    pub fn push(&mut self, record: VideoRecord) {
        self.videos.push(record.video);
        self.snapshots.extend(record.snapshots);
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

/// Destination for committed batches.
pub trait BatchSink {
    /// Write every row of `batch` and advance the marker for `source`,
    /// atomically. On error nothing from the batch is visible.
    fn write_batch(&mut self, source: &str, batch: &Batch) -> Result<(), StoreError>;
}

impl<S: BatchSink + ?Sized> BatchSink for &mut S {
    fn write_batch(&mut self, source: &str, batch: &Batch) -> Result<(), StoreError> {
        (**self).write_batch(source, batch)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub batches: u64,
    pub videos: u64,
    pub snapshots: u64,
    pub videos_committed: u64,
}

/// Accumulates records and flushes a [`Batch`] whenever the threshold is hit.
pub struct BatchWriter<S> {
    sink: S,
    source: String,
    threshold: usize,
    pending: Batch,
    stats: IngestStats,
}

impl<S: BatchSink> BatchWriter<S> {
    pub fn new(sink: S, source: impl Into<String>, threshold: usize) -> Self {
        Self {
            sink,
            source: source.into(),
            threshold: threshold.max(1),
            pending: Batch::default(),
            stats: IngestStats::default(),
        }
    }

    /// Start counting from `offset` already-committed source videos.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.stats.videos_committed = offset;
        self
    }

    pub fn push(&mut self, record: VideoRecord) -> Result<(), StoreError> {
        self.pending.push(record);
        if self.pending.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush the remainder and return what was written.
    pub fn finish(mut self) -> Result<IngestStats, StoreError> {
        self.flush()?;
        Ok(self.stats)
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let videos = self.pending.videos.len() as u64;
        let snapshots = self.pending.snapshots.len() as u64;
        self.pending.videos_committed = self.stats.videos_committed + videos;

        debug!(
            "Flushing batch {} for {} ({} videos)",
            self.stats.batches + 1,
            self.source,
            videos
        );
        self.sink.write_batch(&self.source, &self.pending)?;

        self.stats.batches += 1;
        self.stats.videos += videos;
        self.stats.snapshots += snapshots;
        self.stats.videos_committed = self.pending.videos_committed;
        self.pending = Batch::default();

        info!("Inserted {} videos and {} snapshots", videos, snapshots);
        Ok(())
    }
}
