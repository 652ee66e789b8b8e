//! Shared fixtures: an in-memory store and export-file builders.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use vidstat::diesel_runtime::StoreError;
use vidstat::ingest::{Batch, BatchSink, IngestProgress, IngestionLedger};
use vidstat::models::{Snapshot, Video};

fn rollback() -> StoreError {
    StoreError::Database(diesel::result::Error::RollbackTransaction)
}

/// In-memory stand-in for PostgreSQL with the same batch semantics:
/// primary keys, the snapshot → video foreign key, and all-or-nothing writes.
#[derive(Default)]
pub struct MemoryStore {
    pub videos: Vec<Video>,
    pub snapshots: Vec<Snapshot>,
    pub markers: HashMap<String, IngestProgress>,
    /// 1-based `write_batch` call that fails
    pub fail_on_batch: Option<usize>,
    /// (videos, snapshots) visible after each committed batch
    pub observed: Vec<(usize, usize)>,
    pub write_calls: usize,
    pub count_queries: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(batch: usize) -> Self {
        Self {
            fail_on_batch: Some(batch),
            ..Self::default()
        }
    }

    pub fn video_ids(&self) -> Vec<&str> {
        self.videos.iter().map(|v| v.id.as_str()).collect()
    }

    pub fn orphan_snapshots(&self) -> usize {
        let ids: HashSet<&str> = self.videos.iter().map(|v| v.id.as_str()).collect();
        self.snapshots
            .iter()
            .filter(|s| !ids.contains(s.video_id.as_str()))
            .count()
    }
}

impl BatchSink for MemoryStore {
    fn write_batch(&mut self, source: &str, batch: &Batch) -> Result<(), StoreError> {
        self.write_calls += 1;
        if self.fail_on_batch == Some(self.write_calls) {
            return Err(rollback());
        }

        let mut video_ids: HashSet<&str> = self.videos.iter().map(|v| v.id.as_str()).collect();
        for video in &batch.videos {
            if !video_ids.insert(video.id.as_str()) {
                return Err(rollback());
            }
        }

        let mut snapshot_ids: HashSet<&str> =
            self.snapshots.iter().map(|s| s.id.as_str()).collect();
        for snapshot in &batch.snapshots {
            if !video_ids.contains(snapshot.video_id.as_str())
                || !snapshot_ids.insert(snapshot.id.as_str())
            {
                return Err(rollback());
            }
        }

        self.videos.extend(batch.videos.iter().cloned());
        self.snapshots.extend(batch.snapshots.iter().cloned());
        self.markers.insert(
            source.to_string(),
            IngestProgress {
                videos_committed: batch.videos_committed,
                completed: false,
            },
        );
        self.observed.push((self.videos.len(), self.snapshots.len()));
        Ok(())
    }
}

impl IngestionLedger for MemoryStore {
    fn video_count(&mut self) -> Result<u64, StoreError> {
        self.count_queries += 1;
        Ok(self.videos.len() as u64)
    }

    fn progress(&mut self, source: &str) -> Result<Option<IngestProgress>, StoreError> {
        Ok(self.markers.get(source).copied())
    }

    fn mark_complete(&mut self, source: &str, videos_committed: u64) -> Result<(), StoreError> {
        self.markers.insert(
            source.to_string(),
            IngestProgress {
                videos_committed,
                completed: true,
            },
        );
        Ok(())
    }
}

/// A video element with `snapshots` nested snapshots.
pub fn video_json(index: usize, snapshots: usize) -> Value {
    let id = format!("v{}", index);
    let snapshots: Vec<Value> = (0..snapshots)
        .map(|n| {
            json!({
                "id": format!("{}-s{}", id, n),
                "video_id": id,
                "views_count": 10 * (n + 1),
                "likes_count": n,
                "comments_count": 0,
                "reports_count": 0,
                "delta_views_count": 10,
                "delta_likes_count": 1,
                "delta_comments_count": 0,
                "delta_reports_count": 0,
                "created_at": "2025-11-28T10:00:00.000000+00:00"
            })
        })
        .collect();

    json!({
        "id": id,
        "creator_id": format!("creator{}", index % 7),
        "video_created_at": "2025-11-26T08:30:00+00:00",
        "views_count": 100 + index,
        "likes_count": 5,
        "comments_count": 1,
        "reports_count": 0,
        "snapshots": snapshots
    })
}

pub fn write_document(dir: &Path, videos: Vec<Value>) -> PathBuf {
    let path = dir.join("videos.json");
    let document = json!({ "videos": videos });
    std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();
    path
}

/// `count` videos, video `i` carrying `i % 4` snapshots.
pub fn write_export(dir: &Path, count: usize) -> PathBuf {
    write_document(dir, (0..count).map(|i| video_json(i, i % 4)).collect())
}
