//! Diesel models for the video dataset

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::*;

/// One content item with cumulative engagement counters.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = videos)]
pub struct Video {
    pub id: String,
    pub creator_id: String,
    pub video_created_at: NaiveDateTime,
    pub views_count: i64,
    pub likes_count: i64,
    pub comments_count: i64,
    pub reports_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A point-in-time measurement of a video's counters.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = video_snapshots)]
pub struct Snapshot {
    pub id: String,
    pub video_id: String,
    pub views_count: i64,
    pub likes_count: i64,
    pub comments_count: i64,
    pub reports_count: i64,
    pub delta_views_count: i64,
    pub delta_likes_count: i64,
    pub delta_comments_count: i64,
    pub delta_reports_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Per-source ingestion marker. `videos_committed` counts source videos whose
/// batch has committed; `completed` is set once the whole document is loaded.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = ingestion_state)]
pub struct IngestionState {
    pub source: String,
    pub videos_committed: i64,
    pub completed: bool,
    pub updated_at: NaiveDateTime,
}

/// A video together with every snapshot embedded under it in the source.
///
/// This is the unit the batch writer never splits.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub video: Video,
    pub snapshots: Vec<Snapshot>,
}
