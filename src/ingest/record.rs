//! Source-document shapes and their conversion into store rows.
//!
//! Elements are deserialized loosely (every field optional) and validated in
//! [`RawVideo::into_record`], so a bad element is reported with its position
//! and field name instead of a bare serde message.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::ingest::IngestError;
use crate::models::{Snapshot, Video, VideoRecord};

/// Identifier as it appears in the export: a string or a bare number.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SourceId {
    Text(String),
    Number(serde_json::Number),
}

impl SourceId {
    pub fn into_string(self) -> String {
        match self {
            SourceId::Text(s) => s,
            SourceId::Number(n) => n.to_string(),
        }
    }
}

/// One element of the top-level `videos` array.
#[derive(Debug, Clone, Deserialize)]
pub struct RawVideo {
    pub id: Option<SourceId>,
    pub creator_id: Option<SourceId>,
    pub video_created_at: Option<String>,
    pub views_count: Option<i64>,
    pub likes_count: Option<i64>,
    pub comments_count: Option<i64>,
    pub reports_count: Option<i64>,
    pub snapshots: Option<Vec<RawSnapshot>>,
}

/// One element of a video's `snapshots` array.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSnapshot {
    pub id: Option<SourceId>,
    pub video_id: Option<SourceId>,
    pub views_count: Option<i64>,
    pub likes_count: Option<i64>,
    pub comments_count: Option<i64>,
    pub reports_count: Option<i64>,
    pub delta_views_count: Option<i64>,
    pub delta_likes_count: Option<i64>,
    pub delta_comments_count: Option<i64>,
    pub delta_reports_count: Option<i64>,
    pub created_at: Option<String>,
}

impl RawVideo {
    /// Validate and convert into a [`VideoRecord`].
    ///
    /// `index` is the element's position in the source array (for error
    /// messages); `now` stamps `created_at`/`updated_at`.
    pub fn into_record(self, index: u64, now: NaiveDateTime) -> Result<VideoRecord, IngestError> {
        let id = required_id(index, "id", self.id)?;
        let creator_id = required_id(index, "creator_id", self.creator_id)?;
        let video_created_at =
            required_timestamp(index, "video_created_at", self.video_created_at.as_deref())?;

        let snapshots = self
            .snapshots
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(position, snapshot)| snapshot.into_snapshot(index, position, &id, now))
            .collect::<Result<Vec<_>, _>>()?;

        let video = Video {
            id,
            creator_id,
            video_created_at,
            views_count: count(index, "views_count", self.views_count)?,
            likes_count: count(index, "likes_count", self.likes_count)?,
            comments_count: count(index, "comments_count", self.comments_count)?,
            reports_count: count(index, "reports_count", self.reports_count)?,
            created_at: now,
            updated_at: now,
        };

        Ok(VideoRecord { video, snapshots })
    }
}

impl RawSnapshot {
    fn into_snapshot(
        self,
        index: u64,
        position: usize,
        parent_id: &str,
        now: NaiveDateTime,
    ) -> Result<Snapshot, IngestError> {
        let field = |name: &str| format!("snapshots[{}].{}", position, name);

        let id = required_id(index, &field("id"), self.id)?;

        // A snapshot always travels with its enclosing video; pointing it at
        // another video would break the per-batch foreign key.
        let video_id = match self.video_id.map(SourceId::into_string) {
            None => parent_id.to_string(),
            Some(video_id) if video_id == parent_id => video_id,
            Some(video_id) => {
                return Err(IngestError::invalid(
                    index,
                    field("video_id"),
                    format!("references '{}' but is nested under '{}'", video_id, parent_id),
                ))
            }
        };

        let created_at = required_timestamp(index, &field("created_at"), self.created_at.as_deref())?;

        Ok(Snapshot {
            id,
            video_id,
            views_count: count(index, &field("views_count"), self.views_count)?,
            likes_count: count(index, &field("likes_count"), self.likes_count)?,
            comments_count: count(index, &field("comments_count"), self.comments_count)?,
            reports_count: count(index, &field("reports_count"), self.reports_count)?,
            delta_views_count: self.delta_views_count.unwrap_or(0),
            delta_likes_count: self.delta_likes_count.unwrap_or(0),
            delta_comments_count: self.delta_comments_count.unwrap_or(0),
            delta_reports_count: self.delta_reports_count.unwrap_or(0),
            created_at,
            updated_at: now,
        })
    }
}

fn required_id(index: u64, field: &str, value: Option<SourceId>) -> Result<String, IngestError> {
    value
        .map(SourceId::into_string)
        .ok_or_else(|| IngestError::invalid(index, field, "missing"))
}

fn required_timestamp(
    index: u64,
    field: &str,
    value: Option<&str>,
) -> Result<NaiveDateTime, IngestError> {
    let value = value.ok_or_else(|| IngestError::invalid(index, field, "missing"))?;
    parse_timestamp(value).map_err(|reason| IngestError::invalid(index, field, reason))
}

fn count(index: u64, field: &str, value: Option<i64>) -> Result<i64, IngestError> {
    match value.unwrap_or(0) {
        n if n < 0 => Err(IngestError::invalid(index, field, format!("negative count {}", n))),
        n => Ok(n),
    }
}

/// Parse an ISO-8601 timestamp into naive UTC.
///
/// Accepts `T` or space as the date/time separator, optional fractional
/// seconds, an optional offset (`Z`, `+03:00`, `+0300`) and a bare date.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, String> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_utc());
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%.f%z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt.naive_utc());
        }
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("not an ISO-8601 timestamp: '{}'", value))
}
