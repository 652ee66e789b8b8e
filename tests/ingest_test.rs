//! Integration tests for the guarded ingestion run

mod common;

use common::{video_json, write_document, write_export, MemoryStore};
use serde_json::json;
use tempfile::TempDir;
use vidstat::ingest::{
    run_ingestion, IngestError, IngestOptions, IngestOutcome, IngestProgress, MissingSource,
    SkipReason,
};

fn options(path: &std::path::Path, batch_size: usize) -> IngestOptions {
    IngestOptions {
        batch_size,
        ..IngestOptions::new(path)
    }
}

fn expected_snapshots(videos: usize) -> usize {
    (0..videos).map(|i| i % 4).sum()
}

#[test]
fn test_single_video_with_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = write_document(
        dir.path(),
        vec![json!({
            "id": "v1",
            "creator_id": "c1",
            "video_created_at": "2024-01-01T00:00:00",
            "views_count": 0,
            "likes_count": 0,
            "comments_count": 0,
            "reports_count": 0,
            "snapshots": [{
                "id": "s1",
                "video_id": "v1",
                "views_count": 0,
                "likes_count": 0,
                "comments_count": 0,
                "reports_count": 0,
                "delta_views_count": 0,
                "delta_likes_count": 0,
                "delta_comments_count": 0,
                "delta_reports_count": 0,
                "created_at": "2024-01-02T00:00:00"
            }]
        })],
    );

    let mut store = MemoryStore::new();
    let outcome = run_ingestion(&mut store, &IngestOptions::new(&path)).unwrap();

    let IngestOutcome::Completed(stats) = outcome else {
        panic!("expected a completed load");
    };
    assert_eq!(stats.videos, 1);
    assert_eq!(stats.snapshots, 1);
    assert_eq!(store.videos.len(), 1);
    assert_eq!(store.snapshots.len(), 1);
    assert_eq!(store.videos[0].id, "v1");
    assert_eq!(store.videos[0].creator_id, "c1");
    assert_eq!(store.snapshots[0].id, "s1");
    assert_eq!(store.snapshots[0].video_id, "v1");
    assert_eq!(
        store.markers.get(&path.display().to_string()),
        Some(&IngestProgress {
            videos_committed: 1,
            completed: true
        })
    );
}

#[test]
fn test_grouping_around_batch_threshold() {
    for count in [999usize, 1000, 1001] {
        let dir = TempDir::new().unwrap();
        let path = write_export(dir.path(), count);

        let mut store = MemoryStore::new();
        let outcome = run_ingestion(&mut store, &options(&path, 1000)).unwrap();

        let IngestOutcome::Completed(stats) = outcome else {
            panic!("expected a completed load for {} videos", count);
        };
        assert_eq!(stats.videos as usize, count);
        assert_eq!(stats.snapshots as usize, expected_snapshots(count));
        assert_eq!(stats.batches as usize, count.div_ceil(1000));
        assert_eq!(store.videos.len(), count);
        assert_eq!(store.snapshots.len(), expected_snapshots(count));
        assert_eq!(store.orphan_snapshots(), 0, "orphans for {} videos", count);
    }
}

#[test]
fn test_observer_sees_only_whole_batches() {
    let dir = TempDir::new().unwrap();
    let path = write_export(dir.path(), 2300);

    let mut store = MemoryStore::new();
    run_ingestion(&mut store, &options(&path, 1000)).unwrap();

    let visible_videos: Vec<usize> = store.observed.iter().map(|(v, _)| *v).collect();
    assert_eq!(visible_videos, vec![1000, 2000, 2300]);

    let visible_snapshots: Vec<usize> = store.observed.iter().map(|(_, s)| *s).collect();
    assert_eq!(
        visible_snapshots,
        vec![
            expected_snapshots(1000),
            expected_snapshots(2000),
            expected_snapshots(2300)
        ]
    );
}

#[test]
fn test_failed_batch_keeps_earlier_batches() {
    let dir = TempDir::new().unwrap();
    let path = write_export(dir.path(), 2500);

    let mut store = MemoryStore::failing_on(2);
    let err = run_ingestion(&mut store, &options(&path, 1000)).unwrap_err();

    assert!(matches!(err, IngestError::Store(_)));
    assert_eq!(store.videos.len(), 1000);
    assert_eq!(store.snapshots.len(), expected_snapshots(1000));
    assert_eq!(store.orphan_snapshots(), 0);
    // The failed batch was the last write attempt.
    assert_eq!(store.write_calls, 2);
    assert_eq!(
        store.markers.get(&path.display().to_string()),
        Some(&IngestProgress {
            videos_committed: 1000,
            completed: false
        })
    );
}

#[test]
fn test_resume_loads_exactly_the_missing_videos() {
    let dir = TempDir::new().unwrap();
    let path = write_export(dir.path(), 2500);

    let mut store = MemoryStore::failing_on(2);
    assert!(run_ingestion(&mut store, &options(&path, 1000)).is_err());

    store.fail_on_batch = None;
    let outcome = run_ingestion(&mut store, &options(&path, 1000)).unwrap();

    let IngestOutcome::Completed(stats) = outcome else {
        panic!("expected the resumed load to complete");
    };
    assert_eq!(stats.videos, 1500);
    assert_eq!(stats.videos_committed, 2500);
    assert_eq!(store.videos.len(), 2500);
    assert_eq!(store.snapshots.len(), expected_snapshots(2500));
    assert_eq!(store.orphan_snapshots(), 0);

    let expected: Vec<String> = (0..2500).map(|i| format!("v{}", i)).collect();
    assert_eq!(store.video_ids(), expected);
}

#[test]
fn test_second_run_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write_export(dir.path(), 10);

    let mut store = MemoryStore::new();
    run_ingestion(&mut store, &IngestOptions::new(&path)).unwrap();
    let writes = store.write_calls;

    let outcome = run_ingestion(&mut store, &IngestOptions::new(&path)).unwrap();
    assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::AlreadyLoaded));
    assert_eq!(store.write_calls, writes);
    assert_eq!(store.videos.len(), 10);
}

#[test]
fn test_populated_store_without_marker_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write_export(dir.path(), 3);

    let mut store = MemoryStore::new();
    run_ingestion(&mut store, &IngestOptions::new(&path)).unwrap();
    store.markers.clear();
    let writes = store.write_calls;

    let outcome = run_ingestion(&mut store, &IngestOptions::new(&path)).unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Skipped(SkipReason::StoreNotEmpty { videos: 3 })
    );
    assert_eq!(store.write_calls, writes);
}

#[test]
fn test_absent_counts_are_zero() {
    let dir = TempDir::new().unwrap();
    let path = write_document(
        dir.path(),
        vec![json!({
            "id": "v1",
            "creator_id": "c1",
            "video_created_at": "2025-11-26 08:30:00",
            "likes_count": null,
            "snapshots": [{"id": "s1", "created_at": "2025-11-28T10:00:00"}]
        })],
    );

    let mut store = MemoryStore::new();
    run_ingestion(&mut store, &IngestOptions::new(&path)).unwrap();

    let video = &store.videos[0];
    assert_eq!(
        (video.views_count, video.likes_count, video.comments_count, video.reports_count),
        (0, 0, 0, 0)
    );
    let snapshot = &store.snapshots[0];
    assert_eq!(snapshot.video_id, "v1");
    assert_eq!(
        (
            snapshot.views_count,
            snapshot.delta_views_count,
            snapshot.delta_likes_count,
            snapshot.delta_reports_count
        ),
        (0, 0, 0, 0)
    );
}

#[test]
fn test_missing_source_is_skipped_by_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");

    let mut store = MemoryStore::new();
    let outcome = run_ingestion(&mut store, &IngestOptions::new(&path)).unwrap();

    assert_eq!(outcome, IngestOutcome::SourceMissing(path));
    assert_eq!(store.write_calls, 0);
    assert!(store.markers.is_empty());
}

#[test]
fn test_missing_source_can_fail_the_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");

    let mut store = MemoryStore::new();
    let options = IngestOptions {
        missing_source: MissingSource::Fail,
        ..IngestOptions::new(&path)
    };
    let err = run_ingestion(&mut store, &options).unwrap_err();

    assert!(matches!(err, IngestError::SourceMissing(p) if p == path));
}

#[test]
fn test_malformed_timestamp_aborts_after_committed_batches() {
    let dir = TempDir::new().unwrap();
    let mut videos: Vec<_> = (0..1500).map(|i| video_json(i, 1)).collect();
    videos[1200]["video_created_at"] = json!("28 ноября");
    let path = write_document(dir.path(), videos);

    let mut store = MemoryStore::new();
    let err = run_ingestion(&mut store, &options(&path, 1000)).unwrap_err();

    match err {
        IngestError::InvalidRecord { index, field, .. } => {
            assert_eq!(index, 1200);
            assert_eq!(field, "video_created_at");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(store.videos.len(), 1000);
    assert_eq!(store.snapshots.len(), 1000);
    assert!(!store.markers[&path.display().to_string()].completed);
}

#[test]
fn test_truncated_document_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("videos.json");
    let mut text =
        serde_json::to_string(&json!({"videos": [video_json(0, 2), video_json(1, 2)]})).unwrap();
    text.truncate(text.len() - 20);
    std::fs::write(&path, text).unwrap();

    let mut store = MemoryStore::new();
    let err = run_ingestion(&mut store, &IngestOptions::new(&path)).unwrap_err();

    assert!(matches!(err, IngestError::Parse(_)));
    assert_eq!(store.write_calls, 0);
}
