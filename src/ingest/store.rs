//! PostgreSQL implementation of the ingestion seams.

use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::diesel_runtime::{Database, DbConnection, StoreError};
use crate::ingest::batch::{Batch, BatchSink};
use crate::ingest::guard::{IngestProgress, IngestionLedger};
use crate::models::IngestionState;
use crate::schema::{ingestion_state, video_snapshots, videos};

// Postgres caps a single statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;
const VIDEO_COLUMNS: usize = 9;
const SNAPSHOT_COLUMNS: usize = 12;

/// Batch sink and ledger backed by the shared connection pool.
///
/// Each call checks out its own connection and returns it when done.
#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn upsert_marker(conn: &mut DbConnection, state: &IngestionState) -> QueryResult<usize> {
    use crate::schema::ingestion_state::dsl::*;

    diesel::insert_into(ingestion_state)
        .values(state)
        .on_conflict(source)
        .do_update()
        .set((
            videos_committed.eq(excluded(videos_committed)),
            completed.eq(excluded(completed)),
            updated_at.eq(excluded(updated_at)),
        ))
        .execute(conn)
}

impl BatchSink for PgStore {
    fn write_batch(&mut self, source: &str, batch: &Batch) -> Result<(), StoreError> {
        let mut conn = self.db.get_connection()?;
        let marker = IngestionState {
            source: source.to_string(),
            videos_committed: batch.videos_committed as i64,
            completed: false,
            updated_at: Utc::now().naive_utc(),
        };

        // Videos go first so every snapshot's foreign key resolves.
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            for chunk in batch.videos.chunks(MAX_BIND_PARAMS / VIDEO_COLUMNS) {
                diesel::insert_into(videos::table).values(chunk).execute(conn)?;
            }
            for chunk in batch.snapshots.chunks(MAX_BIND_PARAMS / SNAPSHOT_COLUMNS) {
                diesel::insert_into(video_snapshots::table)
                    .values(chunk)
                    .execute(conn)?;
            }
            upsert_marker(conn, &marker)?;
            Ok(())
        })?;

        Ok(())
    }
}

impl IngestionLedger for PgStore {
    fn video_count(&mut self) -> Result<u64, StoreError> {
        let mut conn = self.db.get_connection()?;
        let count: i64 = videos::table.count().get_result(&mut conn)?;
        Ok(count as u64)
    }

    fn progress(&mut self, source: &str) -> Result<Option<IngestProgress>, StoreError> {
        let mut conn = self.db.get_connection()?;
        let state = ingestion_state::table
            .find(source)
            .select(IngestionState::as_select())
            .first(&mut conn)
            .optional()?;

        Ok(state.map(|s| IngestProgress {
            videos_committed: s.videos_committed.max(0) as u64,
            completed: s.completed,
        }))
    }

    fn mark_complete(&mut self, source: &str, videos_committed: u64) -> Result<(), StoreError> {
        let mut conn = self.db.get_connection()?;
        let marker = IngestionState {
            source: source.to_string(),
            videos_committed: videos_committed as i64,
            completed: true,
            updated_at: Utc::now().naive_utc(),
        };
        upsert_marker(&mut conn, &marker)?;
        Ok(())
    }
}
