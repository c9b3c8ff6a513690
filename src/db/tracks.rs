//! Track store: per-batch processing state, keyed by `(batch_id, path)`.
//!
//! Powers save-as-you-go persistence and resume-on-restart: tracks whose
//! stored state is terminal are skipped when the same batch id runs again.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use sqlx::SqlitePool;

use crate::model::{MatchCandidate, ProcessingState, Track};

/// Data access for track processing state.
#[derive(Clone)]
pub struct TrackStore {
    pool: SqlitePool,
}

impl TrackStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update a track's persisted state.
    pub async fn save(&self, batch_id: &str, track: &Track) -> sqlx::Result<()> {
        let chosen_json = track
            .chosen_candidate()
            .and_then(|c| serde_json::to_string(c).ok());
        let dest = track
            .dest_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        sqlx::query(
            r#"
            INSERT INTO tracks (batch_id, path, state, error, chosen_candidate_json, dest_path, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(batch_id, path) DO UPDATE SET
                state = excluded.state,
                error = excluded.error,
                chosen_candidate_json = excluded.chosen_candidate_json,
                dest_path = excluded.dest_path,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(batch_id)
        .bind(track.source_path.to_string_lossy().as_ref())
        .bind(track.state.as_str())
        .bind(&track.error)
        .bind(chosen_json)
        .bind(dest)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Paths already in a terminal state for this batch (resume filter).
    pub async fn terminal_paths(&self, batch_id: &str) -> sqlx::Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT path FROM tracks
            WHERE batch_id = ?
              AND state IN ('applied', 'queued_for_review', 'unmatched', 'failed', 'skipped')
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    /// Stored state for one path, if any.
    pub async fn get_state(
        &self,
        batch_id: &str,
        path: &Path,
    ) -> sqlx::Result<Option<ProcessingState>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT state FROM tracks WHERE batch_id = ? AND path = ?")
                .bind(batch_id)
                .bind(path.to_string_lossy().as_ref())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(s,)| ProcessingState::parse(&s)))
    }

    /// The chosen candidate persisted for one path, if any.
    pub async fn get_chosen(
        &self,
        batch_id: &str,
        path: &Path,
    ) -> sqlx::Result<Option<MatchCandidate>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT chosen_candidate_json FROM tracks WHERE batch_id = ? AND path = ?",
        )
        .bind(batch_id)
        .bind(path.to_string_lossy().as_ref())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .and_then(|(json,)| json)
            .and_then(|json| serde_json::from_str(&json).ok()))
    }

    /// Counts of tracks by state for a batch.
    pub async fn counts_by_state(&self, batch_id: &str) -> sqlx::Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT state, COUNT(*) FROM tracks WHERE batch_id = ? GROUP BY state",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}
