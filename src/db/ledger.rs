//! Move ledger: durable append-only record of file operations.
//!
//! The ledger is the source of truth for rollback. Appends are serialized
//! through the single writer connection and ids are monotonic, so
//! reversing a batch in descending id order undoes operations in exactly
//! the reverse of the order they happened.

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;

/// Kind of mutation a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    TagOnly,
    Move,
    MoveWithTags,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TagOnly => "tag_only",
            Self::Move => "move",
            Self::MoveWithTags => "move_with_tags",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "tag_only" => Self::TagOnly,
            "move" => Self::Move,
            "move_with_tags" => Self::MoveWithTags,
            _ => return None,
        })
    }
}

/// Whether an entry can still be (or has been) reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalState {
    Reversible,
    Reversed,
    /// An intermediate file went missing; the entry can no longer be
    /// cleanly reversed.
    Broken,
}

impl ReversalState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reversible => "reversible",
            Self::Reversed => "reversed",
            Self::Broken => "broken",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "reversible" => Self::Reversible,
            "reversed" => Self::Reversed,
            "broken" => Self::Broken,
            _ => return None,
        })
    }
}

/// One ledger entry.
#[derive(Debug, Clone)]
pub struct MoveRecord {
    pub id: i64,
    pub batch_id: String,
    pub original_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub current_path: PathBuf,
    pub op_kind: OpKind,
    pub reversal: ReversalState,
}

#[derive(sqlx::FromRow)]
struct MoveRow {
    id: i64,
    batch_id: String,
    original_path: String,
    backup_path: Option<String>,
    current_path: String,
    op_kind: String,
    reversal: String,
}

impl MoveRow {
    fn into_record(self) -> MoveRecord {
        MoveRecord {
            id: self.id,
            batch_id: self.batch_id,
            original_path: PathBuf::from(self.original_path),
            backup_path: self.backup_path.map(PathBuf::from),
            current_path: PathBuf::from(self.current_path),
            op_kind: OpKind::parse(&self.op_kind).unwrap_or(OpKind::Move),
            reversal: ReversalState::parse(&self.reversal).unwrap_or(ReversalState::Broken),
        }
    }
}

const SELECT: &str =
    "SELECT id, batch_id, original_path, backup_path, current_path, op_kind, reversal FROM move_ledger";

/// Data access for the move ledger. The organizer is the only writer of
/// file-operation records, and it writes them through this interface.
#[derive(Clone)]
pub struct MoveLedger {
    pool: SqlitePool,
}

impl MoveLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a reversible record; returns it with its assigned id.
    pub async fn append(
        &self,
        batch_id: &str,
        original: &Path,
        backup: Option<&Path>,
        current: &Path,
        op_kind: OpKind,
    ) -> sqlx::Result<MoveRecord> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO move_ledger (batch_id, original_path, backup_path, current_path, op_kind, reversal)
            VALUES (?, ?, ?, ?, ?, 'reversible')
            RETURNING id
            "#,
        )
        .bind(batch_id)
        .bind(original.to_string_lossy().as_ref())
        .bind(backup.map(|p| p.to_string_lossy().into_owned()))
        .bind(current.to_string_lossy().as_ref())
        .bind(op_kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(MoveRecord {
            id: row.0,
            batch_id: batch_id.to_string(),
            original_path: original.to_path_buf(),
            backup_path: backup.map(Path::to_path_buf),
            current_path: current.to_path_buf(),
            op_kind,
            reversal: ReversalState::Reversible,
        })
    }

    /// Fetch one record by id.
    pub async fn get(&self, id: i64) -> sqlx::Result<Option<MoveRecord>> {
        let row: Option<MoveRow> = sqlx::query_as(&format!("{SELECT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(MoveRow::into_record))
    }

    /// Reversible records for a batch, newest first (rollback order).
    pub async fn reversible_for_batch(&self, batch_id: &str) -> sqlx::Result<Vec<MoveRecord>> {
        let rows: Vec<MoveRow> = sqlx::query_as(&format!(
            "{SELECT} WHERE batch_id = ? AND reversal = 'reversible' ORDER BY id DESC"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MoveRow::into_record).collect())
    }

    /// Find the reversible record whose current path matches.
    pub async fn find_by_current_path(&self, current: &Path) -> sqlx::Result<Option<MoveRecord>> {
        let row: Option<MoveRow> = sqlx::query_as(&format!(
            "{SELECT} WHERE current_path = ? AND reversal = 'reversible' ORDER BY id DESC LIMIT 1"
        ))
        .bind(current.to_string_lossy().as_ref())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MoveRow::into_record))
    }

    /// Update the reversal state of a record.
    pub async fn set_reversal(&self, id: i64, state: ReversalState) -> sqlx::Result<()> {
        sqlx::query("UPDATE move_ledger SET reversal = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a speculative record (dry-run entries do not survive a batch).
    pub async fn delete(&self, id: i64) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM move_ledger WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_append_assigns_monotonic_ids() {
        let ledger = MoveLedger::new(test_pool().await);
        let a = ledger
            .append(
                "b",
                Path::new("/src/a.mp3"),
                None,
                Path::new("/lib/a.mp3"),
                OpKind::Move,
            )
            .await
            .unwrap();
        let b = ledger
            .append(
                "b",
                Path::new("/src/b.mp3"),
                Some(Path::new("/bak/b.mp3.bak")),
                Path::new("/lib/b.mp3"),
                OpKind::MoveWithTags,
            )
            .await
            .unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.reversal, ReversalState::Reversible);
    }

    #[tokio::test]
    async fn test_reversible_for_batch_descending() {
        let ledger = MoveLedger::new(test_pool().await);
        for i in 0..3 {
            ledger
                .append(
                    "b",
                    Path::new(&format!("/src/{i}.mp3")),
                    None,
                    Path::new(&format!("/lib/{i}.mp3")),
                    OpKind::Move,
                )
                .await
                .unwrap();
        }
        let records = ledger.reversible_for_batch("b").await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].id > records[1].id);
        assert!(records[1].id > records[2].id);
    }

    #[tokio::test]
    async fn test_set_reversal_excludes_from_reversible() {
        let ledger = MoveLedger::new(test_pool().await);
        let rec = ledger
            .append(
                "b",
                Path::new("/src/a.mp3"),
                None,
                Path::new("/lib/a.mp3"),
                OpKind::Move,
            )
            .await
            .unwrap();
        ledger
            .set_reversal(rec.id, ReversalState::Reversed)
            .await
            .unwrap();
        assert!(ledger.reversible_for_batch("b").await.unwrap().is_empty());

        let got = ledger.get(rec.id).await.unwrap().unwrap();
        assert_eq!(got.reversal, ReversalState::Reversed);
    }

    #[tokio::test]
    async fn test_find_by_current_path() {
        let ledger = MoveLedger::new(test_pool().await);
        ledger
            .append(
                "b",
                Path::new("/src/a.mp3"),
                None,
                Path::new("/lib/a.mp3"),
                OpKind::Move,
            )
            .await
            .unwrap();
        let found = ledger
            .find_by_current_path(Path::new("/lib/a.mp3"))
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().original_path, PathBuf::from("/src/a.mp3"));
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let ledger = MoveLedger::new(test_pool().await);
        let rec = ledger
            .append(
                "b",
                Path::new("/src/a.mp3"),
                None,
                Path::new("/lib/a.mp3"),
                OpKind::TagOnly,
            )
            .await
            .unwrap();
        ledger.delete(rec.id).await.unwrap();
        assert!(ledger.get(rec.id).await.unwrap().is_none());
    }
}
