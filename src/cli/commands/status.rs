//! Status command: per-state counts for a batch.

use crate::cli::db_url;
use crate::db::{self, TrackStore};

pub async fn cmd_status(batch_id: &str) -> anyhow::Result<()> {
    let pool = db::init_db(&db_url()).await?;
    let counts = TrackStore::new(pool).counts_by_state(batch_id).await?;

    if counts.is_empty() {
        println!("No tracks recorded for batch '{}'", batch_id);
        return Ok(());
    }

    let mut rows: Vec<(&String, &i64)> = counts.iter().collect();
    rows.sort_by_key(|(state, _)| state.as_str());
    println!("Batch '{}':", batch_id);
    for (state, count) in rows {
        println!("  {:>18}: {}", state, count);
    }
    Ok(())
}
