//! Cache maintenance command.

use crate::cli::db_url;
use crate::db::{self, ResponseCache};

pub async fn cmd_evict_cache() -> anyhow::Result<()> {
    let pool = db::init_db(&db_url()).await?;
    let evicted = ResponseCache::new(pool).evict_expired().await?;
    println!("Evicted {} expired cache entr(ies)", evicted);
    Ok(())
}
