//! Rollback command: undo file operations via the move ledger.

use crate::cli::db_url;
use crate::config::{self, BatchOptions};
use crate::db::{self, MoveLedger};
use crate::organizer::{RollbackDisposition, SafeOrganizer};

pub async fn cmd_rollback(batch_id: Option<String>, record: Option<i64>) -> anyhow::Result<()> {
    let config = config::load()?;
    let options = BatchOptions::from_config(&config, false);

    let pool = db::init_db(&db_url()).await?;
    let organizer = SafeOrganizer::new(&options, MoveLedger::new(pool));

    match (batch_id, record) {
        (Some(batch_id), None) => {
            let report = organizer.rollback_batch(&batch_id).await?;
            println!("Rolled back {} operation(s)", report.reversed);
            if !report.broken.is_empty() {
                println!(
                    "{} record(s) could not be reversed (files missing): {:?}",
                    report.broken.len(),
                    report.broken
                );
            }
        }
        (None, Some(id)) => match organizer.rollback_record(id).await? {
            RollbackDisposition::Reversed => println!("Record {} reversed", id),
            RollbackDisposition::Broken => {
                println!("Record {} is broken (files missing); marked as such", id)
            }
        },
        _ => anyhow::bail!("pass exactly one of --batch-id or --record"),
    }
    Ok(())
}
