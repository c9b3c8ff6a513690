//! Batch processing command.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{db_url, default_batch_id};
use crate::config::{self, BatchOptions};
use crate::db::{self, MoveLedger, ResponseCache, TrackStore};
use crate::fingerprint::{FingerprintStage, FpcalcExtractor};
use crate::organizer::SafeOrganizer;
use crate::pipeline::progress::Phase;
use crate::pipeline::Pipeline;
use crate::ratelimit::RateLimiter;
use crate::resolve::{
    AcoustIdClient, ArchiveClient, CoverArtClient, MusicBrainzClient, Resolver,
};

pub async fn cmd_run(
    roots: Vec<PathBuf>,
    batch_id: Option<String>,
    dry_run: bool,
    library: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = config::load()?;
    if let Some(library) = library {
        config.library.library_root = library;
    }
    let mut options = BatchOptions::from_config(&config, dry_run);
    options.validate()?;

    let api_key = config
        .credentials
        .acoustid_api_key
        .clone()
        .unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!(
            "no AcoustID API key configured; fingerprint lookups will fail \
             (get a free key at https://acoustid.org/new-application)"
        );
    }
    if let Some(version) = FpcalcExtractor::version() {
        tracing::info!("fingerprint tool: {}", version);
    }

    let pool = db::init_db(&db_url()).await?;
    let resolver = Resolver::new(
        Arc::new(AcoustIdClient::new(api_key)),
        Arc::new(MusicBrainzClient::new()),
        Arc::new(CoverArtClient::new()),
        Arc::new(ArchiveClient::new()),
        ResponseCache::new(pool.clone()),
        Arc::new(RateLimiter::new()),
    );
    let organizer = SafeOrganizer::new(&options, MoveLedger::new(pool.clone()));
    let stage = FingerprintStage::new(FpcalcExtractor, options.skip_short_duration_seconds);

    let pipeline = Arc::new(Pipeline::new(
        TrackStore::new(pool.clone()),
        resolver,
        organizer,
        stage,
        options,
    ));

    // Ctrl-C cancels; pending fingerprint work is dropped without joining
    {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling... finishing the current operation");
                pipeline.cancel();
            }
        });
    }

    // Progress reporting
    let mut events = pipeline.subscribe();
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let phase = match event.phase {
                Phase::Scan => "scan",
                Phase::Fingerprint => "fingerprint",
                Phase::Resolve => "resolve",
            };
            let eta = event
                .eta_hint
                .map(|s| format!(", ~{:.0}s left", s))
                .unwrap_or_default();
            println!("[{}] {}/{}{}", phase, event.completed, event.total, eta);
        }
    });

    let batch_id = batch_id.unwrap_or_else(|| default_batch_id(&roots));
    println!("Processing batch '{}'...", batch_id);
    let summary = pipeline.run_batch(&batch_id, &roots).await?;
    reporter.abort();

    if summary.cancelled {
        println!("\nCancelled.");
    }
    println!(
        "\n{} files: {} applied, {} for review, {} manual, {} unmatched, {} failed ({} skipped from a previous run)",
        summary.total,
        summary.auto_applied,
        summary.queued_for_review,
        summary.manual,
        summary.unmatched,
        summary.failed,
        summary.skipped_resume,
    );
    for advisory in &summary.advisories {
        println!("note: {}", advisory);
    }
    if !summary.errors_by_kind.is_empty() {
        println!("errors by kind:");
        for (kind, count) in &summary.errors_by_kind {
            println!("  {:?}: {}", kind, count);
        }
    }
    if dry_run && !summary.planned.is_empty() {
        println!("\nPlanned operations (dry run):");
        for op in &summary.planned {
            println!(
                "  {} {} -> {}",
                op.op_kind,
                op.source.display(),
                op.destination.display()
            );
        }
    }
    Ok(())
}
