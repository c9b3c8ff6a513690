//! Command-line interface definitions and dispatch.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Identify, retag, and organize audio libraries with full undo.
#[derive(Parser)]
#[command(name = "tagsmith", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process a folder of audio files: fingerprint, match, retag, move
    Run {
        /// Directories to scan for audio files
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Batch id (stable across restarts for resume); derived from
        /// the roots when omitted
        #[arg(long)]
        batch_id: Option<String>,

        /// Simulate everything; report the plan without touching files
        #[arg(long)]
        dry_run: bool,

        /// Override the configured library root
        #[arg(long)]
        library: Option<PathBuf>,
    },

    /// Undo the file operations of a batch (or one ledger record)
    Rollback {
        /// Batch id to roll back
        #[arg(long, conflicts_with = "record")]
        batch_id: Option<String>,

        /// Single ledger record id to roll back
        #[arg(long)]
        record: Option<i64>,
    },

    /// Show processing counts for a batch
    Status {
        #[arg(long)]
        batch_id: String,
    },

    /// Delete expired entries from the API response cache
    EvictCache,
}

/// Dispatch a parsed command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run {
            roots,
            batch_id,
            dry_run,
            library,
        } => commands::run::cmd_run(roots, batch_id, dry_run, library).await,
        Command::Rollback { batch_id, record } => {
            commands::rollback::cmd_rollback(batch_id, record).await
        }
        Command::Status { batch_id } => commands::status::cmd_status(&batch_id).await,
        Command::EvictCache => commands::cache::cmd_evict_cache().await,
    }
}

/// Path of the embedded database file.
pub fn db_url() -> String {
    let path = dirs::data_local_dir()
        .map(|d| d.join("tagsmith"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&path);
    format!("sqlite:{}", path.join("tagsmith.db").display())
}

/// Stable default batch id derived from the scan roots.
pub fn default_batch_id(roots: &[PathBuf]) -> String {
    let mut joined: Vec<String> = roots
        .iter()
        .map(|r| {
            r.canonicalize()
                .unwrap_or_else(|_| r.clone())
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    joined.sort();
    joined
        .join("+")
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_batch_id_is_stable_and_order_independent() {
        let a = vec![PathBuf::from("/m/one"), PathBuf::from("/m/two")];
        let b = vec![PathBuf::from("/m/two"), PathBuf::from("/m/one")];
        assert_eq!(default_batch_id(&a), default_batch_id(&b));
        assert!(!default_batch_id(&a).contains('/'));
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from(["tagsmith", "run", "/music", "--dry-run"]).unwrap();
        match cli.command {
            Command::Run { roots, dry_run, .. } => {
                assert_eq!(roots, vec![PathBuf::from("/music")]);
                assert!(dry_run);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_rejects_rollback_with_both_targets() {
        let result = Cli::try_parse_from([
            "tagsmith",
            "rollback",
            "--batch-id",
            "b1",
            "--record",
            "3",
        ]);
        assert!(result.is_err());
    }
}
