//! tagsmith - identify, retag, and organize audio libraries.
//!
//! Drop a folder of mixed audio files on the `run` command and get back
//! a library organized as `Artist/Album (Year)/NN - Title.ext`, plus a
//! review queue for low-confidence matches and a ledger-backed
//! `rollback` for everything that moved.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod fuzzy;
pub mod metadata;
pub mod model;
pub mod organizer;
pub mod pipeline;
pub mod ratelimit;
pub mod resolve;
pub mod scanner;
pub mod scorer;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("tagsmith=info".parse()?))
        .init();

    cli::run(args).await
}
