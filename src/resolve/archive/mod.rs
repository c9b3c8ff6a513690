//! Internet Archive oracle integration and the mix-series matcher.

mod client;
mod dto;
pub mod mixtape;

pub use client::ArchiveClient;
