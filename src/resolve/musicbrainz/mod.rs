//! MusicBrainz release metadata oracle integration.

mod adapter;
mod client;
mod dto;

pub use client::MusicBrainzClient;
