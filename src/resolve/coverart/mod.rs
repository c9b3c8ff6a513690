//! Cover Art Archive oracle integration.
//!
//! The Cover Art Archive is keyed by MusicBrainz release id and needs no
//! authentication. Only the front image handle is fetched; downloading
//! the bytes is the caller's business.

use async_trait::async_trait;
use serde::Deserialize;

use crate::resolve::traits::CoverArtOracle;
use crate::resolve::{http_status_error, OracleError, ORACLE_TIMEOUT};

#[derive(Debug, Deserialize)]
struct ImageList {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    #[serde(default)]
    front: bool,
    image: String,
}

/// Cover Art Archive client
pub struct CoverArtClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl CoverArtClient {
    pub fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(ORACLE_TIMEOUT)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            base_url: "https://coverartarchive.org".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for CoverArtClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoverArtOracle for CoverArtClient {
    async fn art(&self, release_handle: &str) -> Result<Option<String>, OracleError> {
        let url = format!("{}/release/{}", self.base_url, release_handle);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(OracleError::from_reqwest)?;

        let status = response.status();
        // No art for this release is a definitive empty answer
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(http_status_error(status.as_u16(), ""));
        }

        let list = response
            .json::<ImageList>()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        Ok(list
            .images
            .into_iter()
            .find(|img| img.front)
            .map(|img| img.image))
    }
}
