//! MusicBrainz HTTP client
//!
//! Handles communication with the MusicBrainz web service.
//! See: https://musicbrainz.org/doc/MusicBrainz_API
//!
//! IMPORTANT: MusicBrainz requires a User-Agent header and rate limits
//! to 1 req/sec. Pacing is enforced by the resolver's rate limiter, not
//! here.

use async_trait::async_trait;

use super::{adapter, dto};
use crate::resolve::traits::{ReleaseInfo, ReleaseOracle};
use crate::resolve::{http_status_error, OracleError, ORACLE_TIMEOUT};

/// User agent string - MusicBrainz requires this
const USER_AGENT: &str = concat!(
    "Tagsmith/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/tagsmith)"
);

/// MusicBrainz API client
pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl MusicBrainzClient {
    pub fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(ORACLE_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            base_url: "https://musicbrainz.org/ws/2".to_string(),
        }
    }

    /// Create a client for testing with custom base URL
    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    async fn send_release_request(
        &self,
        release_id: &str,
    ) -> Result<dto::ReleaseResponse, OracleError> {
        let url = format!(
            "{}/release/{}?fmt=json&inc=artist-credits+recordings+media",
            self.base_url, release_id
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(OracleError::from_reqwest)?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(OracleError::NotFound);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::RateLimited);
        }
        if !status.is_success() {
            if let Ok(error) = response.json::<dto::ApiError>().await {
                return Err(http_status_error(status.as_u16(), &error.error));
            }
            return Err(http_status_error(status.as_u16(), ""));
        }

        response
            .json::<dto::ReleaseResponse>()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))
    }
}

impl Default for MusicBrainzClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReleaseOracle for MusicBrainzClient {
    async fn release(&self, handle: &str) -> Result<ReleaseInfo, OracleError> {
        let response = self.send_release_request(handle).await?;
        Ok(adapter::to_release_info(response))
    }
}
