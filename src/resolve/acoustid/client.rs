//! AcoustID HTTP client
//!
//! Handles communication with the AcoustID web service.
//! See: https://acoustid.org/webservice
//!
//! ## API Quirks
//!
//! The AcoustID API uses `+` as a separator in the `meta` parameter
//! (e.g. `recordings+releases`). Standard URL encoding converts `+` to
//! `%2B`, which the API does NOT recognize as a separator and silently
//! returns results without the requested metadata. The URL is therefore
//! built manually, preserving the literal `+`.

use async_trait::async_trait;

use super::{adapter, dto};
use crate::resolve::traits::{FingerprintHit, FingerprintOracle};
use crate::resolve::{http_status_error, OracleError, ORACLE_TIMEOUT};

/// AcoustID API client
pub struct AcoustIdClient {
    api_key: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl AcoustIdClient {
    /// Create a new client with the given API key.
    ///
    /// Accepts gzip-compressed responses and identifies the application
    /// in the User-Agent header.
    pub fn new(api_key: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .timeout(ORACLE_TIMEOUT)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            api_key: api_key.into(),
            http_client,
            base_url: "https://api.acoustid.org/v2/lookup".to_string(),
        }
    }

    /// Create a client for testing with custom base URL
    #[cfg(test)]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn send_lookup_request(
        &self,
        fingerprint: &str,
        duration_secs: f64,
    ) -> Result<dto::LookupResponse, OracleError> {
        // The + characters must NOT be URL-encoded or the API won't
        // return metadata.
        let url = format!(
            "{}?client={}&duration={}&fingerprint={}&meta=recordings+releases",
            self.base_url,
            urlencoding::encode(&self.api_key),
            duration_secs.round() as u64,
            urlencoding::encode(fingerprint)
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(OracleError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http_status_error(status.as_u16(), &body));
        }

        response
            .json::<dto::LookupResponse>()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))
    }
}

#[async_trait]
impl FingerprintOracle for AcoustIdClient {
    async fn lookup(
        &self,
        fingerprint: &str,
        duration_secs: f64,
    ) -> Result<Vec<FingerprintHit>, OracleError> {
        let response = self.send_lookup_request(fingerprint, duration_secs).await?;
        adapter::to_hits(response)
    }
}
