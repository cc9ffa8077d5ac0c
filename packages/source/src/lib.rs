#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Satellite fire detection sources and multi-source aggregation.
//!
//! Each upstream product implements the [`DetectionSource`] trait. The
//! [`aggregate`] module fetches every configured source concurrently,
//! skipping the ones that fail, and concatenates the survivors into a single
//! numbered batch.

pub mod aggregate;
pub mod firms;
pub mod parsing;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use fire_alert_detection_models::{BoundingBox, Detection};
use serde::Deserialize;

/// Errors that can occur while fetching or parsing a detection source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// The upstream responded with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: reqwest::StatusCode,
        /// Requested URL with credentials redacted.
        url: String,
    },

    /// The response body was empty or did not look like detection data.
    #[error("Malformed response: {message}")]
    Malformed {
        /// Description of what went wrong.
        message: String,
    },

    /// The source did not answer within its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Longest time spent establishing a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the HTTP client shared by every upstream request. Each request is
/// bounded by `timeout`, and connecting by the smaller of `timeout` and 30s.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the client cannot be built.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(CONNECT_TIMEOUT))
        .build()?)
}

/// Run parameters shared by every source in one aggregation.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Region to query.
    pub bbox: BoundingBox,
    /// Lookback window in days (FIRMS accepts 1-10).
    pub day_range: u8,
    /// Per-source time budget, covering retries.
    pub timeout: Duration,
}

/// One configured upstream product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductConfig {
    /// Short identifier used in logs and reports (e.g. `"noaa20"`).
    pub id: String,
    /// Upstream product name (e.g. `"VIIRS_NOAA20_NRT"`).
    pub product: String,
}

/// Trait that every detection provider implements.
#[async_trait]
pub trait DetectionSource: Send + Sync {
    /// Returns a unique identifier for this source.
    fn id(&self) -> &str;

    /// Fetches and parses every detection the source reports for the
    /// requested region and window.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails or the body cannot be
    /// parsed.
    async fn fetch(&self, options: &FetchOptions) -> Result<Vec<Detection>, SourceError>;
}
