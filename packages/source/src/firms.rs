//! NASA FIRMS area API source.
//!
//! Each [`FirmsSource`] queries one product (e.g. `VIIRS_NOAA20_NRT`) via
//! `GET {base}/api/area/csv/{key}/{product}/{bbox}/{days}`.

use async_trait::async_trait;
use fire_alert_detection_models::Detection;
use serde::Deserialize;

use crate::parsing::parse_detections_csv;
use crate::{DetectionSource, FetchOptions, ProductConfig, SourceError, retry};

/// Default FIRMS host.
pub const DEFAULT_BASE_URL: &str = "https://firms.modaps.eosdis.nasa.gov";

/// One FIRMS product queried with a shared map key.
pub struct FirmsSource {
    id: String,
    product: String,
    base_url: String,
    map_key: String,
    client: reqwest::Client,
}

impl FirmsSource {
    /// Creates a source for `product` on the given FIRMS host.
    #[must_use]
    pub fn new(config: &ProductConfig, base_url: &str, map_key: &str, client: reqwest::Client) -> Self {
        Self {
            id: config.id.clone(),
            product: config.product.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            map_key: map_key.to_string(),
            client,
        }
    }

    /// Builds one source per configured product, sharing `client`.
    #[must_use]
    pub fn from_products(
        products: &[ProductConfig],
        base_url: &str,
        map_key: &str,
        client: &reqwest::Client,
    ) -> Vec<Box<dyn DetectionSource>> {
        products
            .iter()
            .map(|p| {
                Box::new(Self::new(p, base_url, map_key, client.clone())) as Box<dyn DetectionSource>
            })
            .collect()
    }

    /// Upstream product name.
    #[must_use]
    pub fn product(&self) -> &str {
        &self.product
    }

    /// Builds the area query URL for the given options.
    #[must_use]
    pub fn area_url(&self, options: &FetchOptions) -> String {
        format!(
            "{}/api/area/csv/{}/{}/{}/{}",
            self.base_url, self.map_key, self.product, options.bbox, options.day_range
        )
    }
}

#[async_trait]
impl DetectionSource for FirmsSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, options: &FetchOptions) -> Result<Vec<Detection>, SourceError> {
        let url = self.area_url(options);
        log::debug!("[{}] GET {} ({})", self.id, self.product, options.bbox);

        let body = retry::send_text(|| self.client.get(&url)).await?;
        parse_detections_csv(&self.product, &body)
    }
}

/// Transaction usage reported for a FIRMS map key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MapKeyStatus {
    /// Transactions used in the current window.
    pub current_transactions: Option<u64>,
    /// Transactions allowed per window.
    pub transaction_limit: Option<u64>,
    /// Window length as reported upstream (e.g. `"600 seconds"`).
    pub transaction_interval: Option<String>,
}

/// Queries the transaction count for `map_key`. The request is made once,
/// without retries, and is bounded by the client's timeout.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails or the body is not the
/// expected JSON.
pub async fn fetch_map_key_status(
    client: &reqwest::Client,
    base_url: &str,
    map_key: &str,
) -> Result<MapKeyStatus, SourceError> {
    let url = format!("{}/mapserver/mapkey_status/", base_url.trim_end_matches('/'));
    retry::send_json(retry::RetryPolicy::NONE, || {
        client.get(&url).query(&[("MAP_KEY", map_key)])
    })
    .await
}
