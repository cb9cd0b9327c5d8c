//! Read-only REST client for the predict.fun venue.
//!
//! Failures never propagate to callers: every operation logs the error and
//! returns [`ApiResponse::unsuccessful`], so a failed poll is simply retried
//! on the next cycle.

use crate::error::VenueError;
use crate::types::{ApiResponse, Market, OpenOrder, Orderbook, OrderMatch};
use async_trait::async_trait;
use notifier_core::Address;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Read operations the notifier needs from the venue.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Recent order matches (fills) for a signer.
    async fn order_matches(&self, signer: &Address, first: u32) -> ApiResponse<Vec<OrderMatch>>;

    /// Currently open orders for a signer.
    async fn open_orders(&self, signer: &Address, first: u32) -> ApiResponse<Vec<OpenOrder>>;

    /// Market metadata.
    async fn market(&self, market_id: u64) -> ApiResponse<Market>;

    /// Market orderbook.
    async fn orderbook(&self, market_id: u64) -> ApiResponse<Orderbook>;
}

/// Connection settings for the venue API.
#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl VenueConfig {
    pub const MAINNET_URL: &'static str = "https://api.predict.fun";
    pub const TESTNET_URL: &'static str = "https://api-testnet.predict.fun";

    pub fn new(api_key: impl Into<String>, testnet: bool) -> Self {
        let base_url = if testnet {
            Self::TESTNET_URL
        } else {
            Self::MAINNET_URL
        };
        Self {
            base_url: base_url.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP implementation of [`VenueClient`].
#[derive(Clone)]
pub struct PredictClient {
    http: reqwest::Client,
    base_url: String,
}

impl PredictClient {
    pub fn new(config: VenueConfig) -> Result<Self, VenueError> {
        let mut headers = HeaderMap::new();
        let mut api_key =
            HeaderValue::from_str(&config.api_key).map_err(|_| VenueError::InvalidApiKey)?;
        api_key.set_sensitive(true);
        headers.insert("x-api-key", api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, VenueError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VenueError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Run a request, converting any failure into the unsuccessful sentinel.
    async fn fetch<T: DeserializeOwned>(
        &self,
        what: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> ApiResponse<T> {
        match self.get_json(path, query).await {
            Ok(resp) => {
                if !resp.is_success() {
                    debug!(request = what, "Venue returned success=false");
                }
                resp
            }
            Err(e) => {
                warn!(request = what, error = %e, transient = e.is_transient(), "Venue request failed");
                ApiResponse::unsuccessful()
            }
        }
    }
}

#[async_trait]
impl VenueClient for PredictClient {
    async fn order_matches(&self, signer: &Address, first: u32) -> ApiResponse<Vec<OrderMatch>> {
        let query = [
            ("signerAddress", signer.to_string()),
            ("first", first.to_string()),
        ];
        self.fetch("order_matches", "/v1/orders/matches", &query).await
    }

    async fn open_orders(&self, signer: &Address, first: u32) -> ApiResponse<Vec<OpenOrder>> {
        let query = [
            ("signerAddress", signer.to_string()),
            ("status", "OPEN".to_string()),
            ("first", first.to_string()),
        ];
        self.fetch("open_orders", "/v1/orders", &query).await
    }

    async fn market(&self, market_id: u64) -> ApiResponse<Market> {
        let path = format!("/v1/markets/{}", market_id);
        self.fetch("market", &path, &[]).await
    }

    async fn orderbook(&self, market_id: u64) -> ApiResponse<Orderbook> {
        let path = format!("/v1/markets/{}/orderbook", market_id);
        self.fetch("orderbook", &path, &[]).await
    }
}
