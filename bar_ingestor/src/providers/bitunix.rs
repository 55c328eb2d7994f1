//! Bitunix futures kline provider.
//!
//! Public market data, no credentials. Prices arrive as strings and are parsed
//! straight into `Decimal`. Pages are requested by `startTime`; the cursor handed
//! back to the pipeline is the next bucket start in epoch milliseconds.

mod params;
mod provider;
mod response;

use std::{sync::Arc, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use shared_utils::env::get_optional_env_var;
use snafu::ResultExt;

use crate::providers::{ClientBuildSnafu, ProviderInitError};

pub use params::{MAX_PAGE_SIZE, interval_for};

pub const SOURCE: &str = "bitunix";
const DEFAULT_BASE_URL: &str = "https://fapi.bitunix.com";
const KLINE_PATH: &str = "/api/v1/futures/market/kline";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BitunixProvider {
    client: Client,
    url: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl BitunixProvider {
    /// Creates a provider with the default 30 s request timeout and 10 requests/s.
    ///
    /// `BITUNIX_BASE_URL` overrides the host (e.g. a local mock).
    pub fn new() -> Result<Self, ProviderInitError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ProviderInitError> {
        let base = get_optional_env_var("BITUNIX_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context(ClientBuildSnafu)?;
        Ok(Self {
            client,
            url: format!("{}{KLINE_PATH}", base.trim_end_matches('/')),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(nonzero!(10u32)))),
        })
    }
}
