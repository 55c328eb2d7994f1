//! Provider abstraction for market data sources.
//!
//! [`DataProvider`] is the one seam between the ingestion pipeline and any
//! kline/candle API. A provider fetches exactly one page per call; paging,
//! retries and persistence belong to the pipeline, so a provider stays a thin
//! translation of the vendor's wire format into canonical bars.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use bar_ingestor::models::request_params::{BarPage, PageRequest};
//! use bar_ingestor::providers::{DataProvider, ProviderError};
//!
//! struct MyProvider;
//!
//! #[async_trait]
//! impl DataProvider for MyProvider {
//!     fn source(&self) -> &str {
//!         "mine"
//!     }
//!
//!     async fn fetch_bars(&self, _request: &PageRequest) -> Result<BarPage, ProviderError> {
//!         Ok(BarPage::default())
//!     }
//! }
//! ```

pub mod bitunix;
pub mod static_provider;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::request_params::{BarPage, PageRequest};

/// Fetches one page of bars from a market data vendor.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Provider code stamped on every bar and used to namespace stored series.
    fn source(&self) -> &str;

    /// Fetches the page identified by `request.cursor` (the first page when `None`).
    ///
    /// Bars may come back in any order; the pipeline sorts and de-duplicates.
    async fn fetch_bars(&self, request: &PageRequest) -> Result<BarPage, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a `DataProvider` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// Transport-level failure (timeout, connection refused, TLS, body read).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// Non-success HTTP status.
    #[snafu(display("HTTP {status}: {body}"))]
    Http {
        status: u16,
        body: String,
        backtrace: Backtrace,
    },

    /// The vendor answered 200 but with an error code in the envelope.
    ///
    /// `retryable` is set by the provider, which knows its own rate-limit and
    /// busy codes.
    #[snafu(display("API error {code}: {message}"))]
    Api {
        code: i64,
        message: String,
        retryable: bool,
        backtrace: Backtrace,
    },

    /// The response body did not match the expected shape.
    #[snafu(display("Failed to decode response: {message}"))]
    Decode {
        message: String,
        backtrace: Backtrace,
    },

    /// The request parameters were invalid for this specific provider.
    #[snafu(display("Invalid parameters for provider: {message}"))]
    Validation {
        message: String,
        backtrace: Backtrace,
    },

    /// An error during provider configuration or initialization.
    #[snafu(display("Provider initialization error: {source}"))]
    Init {
        #[snafu(backtrace)]
        source: ProviderInitError,
    },
}

impl ProviderError {
    /// Whether a retry has a chance of succeeding: timeouts, connection
    /// failures, HTTP 429 and 5xx, and vendor codes the provider marked as
    /// rate-limit or busy. Everything else fails the batch at once.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Reqwest { source, .. } => {
                source.is_timeout()
                    || source.is_connect()
                    || source.status().is_some_and(|s| is_transient_status(s.as_u16()))
            }
            ProviderError::Http { status, .. } => is_transient_status(*status),
            ProviderError::Api { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
