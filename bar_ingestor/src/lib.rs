//! Historical OHLCV ingestion with data-quality correction.
//!
//! - [`providers`]: the [`DataProvider`](providers::DataProvider) seam and the Bitunix kline client.
//! - [`quality`]: OHLC corrector, bad-tick filter, post-hoc validator.
//! - [`ingest`]: the batched pipeline, retry policy, progress reporting and symbol locks.
//! - [`io`]: the [`BarStore`](io::sink::BarStore) seam and an in-memory store.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod io;
pub mod models;
pub mod providers;
pub mod quality;
