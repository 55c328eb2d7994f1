//! Persistence boundary for bars.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snafu::{Backtrace, Snafu};

use crate::models::{
    bar::Bar,
    request_params::{BarCursor, SeriesKey, StoredBar, SymbolFilter},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The backing database rejected or failed an operation.
    #[snafu(display("Storage backend error: {message}"))]
    Backend {
        message: String,
        backtrace: Backtrace,
    },

    /// A stored row could not be turned back into a bar.
    #[snafu(display("Corrupt stored row: {message}"))]
    Corrupt {
        message: String,
        backtrace: Backtrace,
    },

    /// The blocking task running the operation panicked or was cancelled.
    #[snafu(display("Storage task failed: {source}"))]
    Join {
        source: tokio::task::JoinError,
        backtrace: Backtrace,
    },
}

/// Where validated bars are written to and read back from.
///
/// Rows are unique per `(source, symbol, timeframe, timestamp)`; writing an
/// existing key replaces the row. Every read returns rows ordered by
/// `(source, symbol, timeframe, timestamp)`.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Inserts or replaces `bars` under `key`, returning the number of rows written.
    ///
    /// Rows are committed one at a time, so a failure part-way through leaves
    /// the earlier rows in place.
    async fn upsert_bars(&self, key: &SeriesKey, bars: &[Bar]) -> Result<usize, StoreError>;

    /// Up to `limit` rows matching `filter`, strictly after `after` in store order.
    async fn stream_bars(
        &self,
        filter: &SymbolFilter,
        after: Option<&BarCursor>,
        limit: usize,
    ) -> Result<Vec<StoredBar>, StoreError>;

    async fn count_bars(&self, filter: &SymbolFilter) -> Result<u64, StoreError>;

    /// Stored timestamps of one series within `[start, end)`, ascending.
    async fn timestamps(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError>;
}
