//! Diesel models mapping to the database schema.
//!
//! [`crate::schema::bars`] stores one row per bar. Timestamps are RFC-3339 UTC
//! with millisecond precision and prices are decimal strings, so rows read back
//! exactly as they were written. [`crate::schema::series_locks`] holds one
//! lease row per locked `(source, symbol)`.

use std::str::FromStr;

use bar_ingestor::models::{
    bar::Bar,
    request_params::{SeriesKey, StoredBar},
    timeframe::TimeFrame,
    tz::{parse_ts_to_utc, to_rfc3339_millis},
};
use diesel::prelude::*;
use rust_decimal::Decimal;

use crate::{
    bars::RepoError,
    schema::{bars, series_locks},
};

/// A row in [`crate::schema::bars`] as read back from the database.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = bars, check_for_backend(diesel::sqlite::Sqlite))]
pub struct BarRow {
    /// Provider code, e.g. "bitunix".
    pub source: String,
    /// Exchange symbol, e.g. "BTCUSDT".
    pub symbol: String,
    /// Timeframe in display form ("1m", "4h", "1D").
    pub timeframe: String,
    /// Bucket start in RFC3339 UTC with milliseconds.
    pub ts: String,
    /// Open price as a decimal string.
    pub open: String,
    /// High price as a decimal string.
    pub high: String,
    /// Low price as a decimal string.
    pub low: String,
    /// Close price as a decimal string.
    pub close: String,
    /// Base volume as a decimal string.
    pub volume: String,
    /// Last write time in RFC3339 UTC.
    pub updated_at: String,
}

/// Insertable form of [`BarRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bars)]
pub struct NewBarRow<'a> {
    /// Provider code.
    pub source: &'a str,
    /// Exchange symbol.
    pub symbol: &'a str,
    /// Timeframe in display form.
    pub timeframe: &'a str,
    /// Bucket start in RFC3339 UTC with milliseconds.
    pub ts: String,
    /// Open price.
    pub open: String,
    /// High price.
    pub high: String,
    /// Low price.
    pub low: String,
    /// Close price.
    pub close: String,
    /// Base volume.
    pub volume: String,
    /// Write time.
    pub updated_at: &'a str,
}

/// Insertable lease row in [`crate::schema::series_locks`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = series_locks)]
pub struct NewSeriesLock<'a> {
    /// Provider code.
    pub source: &'a str,
    /// Exchange symbol.
    pub symbol: &'a str,
    /// Holder tag, `ingestion` or `post_hoc_validation`.
    pub holder: &'a str,
    /// Lock table instance that took the lease.
    pub owner: &'a str,
    /// Acquisition time in RFC3339 UTC.
    pub acquired_at: String,
    /// Lease end in RFC3339 UTC with milliseconds; renewals push it out.
    pub expires_at: String,
}

impl<'a> NewBarRow<'a> {
    /// Row for `bar` under `key`; `timeframe` is `key.timeframe` already formatted.
    pub fn new(key: &'a SeriesKey, timeframe: &'a str, bar: &Bar, updated_at: &'a str) -> Self {
        Self {
            source: &key.source,
            symbol: &key.symbol,
            timeframe,
            ts: to_rfc3339_millis(bar.timestamp),
            open: bar.open.to_string(),
            high: bar.high.to_string(),
            low: bar.low.to_string(),
            close: bar.close.to_string(),
            volume: bar.volume.to_string(),
            updated_at,
        }
    }
}

impl BarRow {
    fn describe(&self) -> String {
        format!("{}:{}@{} {}", self.source, self.symbol, self.timeframe, self.ts)
    }

    fn decimal(&self, column: &'static str, value: &str) -> Result<Decimal, RepoError> {
        Decimal::from_str(value).map_err(|_| RepoError::Corrupt {
            row: self.describe(),
            column,
            value: value.to_string(),
        })
    }
}

impl TryFrom<BarRow> for StoredBar {
    type Error = RepoError;

    fn try_from(row: BarRow) -> Result<Self, Self::Error> {
        let timeframe = TimeFrame::from_str(&row.timeframe).map_err(|_| RepoError::Corrupt {
            row: row.describe(),
            column: "timeframe",
            value: row.timeframe.clone(),
        })?;
        let timestamp = parse_ts_to_utc(&row.ts).map_err(|_| RepoError::Corrupt {
            row: row.describe(),
            column: "ts",
            value: row.ts.clone(),
        })?;
        let bar = Bar {
            timestamp,
            open: row.decimal("open", &row.open)?,
            high: row.decimal("high", &row.high)?,
            low: row.decimal("low", &row.low)?,
            close: row.decimal("close", &row.close)?,
            volume: row.decimal("volume", &row.volume)?,
            source: row.source.clone(),
        };
        Ok(StoredBar {
            key: SeriesKey::new(row.source, row.symbol, timeframe),
            bar,
        })
    }
}
