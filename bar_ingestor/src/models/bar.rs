//! Canonical in-memory representation of a time-series bar (OHLCV).
//!
//! This struct is the standard output of every [`DataProvider`](crate::providers::DataProvider)
//! and the unit the quality stages and stores operate on. Prices and volume are
//! fixed-point [`Decimal`]s so the exchange's string-encoded values survive
//! without float rounding.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single time-series bar (OHLCV) for a given timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Start of the interval this bar covers (UTC).
    pub timestamp: DateTime<Utc>,

    /// Opening price.
    pub open: Decimal,

    /// Highest price during the bar interval.
    pub high: Decimal,

    /// Lowest price during the bar interval.
    pub low: Decimal,

    /// Closing price.
    pub close: Decimal,

    /// Quantity traded during the bar interval.
    pub volume: Decimal,

    /// Provider code the bar came from (e.g. `bitunix`); namespaces symbols across providers.
    /// Optional in JSON imports; the serving provider stamps it.
    #[serde(default)]
    pub source: String,
}

impl Bar {
    /// Top of the candle body.
    pub fn body_high(&self) -> Decimal {
        self.open.max(self.close)
    }

    /// Bottom of the candle body.
    pub fn body_low(&self) -> Decimal {
        self.open.min(self.close)
    }

    /// Portion of the range above the body.
    pub fn upper_wick(&self) -> Decimal {
        (self.high - self.body_high()).max(Decimal::ZERO)
    }

    /// Portion of the range below the body.
    pub fn lower_wick(&self) -> Decimal {
        (self.body_low() - self.low).max(Decimal::ZERO)
    }
}
