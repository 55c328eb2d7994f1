use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{asset::AssetClass, bar::Bar, timeframe::TimeFrame};

/// Identity of one stored series: bars are unique per `(source, symbol, timeframe, timestamp)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub source: String,
    pub symbol: String,
    pub timeframe: TimeFrame,
}

impl SeriesKey {
    pub fn new(source: impl Into<String>, symbol: impl Into<String>, timeframe: TimeFrame) -> Self {
        Self {
            source: source.into(),
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.source, self.symbol, self.timeframe)
    }
}

/// Selects stored series; `None` fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilter {
    pub source: Option<String>,
    pub symbol: Option<String>,
    pub timeframe: Option<TimeFrame>,
}

impl SymbolFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn series(key: &SeriesKey) -> Self {
        Self {
            source: Some(key.source.clone()),
            symbol: Some(key.symbol.clone()),
            timeframe: Some(key.timeframe),
        }
    }

    pub fn matches(&self, key: &SeriesKey) -> bool {
        self.source.as_ref().is_none_or(|s| *s == key.source)
            && self.symbol.as_ref().is_none_or(|s| *s == key.symbol)
            && self.timeframe.is_none_or(|tf| tf == key.timeframe)
    }
}

/// A persisted bar together with the series it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBar {
    pub key: SeriesKey,
    pub bar: Bar,
}

impl StoredBar {
    pub fn cursor(&self) -> BarCursor {
        BarCursor {
            key: self.key.clone(),
            timestamp: self.bar.timestamp,
        }
    }
}

/// Keyset position: streaming resumes strictly after this `(series, timestamp)`.
///
/// Ordering is `(source, symbol, timeframe as text, timestamp)`, the same order
/// every [`BarStore`](crate::io::sink::BarStore) returns rows in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BarCursor {
    pub key: SeriesKey,
    pub timestamp: DateTime<Utc>,
}

impl BarCursor {
    /// Sort key used by stores that order in memory.
    pub fn sort_key(&self) -> (String, String, String, DateTime<Utc>) {
        (
            self.key.source.clone(),
            self.key.symbol.clone(),
            self.key.timeframe.to_string(),
            self.timestamp,
        )
    }
}

/// One page request sent to a [`DataProvider`](crate::providers::DataProvider).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub symbol: String,
    pub timeframe: TimeFrame,

    /// Inclusive start of the overall range (UTC).
    pub start: DateTime<Utc>,

    /// Exclusive end of the overall range (UTC).
    pub end: DateTime<Utc>,

    /// Provider-opaque token for the next page; `None` requests the first page.
    pub cursor: Option<String>,

    /// Maximum bars per page.
    pub limit: u32,
}

/// One page of provider output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BarPage {
    pub bars: Vec<Bar>,

    /// `None` when the provider has nothing after this page.
    pub next_cursor: Option<String>,
}

/// A historical backfill for one symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub symbol: String,
    pub timeframe: TimeFrame,

    /// Inclusive start (UTC).
    pub start: DateTime<Utc>,

    /// Exclusive end (UTC).
    pub end: DateTime<Utc>,

    #[serde(default)]
    pub asset_class: AssetClass,

    /// Overrides `enable_bad_tick_filter` for this run.
    #[serde(default)]
    pub bad_tick_filter: Option<bool>,

    /// Overrides `enable_ohlc_validation_post_hoc` for this run.
    #[serde(default)]
    pub post_hoc: Option<bool>,
}

impl IngestRequest {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            start,
            end,
            asset_class: AssetClass::default(),
            bad_tick_filter: None,
            post_hoc: None,
        }
    }

    pub fn with_asset_class(mut self, asset_class: AssetClass) -> Self {
        self.asset_class = asset_class;
        self
    }

    pub fn with_bad_tick_filter(mut self, enabled: bool) -> Self {
        self.bad_tick_filter = Some(enabled);
        self
    }

    pub fn with_post_hoc(mut self, enabled: bool) -> Self {
        self.post_hoc = Some(enabled);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_by_present_fields() {
        let key = SeriesKey::new("bitunix", "BTCUSDT", TimeFrame::minutes(1).unwrap());
        assert!(SymbolFilter::all().matches(&key));
        assert!(SymbolFilter::series(&key).matches(&key));

        let other_tf = SymbolFilter {
            timeframe: Some(TimeFrame::hours(1).unwrap()),
            ..SymbolFilter::default()
        };
        assert!(!other_tf.matches(&key));

        let other_symbol = SymbolFilter {
            symbol: Some("ETHUSDT".into()),
            ..SymbolFilter::default()
        };
        assert!(!other_symbol.matches(&key));
    }

    #[test]
    fn ingest_request_deserializes_with_defaults() {
        let req: IngestRequest = serde_json::from_str(
            r#"{"symbol":"BTCUSDT","timeframe":"1m","start":"2024-01-01T00:00:00Z","end":"2024-01-02T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(req.asset_class, AssetClass::Crypto);
        assert_eq!(req.bad_tick_filter, None);
        assert_eq!(req.timeframe.to_string(), "1m");
    }
}
