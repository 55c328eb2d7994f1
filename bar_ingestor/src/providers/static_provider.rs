//! Serves pre-loaded bars page by page; used for manual imports, replays and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::{
        bar::Bar,
        request_params::{BarPage, PageRequest},
    },
    providers::{DataProvider, ProviderError, ValidationSnafu},
};

pub struct StaticProvider {
    source: String,
    bars: Vec<Bar>,
}

impl StaticProvider {
    /// Bars are served in timestamp order regardless of input order.
    pub fn new(source: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self {
            source: source.into(),
            bars,
        }
    }

    /// Parses a JSON array of bars (the serde form of [`Bar`]).
    pub fn from_json(source: impl Into<String>, json: &str) -> Result<Self, serde_json::Error> {
        let bars: Vec<Bar> = serde_json::from_str(json)?;
        Ok(Self::new(source, bars))
    }

    /// Timestamps of the first and last bar held.
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.bars.first()?.timestamp, self.bars.last()?.timestamp))
    }
}

#[async_trait]
impl DataProvider for StaticProvider {
    fn source(&self) -> &str {
        &self.source
    }

    async fn fetch_bars(&self, request: &PageRequest) -> Result<BarPage, ProviderError> {
        let offset = match &request.cursor {
            None => 0,
            Some(c) => c.parse::<usize>().map_err(|_| {
                ValidationSnafu {
                    message: format!("bad cursor '{c}'"),
                }
                .build()
            })?,
        };
        let in_range: Vec<&Bar> = self
            .bars
            .iter()
            .filter(|b| b.timestamp >= request.start && b.timestamp < request.end)
            .collect();
        let limit = request.limit.max(1) as usize;
        let page: Vec<Bar> = in_range
            .iter()
            .skip(offset)
            .take(limit)
            .map(|b| Bar {
                source: self.source.clone(),
                ..(*b).clone()
            })
            .collect();
        let consumed = offset + page.len();
        let next_cursor = (consumed < in_range.len()).then(|| consumed.to_string());
        Ok(BarPage {
            bars: page,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::timeframe::TimeFrame;

    #[tokio::test]
    async fn pages_until_exhausted() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars = (0..5)
            .map(|i| Bar {
                timestamp: t0 + Duration::minutes(i),
                open: Decimal::ONE,
                high: Decimal::ONE,
                low: Decimal::ONE,
                close: Decimal::ONE,
                volume: Decimal::ONE,
                source: String::new(),
            })
            .collect();
        let provider = StaticProvider::new("replay", bars);
        let mut req = PageRequest {
            symbol: "X".into(),
            timeframe: TimeFrame::minutes(1).unwrap(),
            start: t0,
            end: t0 + Duration::hours(1),
            cursor: None,
            limit: 2,
        };
        let mut sizes = Vec::new();
        loop {
            let page = provider.fetch_bars(&req).await.unwrap();
            assert!(page.bars.iter().all(|b| b.source == "replay"));
            sizes.push(page.bars.len());
            match page.next_cursor {
                Some(c) => req.cursor = Some(c),
                None => break,
            }
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(provider.span(), Some((t0, t0 + Duration::minutes(4))));
    }
}
