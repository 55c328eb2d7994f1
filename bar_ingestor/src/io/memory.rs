use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    io::sink::{BarStore, StoreError},
    models::{
        bar::Bar,
        request_params::{BarCursor, SeriesKey, StoredBar, SymbolFilter},
    },
};

type RowKey = (String, String, String, DateTime<Utc>);

/// In-process [`BarStore`]; ordering matches the SQLite store.
#[derive(Default)]
pub struct MemoryBarStore {
    rows: RwLock<BTreeMap<RowKey, StoredBar>>,
    rows_written: AtomicU64,
}

impl MemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows written through `upsert_bars` since creation.
    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    /// Snapshot of one series in timestamp order.
    pub fn series(&self, key: &SeriesKey) -> Vec<Bar> {
        self.rows
            .read()
            .values()
            .filter(|r| r.key == *key)
            .map(|r| r.bar.clone())
            .collect()
    }

    fn row_key(key: &SeriesKey, ts: DateTime<Utc>) -> RowKey {
        (
            key.source.clone(),
            key.symbol.clone(),
            key.timeframe.to_string(),
            ts,
        )
    }
}

#[async_trait]
impl BarStore for MemoryBarStore {
    async fn upsert_bars(&self, key: &SeriesKey, bars: &[Bar]) -> Result<usize, StoreError> {
        let mut rows = self.rows.write();
        for bar in bars {
            rows.insert(
                Self::row_key(key, bar.timestamp),
                StoredBar {
                    key: key.clone(),
                    bar: bar.clone(),
                },
            );
        }
        self.rows_written
            .fetch_add(bars.len() as u64, Ordering::Relaxed);
        Ok(bars.len())
    }

    async fn stream_bars(
        &self,
        filter: &SymbolFilter,
        after: Option<&BarCursor>,
        limit: usize,
    ) -> Result<Vec<StoredBar>, StoreError> {
        let rows = self.rows.read();
        let lower = match after {
            Some(c) => Bound::Excluded(c.sort_key()),
            None => Bound::Unbounded,
        };
        Ok(rows
            .range((lower, Bound::Unbounded))
            .map(|(_, r)| r)
            .filter(|r| filter.matches(&r.key))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_bars(&self, filter: &SymbolFilter) -> Result<u64, StoreError> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|r| filter.matches(&r.key))
            .count() as u64)
    }

    async fn timestamps(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let rows = self.rows.read();
        Ok(rows
            .range(Self::row_key(key, start)..Self::row_key(key, end))
            .map(|(k, _)| k.3)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::timeframe::TimeFrame;

    fn bar(ts: DateTime<Utc>, close: i64) -> Bar {
        let c = Decimal::from(close);
        Bar {
            timestamp: ts,
            open: c,
            high: c,
            low: c,
            close: c,
            volume: Decimal::ONE,
            source: "mem".into(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_and_streams_in_key_order() {
        let store = MemoryBarStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let btc = SeriesKey::new("mem", "BTC", TimeFrame::minutes(1).unwrap());
        let eth = SeriesKey::new("mem", "ETH", TimeFrame::minutes(1).unwrap());

        store.upsert_bars(&eth, &[bar(t0, 1)]).await.unwrap();
        store
            .upsert_bars(&btc, &[bar(t0 + Duration::minutes(1), 2), bar(t0, 1)])
            .await
            .unwrap();
        store.upsert_bars(&btc, &[bar(t0, 9)]).await.unwrap();

        assert_eq!(store.count_bars(&SymbolFilter::all()).await.unwrap(), 3);
        assert_eq!(store.series(&btc)[0].close, Decimal::from(9));

        let first = store.stream_bars(&SymbolFilter::all(), None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|r| r.key == btc));
        let rest = store
            .stream_bars(&SymbolFilter::all(), Some(&first[1].cursor()), 2)
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].key, eth);

        let ts = store
            .timestamps(&btc, t0, t0 + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(ts, vec![t0]);
    }
}
