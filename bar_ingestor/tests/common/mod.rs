#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bar_ingestor::{
    config::{PipelineConfig, RetryConfig},
    io::{
        memory::MemoryBarStore,
        sink::{BackendSnafu, BarStore, StoreError},
    },
    models::{
        bar::Bar,
        request_params::{BarCursor, BarPage, PageRequest, SeriesKey, StoredBar, SymbolFilter},
    },
    providers::{
        DataProvider, HttpSnafu, ProviderError, ValidationSnafu, static_provider::StaticProvider,
    },
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

pub const SOURCE: &str = "replay";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 26, 0, 0, 0).unwrap()
}

pub fn minute(i: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(i)
}

/// A quiet bar around 100 with volume 100.
pub fn bar(i: i64) -> Bar {
    Bar {
        timestamp: minute(i),
        open: Decimal::from(100),
        high: Decimal::from(101),
        low: Decimal::from(99),
        close: Decimal::from(100),
        volume: Decimal::from(100),
        source: SOURCE.into(),
    }
}

pub fn bars(n: i64) -> Vec<Bar> {
    (0..n).map(bar).collect()
}

/// Defaults with millisecond backoff so retry tests stay fast.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 4,
        },
        ..PipelineConfig::default()
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Fault {
    /// HTTP status; 429 and 5xx are retried.
    Status(u16),
    /// Rejected parameters; never retried.
    Invalid,
}

/// Wraps [`StaticProvider`] with scripted failures keyed by call number (0-based).
pub struct FlakyProvider {
    inner: StaticProvider,
    faults: Mutex<HashMap<usize, Fault>>,
    /// Fail every call from this one on.
    fail_from: Option<(usize, Fault)>,
    calls: AtomicUsize,
    cancel_on_call: Option<(usize, CancellationToken)>,
}

impl FlakyProvider {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            inner: StaticProvider::new(SOURCE, bars),
            faults: Mutex::new(HashMap::new()),
            fail_from: None,
            calls: AtomicUsize::new(0),
            cancel_on_call: None,
        }
    }

    pub fn fail_on(self, call: usize, fault: Fault) -> Self {
        self.faults.lock().insert(call, fault);
        self
    }

    pub fn fail_from(mut self, call: usize, fault: Fault) -> Self {
        self.fail_from = Some((call, fault));
        self
    }

    /// Cancels `token` while serving call `call`; the page itself is still returned.
    pub fn cancel_during(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn fault_error(fault: Fault) -> ProviderError {
    match fault {
        Fault::Status(status) => HttpSnafu {
            status,
            body: "scripted",
        }
        .build(),
        Fault::Invalid => ValidationSnafu {
            message: "scripted",
        }
        .build(),
    }
}

#[async_trait]
impl DataProvider for FlakyProvider {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn fetch_bars(&self, request: &PageRequest) -> Result<BarPage, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((from, fault)) = self.fail_from {
            if call >= from {
                return Err(fault_error(fault));
            }
        }
        if let Some(fault) = self.faults.lock().remove(&call) {
            return Err(fault_error(fault));
        }
        if let Some((at, token)) = &self.cancel_on_call {
            if *at == call {
                token.cancel();
            }
        }
        self.inner.fetch_bars(request).await
    }
}

/// Returns the same non-empty page and the same cursor forever.
pub struct LoopingProvider;

#[async_trait]
impl DataProvider for LoopingProvider {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn fetch_bars(&self, _request: &PageRequest) -> Result<BarPage, ProviderError> {
        Ok(BarPage {
            bars: bars(3),
            next_cursor: Some("same".into()),
        })
    }
}

/// Delegates to a [`MemoryBarStore`] but fails the Nth `upsert_bars` call (0-based).
pub struct FailingStore {
    pub inner: MemoryBarStore,
    fail_on: usize,
    upserts: AtomicUsize,
}

impl FailingStore {
    pub fn new(fail_on: usize) -> Self {
        Self {
            inner: MemoryBarStore::new(),
            fail_on,
            upserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BarStore for FailingStore {
    async fn upsert_bars(&self, key: &SeriesKey, bars: &[Bar]) -> Result<usize, StoreError> {
        if self.upserts.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return BackendSnafu {
                message: "disk full",
            }
            .fail();
        }
        self.inner.upsert_bars(key, bars).await
    }

    async fn stream_bars(
        &self,
        filter: &SymbolFilter,
        after: Option<&BarCursor>,
        limit: usize,
    ) -> Result<Vec<StoredBar>, StoreError> {
        self.inner.stream_bars(filter, after, limit).await
    }

    async fn count_bars(&self, filter: &SymbolFilter) -> Result<u64, StoreError> {
        self.inner.count_bars(filter).await
    }

    async fn timestamps(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        self.inner.timestamps(key, start, end).await
    }
}
