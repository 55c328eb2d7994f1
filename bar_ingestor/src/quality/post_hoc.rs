//! Post-hoc OHLC sweep over bars already in a store.
//!
//! Catches rows persisted before the corrector existed, or written by other
//! tools. The sweep streams the store in keyset pages, so memory stays bounded
//! by `batch_size` however many bars are stored, and only rows that actually
//! change are written back. A second sweep over the same rows is a no-op.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    ingest::locks::{Busy, LockError, LockHolder, LockTable, SymbolLockGuard, lock_key},
    io::sink::{BarStore, StoreError},
    models::{
        bar::Bar,
        request_params::{BarCursor, SeriesKey, StoredBar, SymbolFilter},
    },
    quality::ohlc::{OhlcCorrector, is_consistent},
};

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Busy(#[from] Busy),

    #[error("post-hoc validation lost its symbol lock: {0}")]
    Lock(LockError),

    #[error("store error during post-hoc validation: {0}")]
    Store(#[from] StoreError),
}

impl From<LockError> for ValidateError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Busy(busy) => ValidateError::Busy(busy),
            other => ValidateError::Lock(other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostHocReport {
    pub bars_scanned: u64,
    pub bars_corrected: u64,
    /// Distinct series with at least one corrected bar.
    pub series_touched: u64,
}

pub struct PostHocValidator {
    store: Arc<dyn BarStore>,
    locks: Arc<dyn LockTable>,
    batch_size: usize,
}

impl PostHocValidator {
    pub fn new(store: Arc<dyn BarStore>, locks: Arc<dyn LockTable>, batch_size: usize) -> Self {
        Self {
            store,
            locks,
            batch_size: batch_size.max(1),
        }
    }

    /// Sweeps every stored bar matching `filter`.
    ///
    /// Each `(source, symbol)` is locked the first time the sweep reaches it and
    /// stays locked until the sweep ends. A symbol already held by an ingestion
    /// run aborts the sweep with [`ValidateError::Busy`]; corrections written
    /// before that point stay.
    pub async fn run(&self, filter: &SymbolFilter) -> Result<PostHocReport, ValidateError> {
        let mut guards: HashMap<String, SymbolLockGuard> = HashMap::new();
        self.sweep(filter, Some(&mut guards)).await
    }

    /// Same sweep for a caller that already holds the relevant symbol locks.
    pub(crate) async fn run_locked(
        &self,
        filter: &SymbolFilter,
    ) -> Result<PostHocReport, ValidateError> {
        self.sweep(filter, None).await
    }

    async fn sweep(
        &self,
        filter: &SymbolFilter,
        mut guards: Option<&mut HashMap<String, SymbolLockGuard>>,
    ) -> Result<PostHocReport, ValidateError> {
        let mut report = PostHocReport::default();
        let mut touched: Vec<SeriesKey> = Vec::new();
        let mut corrector = OhlcCorrector::new();
        let mut after: Option<BarCursor> = None;

        loop {
            let page = self
                .store
                .stream_bars(filter, after.as_ref(), self.batch_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.cursor());
            let full_page = page.len() == self.batch_size;

            let mut pending: Vec<(SeriesKey, Vec<Bar>)> = Vec::new();
            for StoredBar { key, mut bar } in page {
                if let Some(guards) = guards.as_deref_mut() {
                    let held_key = lock_key(&key.source, &key.symbol);
                    if !guards.contains_key(&held_key) {
                        let guard = self.locks.try_acquire(
                            &key.source,
                            &key.symbol,
                            LockHolder::PostHocValidation,
                        )?;
                        guards.insert(held_key, guard);
                    }
                }

                report.bars_scanned += 1;
                if corrector.apply(&key.symbol, &mut bar).is_none() {
                    continue;
                }
                debug_assert!(is_consistent(&bar));
                report.bars_corrected += 1;
                if !touched.contains(&key) {
                    touched.push(key.clone());
                }
                match pending.last_mut() {
                    Some((k, bars)) if *k == key => bars.push(bar),
                    _ => pending.push((key, vec![bar])),
                }
            }

            for (key, bars) in &pending {
                self.store.upsert_bars(key, bars).await?;
            }
            if let Some(guards) = guards.as_deref() {
                for guard in guards.values() {
                    guard.renew()?;
                }
            }

            if !full_page {
                break;
            }
        }

        report.series_touched = touched.len() as u64;
        if report.bars_corrected > 0 {
            warn!(
                scanned = report.bars_scanned,
                corrected = report.bars_corrected,
                series = report.series_touched,
                "post-hoc validation rewrote stored bars"
            );
        } else {
            info!(scanned = report.bars_scanned, "post-hoc validation found nothing to correct");
        }
        Ok(report)
    }
}
