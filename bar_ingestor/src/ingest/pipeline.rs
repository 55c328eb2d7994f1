//! Batched historical ingestion: fetch, correct, filter, persist, report.
//!
//! One run handles one `(source, symbol, timeframe)` range, strictly one page at
//! a time. Every page is persisted before the next is requested, so a failure
//! part-way loses nothing already saved and the error says where to resume.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::PipelineConfig,
    errors::IngestError,
    ingest::{
        locks::{LockError, LockHolder, LockTable},
        progress::{ProgressSink, ProgressUpdate, batch_percent},
        retry::{RetryOutcome, RetryPolicy, with_retry},
    },
    io::sink::BarStore,
    models::{
        bar::Bar,
        bar_sequence::BarSequence,
        bucket::{expected_bars, next_bucket_start},
        request_params::{BarPage, IngestRequest, PageRequest, SeriesKey, SymbolFilter},
    },
    providers::DataProvider,
    quality::{
        bad_tick::BadTickFilter,
        ohlc::OhlcCorrector,
        post_hoc::{PostHocReport, PostHocValidator},
    },
};

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub key: Option<SeriesKey>,
    /// Bars received from the provider and inspected.
    pub bars_fetched: u64,
    pub ohlc_corrected: u64,
    pub volume_clamped: u64,
    pub bad_ticks_flagged: u64,
    pub bad_ticks_repaired: u64,
    pub bad_ticks_excluded: u64,
    pub bars_persisted: u64,
    /// Pages that returned bars.
    pub batches: u64,
    pub expected_bars: u64,
    pub first_bar: Option<DateTime<Utc>>,
    pub last_bar: Option<DateTime<Utc>>,
    pub post_hoc: Option<PostHocReport>,
}

pub struct IngestionPipeline {
    provider: Arc<dyn DataProvider>,
    store: Arc<dyn BarStore>,
    config: PipelineConfig,
    locks: Arc<dyn LockTable>,
    retry: RetryPolicy,
}

impl IngestionPipeline {
    pub fn new(
        provider: Arc<dyn DataProvider>,
        store: Arc<dyn BarStore>,
        config: PipelineConfig,
        locks: Arc<dyn LockTable>,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            provider,
            store,
            config,
            locks,
            retry,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn source(&self) -> &str {
        self.provider.source()
    }

    /// Backfills `request` into the store.
    ///
    /// Holds the symbol's advisory lock for the whole run, including the
    /// optional post-hoc sweep at the end, and renews it after every batch. Cancellation is checked before each
    /// page request; a request already in flight is allowed to finish.
    pub async fn ingest(
        &self,
        request: &IngestRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<IngestionReport, IngestError> {
        let symbol = request.symbol.trim().to_string();
        if symbol.is_empty() {
            return Err(IngestError::InvalidRequest("symbol must not be empty".into()));
        }
        if request.start >= request.end {
            return Err(IngestError::InvalidRequest(format!(
                "start {} must be before end {}",
                request.start, request.end
            )));
        }

        let source = self.provider.source().to_string();
        let guard = match self
            .locks
            .try_acquire(&source, &symbol, LockHolder::Ingestion)
        {
            Ok(guard) => guard,
            Err(LockError::Busy(busy)) => return Err(IngestError::Busy(busy)),
            Err(source_err) => {
                return Err(IngestError::Lock {
                    symbol,
                    bars_persisted: 0,
                    resume_from: request.start,
                    source: source_err,
                });
            }
        };

        let tf = request.timeframe;
        let key = SeriesKey::new(source.clone(), symbol.clone(), tf);
        let page_size = self.config.page_size.max(1);
        let expected_total = expected_bars(tf, request.start, request.end);
        let estimated_batches = expected_total.div_ceil(u64::from(page_size));

        let filter = request
            .bad_tick_filter
            .unwrap_or(self.config.enable_bad_tick_filter)
            .then(|| BadTickFilter::new(self.config.bad_tick_settings(request.asset_class)));
        let context_len = filter
            .as_ref()
            .map_or(0, |f| f.settings().rolling_window);

        info!(
            series = %key,
            start = %request.start,
            end = %request.end,
            expected_bars = expected_total,
            estimated_batches,
            bad_tick_filter = filter.is_some(),
            "ingestion started"
        );

        let mut report = IngestionReport {
            key: Some(key.clone()),
            expected_bars: expected_total,
            ..IngestionReport::default()
        };
        let mut corrector = OhlcCorrector::new();
        let mut context: Vec<Bar> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors: HashSet<String> = HashSet::new();
        let mut resume_from = request.start;
        let mut batch = 0u64;

        loop {
            if cancel.is_cancelled() {
                warn!(series = %key, bars_persisted = report.bars_persisted, %resume_from, "ingestion cancelled");
                return Err(IngestError::Cancelled {
                    symbol,
                    bars_persisted: report.bars_persisted,
                    resume_from,
                });
            }
            batch += 1;

            let page_request = PageRequest {
                symbol: symbol.clone(),
                timeframe: tf,
                start: request.start,
                end: request.end,
                cursor: cursor.clone(),
                limit: page_size,
            };
            let what = format!("{key} batch {batch}");
            let page = match with_retry(&self.retry, &what, cancel, || {
                self.provider.fetch_bars(&page_request)
            })
            .await
            {
                RetryOutcome::Done { value, .. } => value,
                RetryOutcome::Failed { error, attempts } => {
                    error!(
                        series = %key,
                        batch,
                        attempts,
                        bars_persisted = report.bars_persisted,
                        %resume_from,
                        %error,
                        "ingestion failed"
                    );
                    return Err(IngestError::Fetch {
                        symbol,
                        batch,
                        attempts,
                        bars_persisted: report.bars_persisted,
                        resume_from,
                        source: error,
                    });
                }
                RetryOutcome::Cancelled { .. } => {
                    warn!(series = %key, bars_persisted = report.bars_persisted, %resume_from, "ingestion cancelled during backoff");
                    return Err(IngestError::Cancelled {
                        symbol,
                        bars_persisted: report.bars_persisted,
                        resume_from,
                    });
                }
            };

            let BarPage { bars, next_cursor } = page;
            if bars.is_empty() {
                if next_cursor.is_some() {
                    warn!(series = %key, batch, "provider returned an empty page with a cursor; stopping");
                }
                break;
            }
            report.batches += 1;
            report.bars_fetched += bars.len() as u64;

            let stamped: Vec<Bar> = bars
                .into_iter()
                .map(|b| Bar {
                    source: source.clone(),
                    ..b
                })
                .collect();
            let mut seq = BarSequence::new(source.clone(), symbol.clone(), tf, stamped);
            seq.retain(|b| b.timestamp >= request.start && b.timestamp < request.end);

            for bar in seq.bars_mut() {
                corrector.apply(&symbol, bar);
            }

            if let Some(filter) = &filter {
                let outcome = filter.apply_with_context(&context, seq);
                report.bad_ticks_flagged += outcome.flagged;
                report.bad_ticks_repaired += outcome.repaired;
                report.bad_ticks_excluded += outcome.excluded;
                seq = outcome.sequence;
            }

            if !seq.is_empty() {
                match self.store.upsert_bars(&key, seq.bars()).await {
                    Ok(n) => report.bars_persisted += n as u64,
                    Err(source_err) => {
                        error!(
                            series = %key,
                            batch,
                            bars_persisted = report.bars_persisted,
                            %resume_from,
                            error = %source_err,
                            "persisting batch failed"
                        );
                        return Err(IngestError::Store {
                            symbol,
                            batch,
                            bars_persisted: report.bars_persisted,
                            resume_from,
                            source: source_err,
                        });
                    }
                }
            }

            if let (Some(first), Some(last)) = (seq.first(), seq.last()) {
                report.first_bar.get_or_insert(first.timestamp);
                report.last_bar = Some(last.timestamp);
                resume_from = next_bucket_start(last.timestamp, tf);
            }

            if context_len > 0 {
                context.extend(seq.into_bars());
                let excess = context.len().saturating_sub(context_len);
                context.drain(..excess);
            }

            if let Err(source_err) = guard.renew() {
                error!(series = %key, batch, bars_persisted = report.bars_persisted, %resume_from, "symbol lock lost; stopping");
                return Err(IngestError::Lock {
                    symbol,
                    bars_persisted: report.bars_persisted,
                    resume_from,
                    source: source_err,
                });
            }

            progress.on_progress(&ProgressUpdate {
                symbol: symbol.clone(),
                batch_number: batch,
                bars_so_far: report.bars_persisted,
                estimated_total: expected_total,
                percent: batch_percent(batch, estimated_batches),
                message: format!("batch {batch}: {} bars saved", report.bars_persisted),
            });

            match next_cursor {
                None => break,
                Some(next) => {
                    if !seen_cursors.insert(next.clone()) {
                        warn!(series = %key, batch, cursor = %next, "provider repeated a cursor; stopping");
                        break;
                    }
                    cursor = Some(next);
                }
            }
        }

        report.ohlc_corrected = corrector.corrected();
        report.volume_clamped = corrector.volume_clamped();

        progress.on_progress(&ProgressUpdate {
            symbol: symbol.clone(),
            batch_number: batch,
            bars_so_far: report.bars_persisted,
            estimated_total: expected_total,
            percent: 100,
            message: format!("done: {} bars saved", report.bars_persisted),
        });

        if request
            .post_hoc
            .unwrap_or(self.config.enable_ohlc_validation_post_hoc)
        {
            let validator = PostHocValidator::new(
                Arc::clone(&self.store),
                Arc::clone(&self.locks),
                self.config.post_hoc_batch_size,
            );
            let post = validator
                .run_locked(&SymbolFilter::series(&key))
                .await
                .map_err(|source| IngestError::PostHoc {
                    symbol: symbol.clone(),
                    bars_persisted: report.bars_persisted,
                    source,
                })?;
            report.post_hoc = Some(post);
        }

        info!(
            series = %key,
            fetched = report.bars_fetched,
            persisted = report.bars_persisted,
            batches = report.batches,
            ohlc_corrected = report.ohlc_corrected,
            volume_clamped = report.volume_clamped,
            bad_ticks_flagged = report.bad_ticks_flagged,
            bad_ticks_repaired = report.bad_ticks_repaired,
            bad_ticks_excluded = report.bad_ticks_excluded,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Runs `requests` one after another; a failing request does not stop the rest.
    ///
    /// Results are keyed `symbol@timeframe` in request order.
    pub async fn ingest_many(
        &self,
        requests: &[IngestRequest],
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> IndexMap<String, Result<IngestionReport, IngestError>> {
        let mut results = IndexMap::with_capacity(requests.len());
        for request in requests {
            let label = format!("{}@{}", request.symbol.trim(), request.timeframe);
            let outcome = self.ingest(request, progress, cancel).await;
            if let Err(e) = &outcome {
                warn!(request = %label, error = %e, "batch item failed; continuing");
            }
            results.insert(label, outcome);
        }
        results
    }
}
