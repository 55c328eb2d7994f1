use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::{
    cli::params::{ParamsError, TimeRangeArgs, resolve_range},
    models::{
        asset::AssetClass,
        request_params::{IngestRequest, SeriesKey, SymbolFilter},
        timeframe::TimeFrame,
        tz::DstPolicy,
    },
};

/// Backfill one symbol.
#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Exchange symbol, e.g. BTCUSDT
    #[arg(long)]
    pub symbol: String,

    /// Bar interval: 1m, 5m, 15m, 1h, 4h, 1D, 1W, 1M
    #[arg(long, default_value = "1m")]
    pub timeframe: TimeFrame,

    /// Start: RFC-3339, or a local time together with --tz
    #[arg(long, conflicts_with = "days")]
    pub start: Option<String>,

    /// End (exclusive); defaults to the start of the current bar
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Ingest the last N days instead of --start/--end
    #[arg(long)]
    pub days: Option<u32>,

    /// IANA zone for naive --start/--end values (e.g. Asia/Singapore)
    #[arg(long)]
    pub tz: Option<String>,

    /// DST resolution for local times: strict, earliest, latest, shift
    #[arg(long, default_value = "strict")]
    pub dst: DstPolicy,

    /// crypto, us_equity or futures; selects bad-tick tuning
    #[arg(long, default_value = "crypto")]
    pub asset_class: AssetClass,

    /// Skip the bad-tick filter for this run
    #[arg(long)]
    pub no_bad_tick_filter: bool,

    /// Skip the post-hoc sweep after this run
    #[arg(long)]
    pub no_post_hoc: bool,
}

impl IngestArgs {
    pub fn to_request(&self, now: DateTime<Utc>) -> Result<IngestRequest, ParamsError> {
        let (start, end) = resolve_range(
            &TimeRangeArgs {
                start: self.start.as_deref(),
                end: self.end.as_deref(),
                days: self.days,
                tz: self.tz.as_deref(),
                dst: self.dst,
            },
            self.timeframe,
            now,
        )?;
        let mut request = IngestRequest::new(self.symbol.trim(), self.timeframe, start, end)
            .with_asset_class(self.asset_class);
        if self.no_bad_tick_filter {
            request = request.with_bad_tick_filter(false);
        }
        if self.no_post_hoc {
            request = request.with_post_hoc(false);
        }
        Ok(request)
    }
}

/// Where batch items are read from.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchSource {
    File,
    Json,
    Stdin,
}

/// Backfill several symbols from a JSON list of items.
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Source of batch parameters: file, json or stdin
    #[arg(long, value_enum, default_value = "stdin")]
    pub source: BatchSource,

    /// Path to a JSON file (source=file) or an inline JSON string (source=json)
    #[arg(long)]
    pub input: Option<String>,
}

/// Re-apply the OHLC correction to stored bars.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Only bars from this provider
    #[arg(long)]
    pub source: Option<String>,

    #[arg(long)]
    pub symbol: Option<String>,

    #[arg(long)]
    pub timeframe: Option<TimeFrame>,
}

impl ValidateArgs {
    pub fn filter(&self) -> SymbolFilter {
        SymbolFilter {
            source: self.source.as_ref().map(|s| s.trim().to_string()),
            symbol: self.symbol.as_ref().map(|s| s.trim().to_string()),
            timeframe: self.timeframe,
        }
    }
}

/// Report bucket ranges missing from the store.
#[derive(Args, Debug, Clone)]
pub struct GapsArgs {
    #[arg(long)]
    pub symbol: String,

    #[arg(long, default_value = "1m")]
    pub timeframe: TimeFrame,

    /// Provider code the bars were stored under
    #[arg(long, default_value = "bitunix")]
    pub source: String,

    #[arg(long, conflicts_with = "days")]
    pub start: Option<String>,

    #[arg(long, requires = "start")]
    pub end: Option<String>,

    #[arg(long)]
    pub days: Option<u32>,

    #[arg(long)]
    pub tz: Option<String>,

    #[arg(long, default_value = "strict")]
    pub dst: DstPolicy,
}

impl GapsArgs {
    pub fn to_window(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(SeriesKey, DateTime<Utc>, DateTime<Utc>), ParamsError> {
        let (start, end) = resolve_range(
            &TimeRangeArgs {
                start: self.start.as_deref(),
                end: self.end.as_deref(),
                days: self.days,
                tz: self.tz.as_deref(),
                dst: self.dst,
            },
            self.timeframe,
            now,
        )?;
        let key = SeriesKey::new(self.source.trim(), self.symbol.trim(), self.timeframe);
        Ok((key, start, end))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        ingest: IngestArgs,
    }

    #[test]
    fn ingest_args_to_request() {
        let h = Harness::try_parse_from([
            "t",
            "--symbol",
            "BTCUSDT",
            "--timeframe",
            "5m",
            "--start",
            "2024-01-01T00:00:00Z",
            "--end",
            "2024-01-02T00:00:00Z",
            "--no-post-hoc",
        ])
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let req = h.ingest.to_request(now).unwrap();
        assert_eq!(req.timeframe, TimeFrame::minutes(5).unwrap());
        assert_eq!(req.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(req.post_hoc, Some(false));
        assert_eq!(req.bad_tick_filter, None);
    }

    #[test]
    fn gaps_window_from_days() {
        #[derive(Parser)]
        struct GapsHarness {
            #[command(flatten)]
            gaps: GapsArgs,
        }
        let h = GapsHarness::try_parse_from([
            "t", "--symbol", " ETHUSDT ", "--timeframe", "1h", "--days", "2",
        ])
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap();
        let (key, start, end) = h.gaps.to_window(now).unwrap();
        assert_eq!(key.to_string(), "bitunix:ETHUSDT@1h");
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 30, 10, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn days_conflicts_with_start() {
        assert!(
            Harness::try_parse_from([
                "t", "--symbol", "X", "--days", "3", "--start", "2024-01-01"
            ])
            .is_err()
        );
    }
}
