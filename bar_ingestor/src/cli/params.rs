use std::{fs, io::Read};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    cli::commands::BatchSource,
    models::{
        asset::AssetClass,
        bucket::align_down,
        request_params::IngestRequest,
        timeframe::{TimeFrame, TimeFrameError},
        tz::{DstPolicy, TzError, parse_user_ts, parse_zone},
    },
};

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad batch JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Time(#[from] TzError),

    #[error(transparent)]
    TimeFrame(#[from] TimeFrameError),

    #[error("{0}")]
    Invalid(String),
}

/// One element of a batch JSON list.
///
/// ```json
/// [{"symbol": "BTCUSDT", "timeframe": "1m", "days": 7},
///  {"symbol": "ETHUSDT", "timeframe": "1h", "start": "2024-01-01T00:00:00Z", "end": "2024-02-01T00:00:00Z"}]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchParamItem {
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub days: Option<u32>,
    pub tz: Option<String>,
    pub asset_class: Option<String>,
    pub bad_tick_filter: Option<bool>,
    pub post_hoc: Option<bool>,
}

fn default_timeframe() -> String {
    "1m".to_string()
}

/// Time-range flags as typed by the operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeRangeArgs<'a> {
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
    pub days: Option<u32>,
    pub tz: Option<&'a str>,
    pub dst: DstPolicy,
}

/// Resolves operator time flags into a UTC `[start, end)`.
///
/// - `days = N`: `[now - N days, now)`, both ends aligned down to bucket starts.
/// - `start` without `end`: ends at the start of the current bucket.
/// - Naive times need `tz`; RFC-3339 times carry their own offset.
pub fn resolve_range(
    args: &TimeRangeArgs<'_>,
    tf: TimeFrame,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ParamsError> {
    let tz = args.tz.map(parse_zone).transpose()?;
    let (start, end) = match (args.days, args.start) {
        (Some(_), Some(_)) => {
            return Err(ParamsError::Invalid("use either days or start, not both".into()));
        }
        (Some(0), None) => return Err(ParamsError::Invalid("days must be at least 1".into())),
        (Some(days), None) => (
            align_down(now - Duration::days(i64::from(days)), tf),
            align_down(now, tf),
        ),
        (None, Some(start)) => {
            let start = parse_user_ts(start, tz, args.dst)?;
            let end = match args.end {
                Some(end) => parse_user_ts(end, tz, args.dst)?,
                None => align_down(now, tf),
            };
            (start, end)
        }
        (None, None) => return Err(ParamsError::Invalid("a start or a number of days is required".into())),
    };
    if start >= end {
        return Err(ParamsError::Invalid(format!(
            "empty range: start {start} is not before end {end}"
        )));
    }
    Ok((start, end))
}

impl BatchParamItem {
    pub fn to_request(&self, now: DateTime<Utc>) -> Result<IngestRequest, ParamsError> {
        let tf: TimeFrame = self.timeframe.parse()?;
        let (start, end) = resolve_range(
            &TimeRangeArgs {
                start: self.start.as_deref(),
                end: self.end.as_deref(),
                days: self.days,
                tz: self.tz.as_deref(),
                dst: DstPolicy::Strict,
            },
            tf,
            now,
        )?;
        let asset_class = match &self.asset_class {
            Some(s) => s.parse::<AssetClass>().map_err(ParamsError::Invalid)?,
            None => AssetClass::default(),
        };
        let mut request =
            IngestRequest::new(self.symbol.trim(), tf, start, end).with_asset_class(asset_class);
        request.bad_tick_filter = self.bad_tick_filter;
        request.post_hoc = self.post_hoc;
        Ok(request)
    }
}

pub fn parse_batch_params_from_json_value(
    json_value: Value,
    now: DateTime<Utc>,
) -> Result<Vec<IngestRequest>, ParamsError> {
    let items: Vec<BatchParamItem> = serde_json::from_value(json_value)?;
    items.iter().map(|item| item.to_request(now)).collect()
}

pub fn parse_batch_params_from_json_string(
    json_str: &str,
    now: DateTime<Utc>,
) -> Result<Vec<IngestRequest>, ParamsError> {
    parse_batch_params_from_json_value(serde_json::from_str(json_str)?, now)
}

pub fn parse_batch_params_from_file(
    file_path: &str,
    now: DateTime<Utc>,
) -> Result<Vec<IngestRequest>, ParamsError> {
    let content = fs::read_to_string(file_path)?;
    parse_batch_params_from_json_string(&content, now)
}

pub fn parse_batch_params_from_stdin(now: DateTime<Utc>) -> Result<Vec<IngestRequest>, ParamsError> {
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    parse_batch_params_from_json_string(&buffer, now)
}

/// Dispatches on `--source`; `input` is required for `file` and `json`.
pub fn load_batch_params(
    source: BatchSource,
    input: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<IngestRequest>, ParamsError> {
    let need_input = || {
        input.ok_or_else(|| ParamsError::Invalid("--input is required for this --source".into()))
    };
    match source {
        BatchSource::File => parse_batch_params_from_file(need_input()?, now),
        BatchSource::Json => parse_batch_params_from_json_string(need_input()?, now),
        BatchSource::Stdin => parse_batch_params_from_stdin(now),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 34, 56).unwrap()
    }

    #[test]
    fn days_are_bucket_aligned() {
        let tf = TimeFrame::hours(1).unwrap();
        let (s, e) = resolve_range(
            &TimeRangeArgs {
                days: Some(2),
                ..TimeRangeArgs::default()
            },
            tf,
            now(),
        )
        .unwrap();
        assert_eq!(e, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        assert_eq!(s, Utc.with_ymd_and_hms(2024, 5, 30, 12, 0, 0).unwrap());
    }

    #[test]
    fn local_times_need_a_zone() {
        let tf = TimeFrame::minutes(1).unwrap();
        let naive = TimeRangeArgs {
            start: Some("2024-01-15 09:30"),
            end: Some("2024-01-15 10:30"),
            ..TimeRangeArgs::default()
        };
        assert!(matches!(
            resolve_range(&naive, tf, now()),
            Err(ParamsError::Time(TzError::MissingZone(_)))
        ));
        let zoned = TimeRangeArgs {
            tz: Some("America/New_York"),
            ..naive
        };
        let (s, _) = resolve_range(&zoned, tf, now()).unwrap();
        assert_eq!(s, Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap());
    }

    #[test]
    fn empty_and_missing_ranges_are_rejected() {
        let tf = TimeFrame::minutes(1).unwrap();
        let inverted = TimeRangeArgs {
            start: Some("2024-01-02T00:00:00Z"),
            end: Some("2024-01-01T00:00:00Z"),
            ..TimeRangeArgs::default()
        };
        assert!(resolve_range(&inverted, tf, now()).is_err());
        assert!(resolve_range(&TimeRangeArgs::default(), tf, now()).is_err());
    }

    #[test]
    fn batch_json_string() {
        let json = r#"[
            {"symbol": "BTCUSDT", "timeframe": "1m", "days": 1},
            {"symbol": "ETHUSDT", "timeframe": "4h",
             "start": "2024-01-01T00:00:00Z", "end": "2024-02-01T00:00:00Z",
             "asset_class": "crypto", "bad_tick_filter": false}
        ]"#;
        let reqs = parse_batch_params_from_json_string(json, now()).unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].symbol, "BTCUSDT");
        assert_eq!(reqs[0].end, Utc.with_ymd_and_hms(2024, 6, 1, 12, 34, 0).unwrap());
        assert_eq!(reqs[1].timeframe, TimeFrame::hours(4).unwrap());
        assert_eq!(reqs[1].bad_tick_filter, Some(false));
    }

    #[test]
    fn batch_item_with_bad_timeframe_fails() {
        let json = r#"[{"symbol": "BTCUSDT", "timeframe": "7D", "days": 1}]"#;
        assert!(matches!(
            parse_batch_params_from_json_string(json, now()),
            Err(ParamsError::TimeFrame(_))
        ));
    }

    #[test]
    fn batch_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"symbol": "SOLUSDT", "days": 3}}]"#).unwrap();
        let reqs = load_batch_params(
            BatchSource::File,
            Some(file.path().to_str().unwrap()),
            now(),
        )
        .unwrap();
        assert_eq!(reqs[0].symbol, "SOLUSDT");
        assert!(load_batch_params(BatchSource::Json, None, now()).is_err());
    }
}
