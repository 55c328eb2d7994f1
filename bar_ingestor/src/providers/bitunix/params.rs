use chrono::{DateTime, TimeZone, Utc};

use crate::{
    models::{
        bucket::next_bucket_start,
        request_params::PageRequest,
        timeframe::{TimeFrame, TimeFrameUnit},
    },
    providers::{ProviderError, ValidationSnafu},
};

/// Largest `limit` the kline endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Maps a timeframe to the exchange's interval code, if it offers one.
pub fn interval_for(tf: &TimeFrame) -> Option<&'static str> {
    let code = match (tf.unit(), tf.amount()) {
        (TimeFrameUnit::Minute, 1) => "1m",
        (TimeFrameUnit::Minute, 3) => "3m",
        (TimeFrameUnit::Minute, 5) => "5m",
        (TimeFrameUnit::Minute, 15) => "15m",
        (TimeFrameUnit::Minute, 30) => "30m",
        (TimeFrameUnit::Hour, 1) => "1h",
        (TimeFrameUnit::Hour, 2) => "2h",
        (TimeFrameUnit::Hour, 4) => "4h",
        (TimeFrameUnit::Hour, 6) => "6h",
        (TimeFrameUnit::Hour, 8) => "8h",
        (TimeFrameUnit::Hour, 12) => "12h",
        (TimeFrameUnit::Day, 1) => "1d",
        (TimeFrameUnit::Week, 1) => "1w",
        (TimeFrameUnit::Month, 1) => "1M",
        _ => return None,
    };
    Some(code)
}

/// Start of the page in epoch millis: the cursor if present, else the range start.
pub fn page_start_ms(request: &PageRequest) -> Result<i64, ProviderError> {
    match &request.cursor {
        None => Ok(request.start.timestamp_millis()),
        Some(c) => c.parse::<i64>().map_err(|_| {
            ValidationSnafu {
                message: format!("cursor '{c}' is not an epoch-millis value"),
            }
            .build()
        }),
    }
}

pub fn construct_params(
    request: &PageRequest,
    start_ms: i64,
) -> Result<Vec<(&'static str, String)>, ProviderError> {
    let interval = interval_for(&request.timeframe).ok_or_else(|| {
        ValidationSnafu {
            message: format!("timeframe {} is not offered by bitunix", request.timeframe),
        }
        .build()
    })?;
    if request.symbol.trim().is_empty() {
        return ValidationSnafu {
            message: "symbol must not be empty",
        }
        .fail();
    }
    let limit = request.limit.clamp(1, MAX_PAGE_SIZE);
    Ok(vec![
        ("symbol", request.symbol.trim().to_uppercase()),
        ("interval", interval.to_string()),
        ("startTime", start_ms.to_string()),
        // endTime is inclusive on the exchange side
        ("endTime", (request.end.timestamp_millis() - 1).to_string()),
        ("limit", limit.to_string()),
    ])
}

/// Cursor for the page after one whose latest bar starts at `last`.
///
/// `None` when the page was short or the next bucket is past the range end.
pub fn next_cursor(
    request: &PageRequest,
    last: Option<DateTime<Utc>>,
    page_len: usize,
) -> Option<String> {
    let last = last?;
    if page_len < request.limit.clamp(1, MAX_PAGE_SIZE) as usize {
        return None;
    }
    let next = next_bucket_start(last, request.timeframe);
    (next < request.end).then(|| next.timestamp_millis().to_string())
}

pub fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
