//! UTC bucket mapping for bar timestamps.
//!
//! - One stable epoch: Unix (1970-01-01T00:00:00Z).
//! - Fixed-size frames (minute/hour/day): second-based math.
//! - Week: Monday 00:00:00Z aligned, using a week epoch of 1969-12-29.
//! - Month: linear (year, month) indexing relative to 1970-01.
//!
//! Crypto venues trade around the clock, so every bucket inside a range is
//! expected to hold a bar; no session calendar is applied here.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use crate::models::timeframe::{TimeFrame, TimeFrameUnit};

/// Unix epoch start (1970-01-01T00:00:00Z).
pub const EPOCH_UNIX: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

pub const SECS_PER_MINUTE: i64 = 60;
pub const SECS_PER_HOUR: i64 = 60 * SECS_PER_MINUTE;
pub const SECS_PER_DAY: i64 = 24 * SECS_PER_HOUR;
pub const SECS_PER_WEEK: i64 = 7 * SECS_PER_DAY;

/// shift so Monday 1969-12-29 00:00Z becomes index 0
const WEEK_MONDAY_ANCHOR_OFFSET_SECS: i64 = 3 * SECS_PER_DAY;

/// Bucket id of the interval containing `ts`.
pub fn bucket_id(ts: DateTime<Utc>, tf: TimeFrame) -> i64 {
    let amount = i64::from(tf.amount());
    match tf.unit() {
        TimeFrameUnit::Minute => id_fixed(ts, SECS_PER_MINUTE * amount),
        TimeFrameUnit::Hour => id_fixed(ts, SECS_PER_HOUR * amount),
        TimeFrameUnit::Day => id_fixed(ts, SECS_PER_DAY * amount),
        TimeFrameUnit::Week => {
            (ts.timestamp() + WEEK_MONDAY_ANCHOR_OFFSET_SECS).div_euclid(SECS_PER_WEEK * amount)
        }
        TimeFrameUnit::Month => {
            let idx = (i64::from(ts.year()) - 1970) * 12 + i64::from(ts.month0());
            idx.div_euclid(amount)
        }
    }
}

/// UTC start instant of a bucket.
pub fn bucket_start(id: i64, tf: TimeFrame) -> DateTime<Utc> {
    let amount = i64::from(tf.amount());
    match tf.unit() {
        TimeFrameUnit::Minute => EPOCH_UNIX + Duration::seconds(id * SECS_PER_MINUTE * amount),
        TimeFrameUnit::Hour => EPOCH_UNIX + Duration::seconds(id * SECS_PER_HOUR * amount),
        TimeFrameUnit::Day => EPOCH_UNIX + Duration::seconds(id * SECS_PER_DAY * amount),
        TimeFrameUnit::Week => {
            EPOCH_UNIX + Duration::seconds(id * SECS_PER_WEEK * amount - WEEK_MONDAY_ANCHOR_OFFSET_SECS)
        }
        TimeFrameUnit::Month => {
            let start_idx = id * amount;
            let year = 1970 + start_idx.div_euclid(12);
            let month = start_idx.rem_euclid(12) as u32 + 1;
            // day 1 at midnight always exists in UTC
            Utc.with_ymd_and_hms(year as i32, month, 1, 0, 0, 0)
                .single()
                .unwrap_or(EPOCH_UNIX)
        }
    }
}

/// Exclusive end instant of a bucket (start of the next one).
pub fn bucket_end_exclusive(id: i64, tf: TimeFrame) -> DateTime<Utc> {
    bucket_start(id + 1, tf)
}

/// Start of the bucket containing `ts`.
pub fn align_down(ts: DateTime<Utc>, tf: TimeFrame) -> DateTime<Utc> {
    bucket_start(bucket_id(ts, tf), tf)
}

/// Start of the bucket following the one that contains `ts`.
pub fn next_bucket_start(ts: DateTime<Utc>, tf: TimeFrame) -> DateTime<Utc> {
    bucket_end_exclusive(bucket_id(ts, tf), tf)
}

/// Id one past the last bucket touched by `[.., end)`.
pub fn end_bucket_exclusive(end: DateTime<Utc>, tf: TimeFrame) -> i64 {
    let id = bucket_id(end, tf);
    if bucket_start(id, tf) < end { id + 1 } else { id }
}

/// Number of bars an always-on market produces in `[start, end)`.
///
/// Partial buckets at either edge count as one bar each; an empty or inverted
/// range yields zero.
pub fn expected_bars(tf: TimeFrame, start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    if end <= start {
        return 0;
    }
    let first = bucket_id(start, tf);
    let last = end_bucket_exclusive(end, tf);
    u64::try_from(last - first).unwrap_or(0)
}

fn id_fixed(ts: DateTime<Utc>, bucket_secs: i64) -> i64 {
    ts.signed_duration_since(EPOCH_UNIX)
        .num_seconds()
        .div_euclid(bucket_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn minute_roundtrip() {
        let tf = TimeFrame::minutes(1).unwrap();
        let t = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let id = bucket_id(t, tf);
        assert_eq!(bucket_id(bucket_start(id, tf), tf), id);
        assert_eq!(align_down(t, tf), utc(2025, 1, 2, 3, 4));
    }

    #[test]
    fn week_is_monday_aligned() {
        let tf = TimeFrame::week();
        // 2024-03-14 is a Thursday
        let start = align_down(utc(2024, 3, 14, 12, 0), tf);
        assert_eq!(start, utc(2024, 3, 11, 0, 0));
        assert_eq!(next_bucket_start(start, tf), utc(2024, 3, 18, 0, 0));
    }

    #[test]
    fn month_roundtrip_and_boundaries() {
        let tf = TimeFrame::months(1).unwrap();
        let t = utc(2024, 2, 29, 0, 0); // leap day
        let id = bucket_id(t, tf);
        assert_eq!(bucket_start(id, tf), utc(2024, 2, 1, 0, 0));
        assert_eq!(bucket_end_exclusive(id, tf), utc(2024, 3, 1, 0, 0));
    }

    #[test]
    fn expected_bars_counts_touched_buckets() {
        let m1 = TimeFrame::minutes(1).unwrap();
        let start = utc(2024, 1, 1, 0, 0);
        assert_eq!(expected_bars(m1, start, start + Duration::hours(1)), 60);
        assert_eq!(expected_bars(m1, start, start), 0);
        assert_eq!(expected_bars(m1, start + Duration::hours(1), start), 0);

        // 00:00:30 .. 00:02:10 touches minutes 0, 1 and 2
        let s = start + Duration::seconds(30);
        assert_eq!(expected_bars(m1, s, start + Duration::seconds(130)), 3);

        let d1 = TimeFrame::day();
        assert_eq!(expected_bars(d1, start, utc(2024, 1, 31, 0, 0)), 30);
    }
}
