//! Timestamp parsing at the CLI/config edges.
//!
//! Everything inside the pipeline is UTC. Operators may type either an RFC-3339
//! timestamp with an offset or a naive local time plus an IANA zone; naive times
//! must resolve deterministically under a [`DstPolicy`] or the input is rejected.
//!
//! - "2024-03-10T09:30:00-05:00" -> 2024-03-10T14:30:00Z
//! - New York 2024-11-03 01:30 occurs twice: PreferEarliest -> 05:30Z, PreferLatest -> 06:30Z.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TzError {
    #[error("bad rfc3339 timestamp: {0}")]
    BadTimestamp(String),

    #[error("bad time zone: {0}")]
    BadZone(String),

    #[error("local time {0} is ambiguous in {1}")]
    Ambiguous(NaiveDateTime, Tz),

    #[error("local time {0} does not exist in {1}")]
    Nonexistent(NaiveDateTime, Tz),

    #[error("naive timestamp {0} needs a time zone")]
    MissingZone(String),
}

/// How to resolve local times that fall into a DST transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DstPolicy {
    /// Error on ambiguous (fall-back) and nonexistent (spring-forward) times.
    #[default]
    Strict,
    /// Ambiguous: the earlier instant.
    PreferEarliest,
    /// Ambiguous: the later instant.
    PreferLatest,
    /// Nonexistent: step forward a minute at a time until valid (max 2 hours).
    ShiftForward,
}

impl FromStr for DstPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(DstPolicy::Strict),
            "earliest" | "prefer_earliest" => Ok(DstPolicy::PreferEarliest),
            "latest" | "prefer_latest" => Ok(DstPolicy::PreferLatest),
            "shift" | "shift_forward" => Ok(DstPolicy::ShiftForward),
            other => Err(format!("unknown DST policy '{other}'")),
        }
    }
}

/// RFC-3339 with offset -> UTC.
pub fn parse_ts_to_utc(s: &str) -> Result<DateTime<Utc>, TzError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TzError::BadTimestamp(s.to_string()))
}

pub fn from_local_naive_with_policy(
    naive: NaiveDateTime,
    tz: Tz,
    policy: DstPolicy,
) -> Result<DateTime<Utc>, TzError> {
    use chrono::offset::LocalResult::*;
    match tz.from_local_datetime(&naive) {
        Single(dt) => Ok(dt.with_timezone(&Utc)),
        Ambiguous(a, b) => match policy {
            DstPolicy::PreferEarliest => Ok(a.with_timezone(&Utc)),
            DstPolicy::PreferLatest => Ok(b.with_timezone(&Utc)),
            _ => Err(TzError::Ambiguous(naive, tz)),
        },
        None => {
            if policy == DstPolicy::ShiftForward {
                let mut t = naive;
                for _ in 0..120 {
                    t += chrono::Duration::minutes(1);
                    if let Single(dt) = tz.from_local_datetime(&t) {
                        return Ok(dt.with_timezone(&Utc));
                    }
                }
            }
            Err(TzError::Nonexistent(naive, tz))
        }
    }
}

/// Parses an operator-supplied timestamp.
///
/// RFC-3339 input is converted to UTC and `tz` is ignored. Naive input
/// (`2024-01-02T03:04[:05]`, `2024-01-02 03:04[:05]` or a bare `2024-01-02`
/// meaning midnight) requires `tz`.
pub fn parse_user_ts(
    s: &str,
    tz: Option<Tz>,
    policy: DstPolicy,
) -> Result<DateTime<Utc>, TzError> {
    if let Ok(dt) = parse_ts_to_utc(s) {
        return Ok(dt);
    }
    let naive = parse_naive(s.trim()).ok_or_else(|| TzError::BadTimestamp(s.to_string()))?;
    let tz = tz.ok_or_else(|| TzError::MissingZone(s.to_string()))?;
    from_local_naive_with_policy(naive, tz, policy)
}

pub fn parse_zone(name: &str) -> Result<Tz, TzError> {
    name.trim()
        .parse()
        .map_err(|_| TzError::BadZone(name.to_string()))
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// UTC datetime as RFC-3339 with millisecond precision; the storage text form.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ny() -> Tz {
        parse_zone("America/New_York").unwrap()
    }

    #[test]
    fn rfc3339_offset_to_utc() {
        let got = parse_ts_to_utc("2024-03-10T09:30:00-05:00").unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2024, 3, 10, 14, 30, 0).unwrap());
    }

    #[test]
    fn spring_forward_gap() {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        assert!(matches!(
            from_local_naive_with_policy(naive, ny(), DstPolicy::Strict),
            Err(TzError::Nonexistent(..))
        ));
        let shifted = from_local_naive_with_policy(naive, ny(), DstPolicy::ShiftForward).unwrap();
        assert_eq!(shifted, Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap());
    }

    #[test]
    fn fall_back_ambiguity() {
        let naive = NaiveDate::from_ymd_opt(2024, 11, 3)
            .unwrap()
            .and_hms_opt(1, 30, 0)
            .unwrap();
        assert!(from_local_naive_with_policy(naive, ny(), DstPolicy::Strict).is_err());
        assert_eq!(
            from_local_naive_with_policy(naive, ny(), DstPolicy::PreferEarliest).unwrap(),
            Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap()
        );
        assert_eq!(
            from_local_naive_with_policy(naive, ny(), DstPolicy::PreferLatest).unwrap(),
            Utc.with_ymd_and_hms(2024, 11, 3, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn user_timestamps() {
        let utc = parse_user_ts("2024-01-15T14:30:00Z", None, DstPolicy::Strict).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap());

        let local = parse_user_ts("2024-01-15 09:30", Some(ny()), DstPolicy::Strict).unwrap();
        assert_eq!(local, utc);

        let midnight = parse_user_ts("2024-01-15", Some(Tz::UTC), DstPolicy::Strict).unwrap();
        assert_eq!(midnight, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());

        assert!(matches!(
            parse_user_ts("2024-01-15 09:30", None, DstPolicy::Strict),
            Err(TzError::MissingZone(_))
        ));
        assert!(parse_user_ts("yesterday", Some(ny()), DstPolicy::Strict).is_err());
    }

    #[test]
    fn millis_format() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(to_rfc3339_millis(dt), "2024-01-02T03:04:05.000Z");
    }
}
