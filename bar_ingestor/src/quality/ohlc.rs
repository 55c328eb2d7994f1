//! OHLC consistency correction.
//!
//! A bar is consistent when `high >= max(open, close)`, `low <= min(open, close)`
//! and `volume >= 0` (`high >= low` follows). Correction only ever widens the
//! range: a valid high or low is kept as-is, an invalid one is pulled out to the
//! body edge. Wicks that were already correct survive untouched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::models::bar::Bar;

/// What [`correct`] changed on one bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OhlcCorrection {
    pub timestamp: DateTime<Utc>,
    pub old_high: Decimal,
    pub new_high: Decimal,
    pub old_low: Decimal,
    pub new_low: Decimal,
    /// Original volume when it was negative and clamped to zero.
    pub clamped_volume: Option<Decimal>,
}

impl OhlcCorrection {
    pub fn price_changed(&self) -> bool {
        self.old_high != self.new_high || self.old_low != self.new_low
    }
}

pub fn is_consistent(bar: &Bar) -> bool {
    bar.high >= bar.body_high() && bar.low <= bar.body_low() && bar.volume >= Decimal::ZERO
}

/// Enforces the OHLC invariant in place; `None` when the bar was already consistent.
pub fn correct(bar: &mut Bar) -> Option<OhlcCorrection> {
    let new_high = bar.high.max(bar.body_high());
    let new_low = bar.low.min(bar.body_low());
    let clamped_volume = (bar.volume < Decimal::ZERO).then_some(bar.volume);

    if new_high == bar.high && new_low == bar.low && clamped_volume.is_none() {
        return None;
    }

    let record = OhlcCorrection {
        timestamp: bar.timestamp,
        old_high: bar.high,
        new_high,
        old_low: bar.low,
        new_low,
        clamped_volume,
    };
    bar.high = new_high;
    bar.low = new_low;
    if clamped_volume.is_some() {
        bar.volume = Decimal::ZERO;
    }
    Some(record)
}

/// Stateful wrapper that counts and logs corrections for one run.
#[derive(Debug, Default, Clone)]
pub struct OhlcCorrector {
    corrected: u64,
    volume_clamped: u64,
}

impl OhlcCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, symbol: &str, bar: &mut Bar) -> Option<OhlcCorrection> {
        let fix = correct(bar)?;
        if fix.price_changed() {
            self.corrected += 1;
            info!(
                symbol,
                timestamp = %fix.timestamp,
                old_high = %fix.old_high,
                new_high = %fix.new_high,
                old_low = %fix.old_low,
                new_low = %fix.new_low,
                "OHLC corrected"
            );
        }
        if let Some(volume) = fix.clamped_volume {
            self.volume_clamped += 1;
            info!(symbol, timestamp = %fix.timestamp, %volume, "negative volume clamped to zero");
        }
        Some(fix)
    }

    pub fn corrected(&self) -> u64 {
        self.corrected
    }

    pub fn volume_clamped(&self) -> u64 {
        self.volume_clamped
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn bar(o: &str, h: &str, l: &str, c: &str) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 11, 26, 7, 50, 0).unwrap(),
            open: d(o),
            high: d(h),
            low: d(l),
            close: d(c),
            volume: Decimal::ONE,
            source: "bitunix".into(),
        }
    }

    #[test]
    fn high_below_open_is_raised() {
        let mut b = bar("95289.10", "95289.00", "95245.50", "95245.60");
        let fix = correct(&mut b).unwrap();
        assert_eq!(b.high, d("95289.10"));
        assert_eq!(b.low, d("95245.50"));
        assert_eq!(fix.old_high, d("95289.00"));
        assert!(is_consistent(&b));
    }

    #[test]
    fn low_above_close_is_lowered() {
        let mut b = bar("100", "105", "99.5", "99");
        correct(&mut b).unwrap();
        assert_eq!(b.low, d("99"));
        assert_eq!(b.high, d("105"));
    }

    #[test]
    fn inverted_high_and_low_collapse_onto_body() {
        // high below the body, low above it: neither raw extreme survives
        let mut b = bar("100", "95", "105", "102");
        let fix = correct(&mut b).unwrap();
        assert_eq!(b.high, d("102"));
        assert_eq!(b.low, d("100"));
        assert_eq!((fix.old_high, fix.old_low), (d("95"), d("105")));
        assert!(is_consistent(&b));
    }

    #[test]
    fn consistent_bar_is_untouched() {
        let mut b = bar("100", "110", "90", "105");
        let before = b.clone();
        assert!(correct(&mut b).is_none());
        assert_eq!(b, before);
    }

    #[test]
    fn negative_volume_clamped_and_counted() {
        let mut b = bar("100", "110", "90", "105");
        b.volume = d("-3");
        let mut corrector = OhlcCorrector::new();
        let fix = corrector.apply("BTCUSDT", &mut b).unwrap();
        assert_eq!(b.volume, Decimal::ZERO);
        assert_eq!(fix.clamped_volume, Some(d("-3")));
        assert_eq!(corrector.volume_clamped(), 1);
        assert_eq!(corrector.corrected(), 0);
    }

    fn price() -> impl Strategy<Value = Decimal> {
        (1i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    proptest! {
        #[test]
        fn correction_always_yields_consistent_bar(
            o in price(), h in price(), l in price(), c in price(), v in -1000i64..1000
        ) {
            let mut b = Bar {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                open: o, high: h, low: l, close: c,
                volume: Decimal::from(v),
                source: "p".into(),
            };
            correct(&mut b);
            prop_assert!(is_consistent(&b));
            prop_assert!(b.high >= b.low);
            // never narrows
            prop_assert!(b.high >= h);
            prop_assert!(b.low <= l);
            prop_assert_eq!(b.open, o);
            prop_assert_eq!(b.close, c);
        }

        #[test]
        fn valid_wicks_are_preserved(o in price(), c in price(), up in 0i64..10_000, down in 0i64..10_000) {
            let body_hi = o.max(c);
            let body_lo = o.min(c);
            let h = body_hi + Decimal::new(up, 2);
            let l = body_lo - Decimal::new(down, 2);
            let mut b = Bar {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                open: o, high: h, low: l, close: c,
                volume: Decimal::ONE,
                source: "p".into(),
            };
            prop_assert!(correct(&mut b).is_none());
            prop_assert_eq!(b.high, h);
            prop_assert_eq!(b.low, l);
        }
    }
}
