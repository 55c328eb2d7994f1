//! Bad-tick detection and repair.
//!
//! A bar is *suspect* when one of its wicks is extreme relative to the body edge
//! it hangs off and the bar's volume does not confirm the move:
//!
//! - upper wick `high - max(open, close)` over `max(open, close)`,
//!   lower wick `min(open, close) - low` over `min(open, close)`, both in percent,
//!   extreme above `wick_threshold_pct`;
//! - unconfirmed when `volume < rolling_avg_volume * volume_confirmation_margin`.
//!
//! The rolling average covers the `rolling_window` bars before the one being
//! classified. Bars too early in the sequence to have a full window use the
//! first `rolling_window + 1` bars, minus themselves. Averages always read raw
//! volumes, so repairs earlier in the pass do not feed back into later ones.
//!
//! Only the extreme side of a suspect bar is rewritten; open, close, volume and
//! the other wick are left alone. Repaired values are clamped back to the body
//! so the OHLC invariant still holds, and a repair never widens the range.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{bar::Bar, bar_sequence::BarSequence};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// What to do with a suspect bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMode {
    /// Linear interpolation between the nearest clean neighbours.
    #[default]
    Interpolate,
    /// Previous clean bar's value (next clean bar for a leading suspect).
    ForwardFill,
    /// Drop the bar, leaving a gap in the series.
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadTickSettings {
    pub wick_threshold_pct: Decimal,
    pub volume_confirmation_margin: Decimal,
    pub rolling_window: usize,
    pub repair_mode: RepairMode,
}

impl Default for BadTickSettings {
    fn default() -> Self {
        Self {
            wick_threshold_pct: Decimal::TEN,
            volume_confirmation_margin: Decimal::TWO,
            rolling_window: 20,
            repair_mode: RepairMode::Interpolate,
        }
    }
}

/// Result of one filter pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub sequence: BarSequence,
    pub flagged: u64,
    pub repaired: u64,
    pub excluded: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ExtremeSides {
    upper: bool,
    lower: bool,
}

impl ExtremeSides {
    fn any(&self) -> bool {
        self.upper || self.lower
    }
}

#[derive(Debug, Clone)]
pub struct BadTickFilter {
    settings: BadTickSettings,
}

impl BadTickFilter {
    pub fn new(settings: BadTickSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BadTickSettings {
        &self.settings
    }

    pub fn apply(&self, sequence: BarSequence) -> FilterOutcome {
        self.apply_with_context(&[], sequence)
    }

    /// Filters `sequence`, using the tail of `context` (bars immediately before
    /// it, already filtered) as volume history and left-hand repair neighbours.
    /// Context bars are never classified or returned.
    pub fn apply_with_context(&self, context: &[Bar], sequence: BarSequence) -> FilterOutcome {
        let window = self.settings.rolling_window.max(1);
        let ctx = &context[context.len().saturating_sub(window)..];
        let n_ctx = ctx.len();

        if n_ctx + sequence.len() <= window {
            return FilterOutcome {
                sequence,
                flagged: 0,
                repaired: 0,
                excluded: 0,
            };
        }

        let source = sequence.source.clone();
        let symbol = sequence.symbol.clone();
        let timeframe = sequence.timeframe;
        let mut all: Vec<Bar> = ctx.to_vec();
        all.extend(sequence.into_bars());
        let volumes: Vec<Decimal> = all.iter().map(|b| b.volume).collect();

        let mut sides = vec![ExtremeSides::default(); all.len()];
        for i in n_ctx..all.len() {
            let bar = &all[i];
            let extreme = self.extreme_sides(bar);
            if !extreme.any() {
                continue;
            }
            let avg = reference_volume(&volumes, i, window);
            let confirmation = avg * self.settings.volume_confirmation_margin;
            if bar.volume < confirmation {
                sides[i] = extreme;
                debug!(
                    symbol = %symbol,
                    timestamp = %bar.timestamp,
                    volume = %bar.volume,
                    avg_volume = %avg,
                    "bad tick flagged"
                );
            }
        }

        let flagged = sides.iter().filter(|s| s.any()).count() as u64;
        let mut repaired = 0u64;
        let mut excluded = 0u64;

        let mode = self.settings.repair_mode;
        let mut keep = vec![true; all.len()];
        if mode == RepairMode::Exclude {
            for (i, s) in sides.iter().enumerate() {
                if s.any() {
                    keep[i] = false;
                    excluded += 1;
                    warn!(
                        symbol = %symbol,
                        timestamp = %all[i].timestamp,
                        "bad tick excluded; series has a gap here"
                    );
                }
            }
        } else {
            let originals = all.clone();
            for i in n_ctx..all.len() {
                let s = sides[i];
                if !s.any() {
                    continue;
                }
                let (high, low) = repair_values(&originals, &sides, i, s, mode);
                let bar = &mut all[i];
                let old_high = bar.high;
                let old_low = bar.low;
                if let Some(h) = high {
                    bar.high = h;
                }
                if let Some(l) = low {
                    bar.low = l;
                }
                repaired += 1;
                info!(
                    symbol = %symbol,
                    timestamp = %bar.timestamp,
                    %old_high,
                    new_high = %bar.high,
                    %old_low,
                    new_low = %bar.low,
                    mode = ?mode,
                    "bad tick repaired"
                );
            }
        }

        let bars: Vec<Bar> = all
            .into_iter()
            .zip(keep)
            .skip(n_ctx)
            .filter_map(|(b, k)| k.then_some(b))
            .collect();

        FilterOutcome {
            sequence: BarSequence::new(source, symbol, timeframe, bars),
            flagged,
            repaired,
            excluded,
        }
    }

    fn extreme_sides(&self, bar: &Bar) -> ExtremeSides {
        let threshold = self.settings.wick_threshold_pct;
        let body_high = bar.body_high();
        let body_low = bar.body_low();
        ExtremeSides {
            upper: body_high > Decimal::ZERO
                && bar.upper_wick() * HUNDRED / body_high > threshold,
            lower: body_low > Decimal::ZERO
                && bar.lower_wick() * HUNDRED / body_low > threshold,
        }
    }
}

/// Mean volume bar `i` is compared against.
///
/// Callers guarantee `volumes.len() > window`.
pub(crate) fn reference_volume(volumes: &[Decimal], i: usize, window: usize) -> Decimal {
    let (sum, count) = if i >= window {
        (volumes[i - window..i].iter().copied().sum::<Decimal>(), window)
    } else {
        let head = &volumes[..=window];
        (head.iter().copied().sum::<Decimal>() - volumes[i], window)
    };
    sum / Decimal::from(count as u64)
}

/// New `(high, low)` for the extreme sides of suspect bar `i`; `None` leaves a side alone.
fn repair_values(
    bars: &[Bar],
    sides: &[ExtremeSides],
    i: usize,
    extreme: ExtremeSides,
    mode: RepairMode,
) -> (Option<Decimal>, Option<Decimal>) {
    let clean = |j: &usize| !sides[*j].any();
    let prev = (0..i).rev().find(clean);
    let next = (i + 1..bars.len()).find(clean);
    let bar = &bars[i];

    let pick = |value: fn(&Bar) -> Decimal| -> Option<Decimal> {
        match mode {
            RepairMode::Interpolate => match (prev, next) {
                (Some(p), Some(n)) => {
                    let (vp, vn) = (value(&bars[p]), value(&bars[n]));
                    let frac = Decimal::from((i - p) as u64) / Decimal::from((n - p) as u64);
                    Some(vp + (vn - vp) * frac)
                }
                (Some(j), None) | (None, Some(j)) => Some(value(&bars[j])),
                (None, None) => None,
            },
            RepairMode::ForwardFill => prev.or(next).map(|j| value(&bars[j])),
            RepairMode::Exclude => None,
        }
    };

    let high = extreme.upper.then(|| {
        let candidate = pick(|b: &Bar| b.high).unwrap_or(bar.body_high());
        candidate.max(bar.body_high()).min(bar.high)
    });
    let low = extreme.lower.then(|| {
        let candidate = pick(|b: &Bar| b.low).unwrap_or(bar.body_low());
        candidate.min(bar.body_low()).max(bar.low)
    });
    (high, low)
}
