use serde::{Deserialize, Serialize};

use crate::models::{bar::Bar, request_params::SeriesKey, timeframe::TimeFrame};

/// Chronologically ordered bars for one `(source, symbol, timeframe)` series.
///
/// The constructor sorts by timestamp and keeps the last occurrence of any
/// duplicated timestamp, the same outcome a replace-by-key store produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarSequence {
    pub source: String,
    pub symbol: String,
    pub timeframe: TimeFrame,
    bars: Vec<Bar>,
}

impl BarSequence {
    pub fn new(
        source: impl Into<String>,
        symbol: impl Into<String>,
        timeframe: TimeFrame,
        mut bars: Vec<Bar>,
    ) -> Self {
        // stable sort keeps arrival order among equal timestamps
        bars.sort_by_key(|b| b.timestamp);
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self {
            source: source.into(),
            symbol: symbol.into(),
            timeframe,
            bars: deduped,
        }
    }

    pub fn empty(key: &SeriesKey) -> Self {
        Self::new(key.source.clone(), key.symbol.clone(), key.timeframe, Vec::new())
    }

    pub fn key(&self) -> SeriesKey {
        SeriesKey {
            source: self.source.clone(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Mutable access for in-place repair; the slice cannot be reordered or resized.
    pub fn bars_mut(&mut self) -> &mut [Bar] {
        &mut self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Keeps only bars for which `keep` returns true, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&Bar) -> bool) {
        self.bars.retain(keep);
    }
}
