use std::collections::VecDeque;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single closed OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time, epoch milliseconds.
    pub open_time: i64,
    /// Bar close time, epoch milliseconds.
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub taker_buy_volume: f64,
}

impl Bar {
    /// Close time as a UTC timestamp. Out-of-range values clamp to the epoch.
    pub fn close_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.close_time)
            .single()
            .unwrap_or_default()
    }

    /// Whether every price field is finite and strictly positive and the
    /// high/low envelope contains open and close.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
            && self.taker_buy_volume.is_finite()
            && self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.close_time >= self.open_time
    }
}

// ---------------------------------------------------------------------------
// BarHistory -- bounded ring of closed bars, oldest first
// ---------------------------------------------------------------------------

/// What `BarHistory::push` did with a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// A new, later bar was appended.
    Appended,
    /// Same `open_time` as the newest bar; the stored bar was overwritten.
    Replaced,
    /// Older than the newest bar; ignored.
    Dropped,
}

/// Bounded history of closed bars for one timeframe.
///
/// A bar with the same `open_time` as the newest stored bar replaces it (late
/// correction from the producer); a bar older than the newest is dropped.
#[derive(Debug, Clone)]
pub struct BarHistory {
    bars: VecDeque<Bar>,
    max_bars: usize,
}

impl BarHistory {
    pub fn new(max_bars: usize) -> Self {
        let max_bars = max_bars.max(1);
        Self {
            bars: VecDeque::with_capacity(max_bars + 1),
            max_bars,
        }
    }

    /// Store a closed bar.
    pub fn push(&mut self, bar: Bar) -> PushOutcome {
        if let Some(last) = self.bars.back_mut() {
            if bar.open_time == last.open_time {
                *last = bar;
                return PushOutcome::Replaced;
            }
            if bar.open_time < last.open_time {
                debug!(
                    open_time = bar.open_time,
                    newest = last.open_time,
                    "out-of-order bar dropped"
                );
                return PushOutcome::Dropped;
            }
        }
        self.bars.push_back(bar);
        while self.bars.len() > self.max_bars {
            self.bars.pop_front();
        }
        PushOutcome::Appended
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// The most recent `count` bars, oldest first.
    pub fn window(&self, count: usize) -> Vec<Bar> {
        let start = self.bars.len().saturating_sub(count);
        self.bars.iter().skip(start).cloned().collect()
    }
}
