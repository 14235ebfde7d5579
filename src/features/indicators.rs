// =============================================================================
// Indicators — pure functions over closed bars
// =============================================================================
//
// Every function returns `Option` so insufficient history or degenerate input
// (zero prices, non-finite intermediates) surfaces as "no value" instead of a
// silently wrong number. Wilder smoothing is used for RSI, ATR and ADX.
// =============================================================================

use crate::market_data::Bar;

/// Latest EMA value, seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut acc = values[..period].iter().sum::<f64>() / period as f64;
    for &v in &values[period..] {
        acc = v * k + acc * (1.0 - k);
    }
    acc.is_finite().then_some(acc)
}

/// Latest RSI in [0, 100]. A window with no losses reads 100.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let p = period as f64;
    let mut avg_gain = deltas[..period].iter().map(|d| d.max(0.0)).sum::<f64>() / p;
    let mut avg_loss = deltas[..period].iter().map(|d| (-d).max(0.0)).sum::<f64>() / p;
    for &d in &deltas[period..] {
        avg_gain = (avg_gain * (p - 1.0) + d.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-d).max(0.0)) / p;
    }
    let value = if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    value.is_finite().then_some(value)
}

fn true_range(bar: &Bar, prev_close: f64) -> f64 {
    (bar.high - bar.low)
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

/// Latest ATR (Wilder).
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let trs: Vec<f64> = bars
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect();
    let p = period as f64;
    let mut value = trs[..period].iter().sum::<f64>() / p;
    for &tr in &trs[period..] {
        value = (value * (p - 1.0) + tr) / p;
    }
    value.is_finite().then_some(value)
}

/// Latest ADX (Wilder). Needs `2 * period + 1` bars. A perfectly flat
/// window reads 0.
pub fn adx(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < 2 * period + 1 {
        return None;
    }
    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    let mut trs = Vec::with_capacity(bars.len() - 1);
    for w in bars.windows(2) {
        let up = w[1].high - w[0].high;
        let down = w[0].low - w[1].low;
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        trs.push(true_range(&w[1], w[0].close));
    }

    let p = period as f64;
    let mut s_plus: f64 = plus_dm[..period].iter().sum();
    let mut s_minus: f64 = minus_dm[..period].iter().sum();
    let mut s_tr: f64 = trs[..period].iter().sum();

    let dx = |sp: f64, sm: f64, st: f64| -> f64 {
        if st <= 0.0 {
            return 0.0;
        }
        let di_plus = sp / st * 100.0;
        let di_minus = sm / st * 100.0;
        let sum = di_plus + di_minus;
        if sum <= 0.0 {
            0.0
        } else {
            (di_plus - di_minus).abs() / sum * 100.0
        }
    };

    let mut dxs = vec![dx(s_plus, s_minus, s_tr)];
    for i in period..trs.len() {
        s_plus = s_plus - s_plus / p + plus_dm[i];
        s_minus = s_minus - s_minus / p + minus_dm[i];
        s_tr = s_tr - s_tr / p + trs[i];
        dxs.push(dx(s_plus, s_minus, s_tr));
    }
    if dxs.len() < period {
        return None;
    }
    let mut value = dxs[..period].iter().sum::<f64>() / p;
    for &d in &dxs[period..] {
        value = (value * (p - 1.0) + d) / p;
    }
    value.is_finite().then_some(value)
}

/// Bollinger band snapshot over the last `period` closes.
#[derive(Debug, Clone, Copy)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bands {
    /// Band width as a percentage of the middle band.
    pub fn width_pct(&self) -> f64 {
        (self.upper - self.lower) / self.middle * 100.0
    }

    /// Position of `price` inside the bands; 0.5 for collapsed bands.
    pub fn percent_b(&self, price: f64) -> f64 {
        let span = self.upper - self.lower;
        if span <= 0.0 {
            0.5
        } else {
            (price - self.lower) / span
        }
    }
}

pub fn bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<Bands> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    if middle == 0.0 || !middle.is_finite() {
        return None;
    }
    let sd = std_dev(window)?;
    Some(Bands {
        upper: middle + num_std * sd,
        middle,
        lower: middle - num_std * sd,
    })
}

/// Percentage change over `period` bars.
pub fn roc(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let last = *closes.last()?;
    let prev = closes[closes.len() - 1 - period];
    if prev == 0.0 {
        return None;
    }
    Some((last - prev) / prev * 100.0)
}

/// Natural-log return over `period` bars.
pub fn log_return(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let last = *closes.last()?;
    let prev = closes[closes.len() - 1 - period];
    if last <= 0.0 || prev <= 0.0 {
        return None;
    }
    let r = (last / prev).ln();
    r.is_finite().then_some(r)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let sd = var.sqrt();
    sd.is_finite().then_some(sd)
}

/// Z-score of the last value against the preceding `period` values.
/// Zero when the window has no dispersion.
pub fn zscore_last(values: &[f64], period: usize) -> Option<f64> {
    if period < 2 || values.len() < period + 1 {
        return None;
    }
    let last = *values.last()?;
    let window = &values[values.len() - 1 - period..values.len() - 1];
    let mean = window.iter().sum::<f64>() / period as f64;
    let sd = std_dev(window)?;
    if sd == 0.0 {
        return Some(0.0);
    }
    Some((last - mean) / sd)
}

/// Standard deviation of one-bar log returns over the last `period` bars.
pub fn realized_vol(closes: &[f64], period: usize) -> Option<f64> {
    if period < 2 || closes.len() < period + 1 {
        return None;
    }
    let tail = &closes[closes.len() - 1 - period..];
    let mut rets = Vec::with_capacity(period);
    for w in tail.windows(2) {
        if w[0] <= 0.0 || w[1] <= 0.0 {
            return None;
        }
        rets.push((w[1] / w[0]).ln());
    }
    std_dev(&rets)
}
