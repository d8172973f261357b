// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// MACD line   = EMA(fast) − EMA(slow)         (defaults 12 / 26)
// Signal line = EMA(signal) of the MACD line  (default 9)
// Histogram   = MACD − Signal
// =============================================================================

use super::ema::calculate_ema;

/// The latest MACD reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the latest MACD line / signal / histogram values.
///
/// Returns `None` when the input is too short to produce a signal value
/// (needs at least `slow + signal - 1` closes).
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Option<MacdResult> {
    if fast == 0 || slow == 0 || signal == 0 || fast >= slow {
        return None;
    }

    let fast_series = calculate_ema(closes, fast);
    let slow_series = calculate_ema(closes, slow);
    if slow_series.is_empty() {
        return None;
    }

    // Both series end at the latest close; align on the shared tail.
    let len = slow_series.len().min(fast_series.len());
    if len == 0 {
        return None;
    }
    let fast_tail = &fast_series[fast_series.len() - len..];
    let slow_tail = &slow_series[slow_series.len() - len..];

    let macd_line: Vec<f64> = fast_tail
        .iter()
        .zip(slow_tail.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal_series = calculate_ema(&macd_line, signal);
    let signal_val = *signal_series.last()?;
    let macd_val = *macd_line.last()?;
    let histogram = macd_val - signal_val;

    if !macd_val.is_finite() || !signal_val.is_finite() {
        return None;
    }

    Some(MacdResult {
        macd: macd_val,
        signal: signal_val,
        histogram,
    })
}
