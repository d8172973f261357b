// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================

/// Compute the SMA series for the given `closes` and `period`.
///
/// Each output element corresponds to a close starting at index `period - 1`.
/// Returns an empty `Vec` when the input is too short or the period is zero.
pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    let mut window_sum: f64 = closes[..period].iter().sum();
    result.push(window_sum / period as f64);

    for i in period..closes.len() {
        window_sum += closes[i] - closes[i - period];
        result.push(window_sum / period as f64);
    }

    result
}

/// Most recent SMA value, or `None` when not yet computable or non-finite.
pub fn latest_sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let sum: f64 = closes[closes.len() - period..].iter().sum();
    let sma = sum / period as f64;
    sma.is_finite().then_some(sma)
}
