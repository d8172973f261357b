// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period` closes.
// =============================================================================

/// Compute the EMA series for the given `closes` slice and look-back `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// Each output element corresponds to a close starting at index `period - 1`.
///
/// # Edge cases
/// - `period == 0` => empty vec (division by zero guard)
/// - `closes.len() < period` => empty vec
/// - Non-finite intermediate values stop the series; downstream consumers
///   should not trust a broken tail.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// Most recent EMA value, or `None` when the series is not yet computable.
pub fn latest_ema(closes: &[f64], period: usize) -> Option<f64> {
    calculate_ema(closes, period).last().copied()
}

/// State of the fast/slow EMA pair on the latest bar.
///
/// `cross` is +1 when (fast − slow) transitioned from ≤ 0 to > 0 on the final
/// bar (golden cross), −1 on the opposite transition (dead cross), 0 otherwise.
/// `bullish` is simply fast > slow on the final bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmaCrossState {
    pub bullish: bool,
    pub cross: i8,
}

/// Evaluate the fast/slow EMA cross state on the latest bar.
///
/// Returns `None` when either EMA series is too short to provide two
/// consecutive aligned values.
pub fn ema_cross_state(closes: &[f64], fast: usize, slow: usize) -> Option<EmaCrossState> {
    let fast_series = calculate_ema(closes, fast);
    let slow_series = calculate_ema(closes, slow);
    if fast_series.len() < 2 || slow_series.len() < 2 {
        return None;
    }

    // Align the two series on their shared tail.
    let f_cur = *fast_series.last()?;
    let f_prev = fast_series[fast_series.len() - 2];
    let s_cur = *slow_series.last()?;
    let s_prev = slow_series[slow_series.len() - 2];

    let diff_cur = f_cur - s_cur;
    let diff_prev = f_prev - s_prev;

    let cross = if diff_prev <= 0.0 && diff_cur > 0.0 {
        1
    } else if diff_prev >= 0.0 && diff_cur < 0.0 {
        -1
    } else {
        0
    };

    Some(EmaCrossState {
        bullish: diff_cur > 0.0,
        cross,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(calculate_ema(&[1.0, 2.0], 5).is_empty());
    }

    #[test]
    fn ema_period_equals_length() {
        let closes = vec![2.0, 4.0, 6.0];
        let ema = calculate_ema(&closes, 3);
        assert_eq!(ema.len(), 1);
        // Seed is the SMA = (2+4+6)/3 = 4.0
        assert!((ema[0] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1..10]: SMA seed 3.0, multiplier 1/3.
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 5);
        assert_eq!(ema.len(), 6);

        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        for (i, &c) in closes[5..].iter().enumerate() {
            expected = c * mult + expected * (1.0 - mult);
            assert!((ema[i + 1] - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn ema_handles_nan_in_input() {
        let closes = vec![1.0, 2.0, 3.0, f64::NAN, 5.0];
        let ema = calculate_ema(&closes, 3);
        // NaN poisons the running value, series stops at the seed.
        assert_eq!(ema.len(), 1);
    }

    #[test]
    fn cross_state_golden() {
        // Steady decline keeps the fast EMA below the slow one; a single
        // violent up-bar flips the difference positive on the final bar.
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 - i as f64).collect();
        closes.push(250.0);
        let state = ema_cross_state(&closes, 9, 21).unwrap();
        assert!(state.bullish);
        assert_eq!(state.cross, 1);
    }

    #[test]
    fn cross_state_dead() {
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        closes.push(1.0);
        let state = ema_cross_state(&closes, 9, 21).unwrap();
        assert!(!state.bullish);
        assert_eq!(state.cross, -1);
    }

    #[test]
    fn cross_state_steady_trend_no_cross() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let state = ema_cross_state(&closes, 9, 21).unwrap();
        assert!(state.bullish);
        assert_eq!(state.cross, 0);
    }

    #[test]
    fn cross_state_insufficient_data() {
        let closes: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert!(ema_cross_state(&closes, 9, 21).is_none());
    }
}
