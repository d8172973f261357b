// =============================================================================
// Relative Strength Index (RSI)
// =============================================================================
//
// Close-to-close moves are split into a gain stream and a loss stream, each
// fed through a Wilder running average. With G and L the smoothed averages,
//
//   RSI = 100 * G / (G + L)
//
// which is the usual 100 - 100/(1+RS) rewritten without the intermediate
// ratio, so the only-gains (L = 0) case lands on 100 with no special path.
// A dead-flat window (G = L = 0) reads as neutral 50.
// =============================================================================

use super::wilder::WilderAverage;

/// Compute the RSI series over `closes`, one value per close starting at
/// index `period` (the first `period` deltas seed the averages).
///
/// Returns an empty `Vec` when `period` is zero or there are not enough
/// closes to form `period` deltas. A non-finite close poisons the averages
/// and truncates the series at that point.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let mut gains = WilderAverage::new(period);
    let mut losses = WilderAverage::new(period);
    let mut series = Vec::with_capacity(closes.len() - period);

    for pair in closes.windows(2) {
        let delta = pair[1] - pair[0];
        let (gain, loss) = if delta >= 0.0 {
            (delta, 0.0)
        } else {
            (0.0, -delta)
        };

        let g = gains.update(gain);
        let l = losses.update(loss);
        if let (Some(g), Some(l)) = (g, l) {
            match strength_index(g, l) {
                Some(value) => series.push(value),
                None => break,
            }
        }
    }

    series
}

/// Most recent RSI value, or `None` when not yet computable.
pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    calculate_rsi(closes, period).last().copied()
}

/// Map smoothed gain/loss averages onto the [0, 100] index.
fn strength_index(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let magnitude = avg_gain + avg_loss;
    if magnitude == 0.0 {
        // No movement in either direction.
        return Some(50.0);
    }
    let rsi = 100.0 * avg_gain / magnitude;
    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    /// Closes that alternate a +2 jump with a -1 dip around a rising drift.
    fn sawtooth(n: usize) -> Vec<f64> {
        let mut closes = Vec::with_capacity(n);
        let mut price = 50.0;
        for i in 0..n {
            price += if i % 2 == 0 { 2.0 } else { -1.0 };
            closes.push(price);
        }
        closes
    }

    #[test]
    fn zero_period_yields_nothing() {
        assert!(calculate_rsi(&sawtooth(30), 0).is_empty());
    }

    #[test]
    fn needs_period_plus_one_closes() {
        // `period` deltas require `period + 1` closes.
        let closes = sawtooth(14);
        assert!(calculate_rsi(&closes, 14).is_empty());
        assert_eq!(calculate_rsi(&sawtooth(15), 14).len(), 1);
    }

    #[test]
    fn series_length_tracks_input() {
        let closes = sawtooth(40);
        assert_eq!(calculate_rsi(&closes, 14).len(), 40 - 14);
    }

    #[test]
    fn monotonic_rally_saturates_at_100() {
        let closes: Vec<f64> = (0..25).map(|i| 10.0 + i as f64 * 0.5).collect();
        for value in calculate_rsi(&closes, 10) {
            assert!((value - 100.0).abs() < 1e-10, "expected saturation, got {value}");
        }
    }

    #[test]
    fn monotonic_selloff_pins_at_zero() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 - i as f64 * 0.5).collect();
        for value in calculate_rsi(&closes, 10) {
            assert!(value.abs() < 1e-10, "expected zero, got {value}");
        }
    }

    #[test]
    fn sideways_market_reads_neutral() {
        let closes = vec![42.0; 30];
        for value in calculate_rsi(&closes, 14) {
            assert!((value - 50.0).abs() < 1e-10);
        }
    }

    #[test]
    fn sawtooth_leans_bullish_but_bounded() {
        // Gains outweigh losses two-to-one, so the index sits above 50
        // without saturating.
        let series = calculate_rsi(&sawtooth(60), 14);
        assert!(!series.is_empty());
        for value in &series {
            assert!((0.0..=100.0).contains(value), "RSI {value} out of range");
            assert!(*value > 50.0);
            assert!(*value < 100.0);
        }
    }

    #[test]
    fn non_finite_close_truncates_series() {
        let mut closes = sawtooth(30);
        closes[20] = f64::NAN;
        let series = calculate_rsi(&closes, 10);
        // Values up to the poisoned delta survive; nothing after.
        assert!(series.len() < 30 - 10);
    }

    #[test]
    fn latest_matches_series_tail() {
        let closes = sawtooth(40);
        let series = calculate_rsi(&closes, 14);
        assert_eq!(latest_rsi(&closes, 14), series.last().copied());
    }
}
