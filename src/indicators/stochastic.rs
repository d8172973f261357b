// =============================================================================
// Stochastic Oscillator (%K / %D)
// =============================================================================
//
// %K = (close − lowest_low(period)) / (highest_high(period) − lowest_low) * 100
// %D = SMA(%K, smooth)
// =============================================================================

use crate::market_data::Candle;

/// The latest stochastic reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticResult {
    pub k: f64,
    pub d: f64,
}

/// Compute the latest %K / %D over `period` bars with a `smooth`-bar %D.
///
/// Returns `None` when the input is shorter than `period + smooth - 1` bars
/// or the range collapses to zero on every window.
pub fn calculate_stochastic(
    candles: &[Candle],
    period: usize,
    smooth: usize,
) -> Option<StochasticResult> {
    if period == 0 || smooth == 0 || candles.len() < period + smooth - 1 {
        return None;
    }

    // One %K value per window ending at each of the last `smooth` bars.
    let mut k_values = Vec::with_capacity(smooth);
    for offset in (0..smooth).rev() {
        let end = candles.len() - offset;
        let window = &candles[end - period..end];

        let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let close = window.last()?.close;

        let range = highest - lowest;
        let k = if range > 0.0 {
            (close - lowest) / range * 100.0
        } else {
            50.0 // flat window — neutral
        };
        if !k.is_finite() {
            return None;
        }
        k_values.push(k);
    }

    let k = *k_values.last()?;
    let d = k_values.iter().sum::<f64>() / k_values.len() as f64;

    Some(StochasticResult { k, d })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle::new(0, close, high, low, close, 1.0)
    }

    #[test]
    fn stochastic_insufficient() {
        let candles = vec![candle(2.0, 1.0, 1.5); 10];
        assert!(calculate_stochastic(&candles, 14, 3).is_none());
    }

    #[test]
    fn stochastic_close_at_high() {
        // Close pinned to the highest high => %K = 100.
        let candles: Vec<Candle> = (0..20)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base, base - 5.0, base)
            })
            .collect();
        let s = calculate_stochastic(&candles, 14, 3).unwrap();
        assert!(s.k > 95.0);
        assert!(s.d > 90.0);
    }

    #[test]
    fn stochastic_close_at_low() {
        let candles: Vec<Candle> = (0..20)
            .map(|i| {
                let base = 100.0 - i as f64;
                candle(base + 5.0, base, base)
            })
            .collect();
        let s = calculate_stochastic(&candles, 14, 3).unwrap();
        assert!(s.k < 5.0);
    }

    #[test]
    fn stochastic_flat_neutral() {
        let candles = vec![candle(100.0, 100.0, 100.0); 20];
        let s = calculate_stochastic(&candles, 14, 3).unwrap();
        assert!((s.k - 50.0).abs() < 1e-9);
        assert!((s.d - 50.0).abs() < 1e-9);
    }

    #[test]
    fn stochastic_in_range() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.5).sin() * 10.0;
                candle(base + 2.0, base - 2.0, base)
            })
            .collect();
        let s = calculate_stochastic(&candles, 14, 3).unwrap();
        assert!((0.0..=100.0).contains(&s.k));
        assert!((0.0..=100.0).contains(&s.d));
    }
}
