// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA(period), upper/lower = middle ± num_std * σ.
// %B    = (close − lower) / (upper − lower)   (0 = lower band, 1 = upper band)
// Width = (upper − lower) / middle
// =============================================================================

/// Result of a Bollinger Band calculation over the latest window.
#[derive(Debug, Clone)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (upper − lower) / middle, dimensionless.
    pub width: f64,
    /// %B of the latest close. NaN when the bands collapse (σ = 0).
    pub percent_b: f64,
}

/// Calculate Bollinger Bands over the most recent `period` closes.
///
/// Returns `None` when:
/// - Fewer than `period` data points.
/// - Middle band is zero (degenerate input).
/// - Any result is non-finite.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    if middle == 0.0 || !middle.is_finite() {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let width = (upper - lower) / middle;
    if !width.is_finite() {
        return None;
    }

    let close = *window.last()?;
    let band_span = upper - lower;
    let percent_b = if band_span > 0.0 {
        (close - lower) / band_span
    } else {
        f64::NAN
    };

    Some(BollingerResult {
        upper,
        middle,
        lower,
        width,
        percent_b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bb.upper > bb.middle);
        assert!(bb.lower < bb.middle);
        assert!(bb.width > 0.0);
        // Latest close (20) is near the top of the window.
        assert!(bb.percent_b > 0.5);
    }

    #[test]
    fn bollinger_insufficient_data() {
        let closes = vec![1.0, 2.0, 3.0];
        assert!(calculate_bollinger(&closes, 20, 2.0).is_none());
    }

    #[test]
    fn bollinger_flat_market() {
        // Zero deviation: width 0, %B undefined (NaN).
        let closes = vec![100.0; 20];
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bb.width.abs() < 1e-12);
        assert!(bb.percent_b.is_nan());
    }

    #[test]
    fn percent_b_midpoint() {
        // Symmetric window: the mean close sits at %B = 0.5.
        let mut closes: Vec<f64> = Vec::new();
        for i in 0..10 {
            closes.push(100.0 - i as f64);
            closes.push(100.0 + i as f64);
        }
        closes.push(100.0);
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!((bb.percent_b - 0.5).abs() < 0.05);
    }

    #[test]
    fn bollinger_zero_middle_rejected() {
        let closes = vec![0.0; 20];
        assert!(calculate_bollinger(&closes, 20, 2.0).is_none());
    }
}
