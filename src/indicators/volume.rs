// =============================================================================
// Volume analytics — volume ratio, surge flag, OBV trend
// =============================================================================
//
// Volume ratio = latest volume / SMA(volume, 20).
// Surge        = ratio >= configured multiplier (default 1.5).
// OBV          = running sum of ±volume keyed on the close-to-close direction;
//                the trend label comes from the slope of the last 10 OBV
//                points (least squares).
// =============================================================================

use crate::market_data::Candle;
use crate::types::ObvTrend;

/// Window used for the volume moving average.
pub const VOLUME_MA_WINDOW: usize = 20;

/// Number of OBV points used for the trend slope.
const OBV_TREND_WINDOW: usize = 10;

/// Latest volume / 20-bar volume mean. `None` when fewer than 20 bars or the
/// mean is zero.
pub fn volume_ratio(candles: &[Candle]) -> Option<f64> {
    if candles.len() < VOLUME_MA_WINDOW {
        return None;
    }
    let window = &candles[candles.len() - VOLUME_MA_WINDOW..];
    let mean = window.iter().map(|c| c.volume).sum::<f64>() / VOLUME_MA_WINDOW as f64;
    if mean <= 0.0 {
        return None;
    }
    let ratio = window.last()?.volume / mean;
    ratio.is_finite().then_some(ratio)
}

/// Whether the latest bar's volume counts as a surge.
pub fn is_volume_surge(candles: &[Candle], multiplier: f64) -> bool {
    volume_ratio(candles).map_or(false, |r| r >= multiplier)
}

/// Compute the full OBV series (one value per bar, first bar = 0).
pub fn calculate_obv(candles: &[Candle]) -> Vec<f64> {
    if candles.is_empty() {
        return Vec::new();
    }

    let mut obv = Vec::with_capacity(candles.len());
    obv.push(0.0);
    for w in candles.windows(2) {
        let prev_obv = *obv.last().expect("obv is non-empty");
        let delta = if w[1].close > w[0].close {
            w[1].volume
        } else if w[1].close < w[0].close {
            -w[1].volume
        } else {
            0.0
        };
        obv.push(prev_obv + delta);
    }
    obv
}

/// Classify the OBV trend from the least-squares slope of the last 10 points.
///
/// The slope is normalized by the mean absolute OBV level so thresholds hold
/// across instruments with very different volume scales.
pub fn obv_trend(candles: &[Candle]) -> ObvTrend {
    let obv = calculate_obv(candles);
    if obv.len() < OBV_TREND_WINDOW {
        return ObvTrend::Neutral;
    }

    let tail = &obv[obv.len() - OBV_TREND_WINDOW..];
    let n = tail.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = tail.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in tail.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        return ObvTrend::Neutral;
    }
    let slope = num / den;

    let scale = tail.iter().map(|v| v.abs()).sum::<f64>() / n;
    if scale == 0.0 {
        return ObvTrend::Neutral;
    }
    let normalized = slope / scale;

    if normalized > 0.01 {
        ObvTrend::Rising
    } else if normalized < -0.01 {
        ObvTrend::Falling
    } else {
        ObvTrend::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, volume: f64) -> Candle {
        Candle::new(0, close, close, close, close, volume)
    }

    #[test]
    fn ratio_insufficient() {
        let candles = vec![candle(1.0, 10.0); 10];
        assert!(volume_ratio(&candles).is_none());
    }

    #[test]
    fn ratio_constant_volume_is_one() {
        let candles = vec![candle(1.0, 10.0); 25];
        let r = volume_ratio(&candles).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        assert!(!is_volume_surge(&candles, 1.5));
    }

    #[test]
    fn surge_detected() {
        let mut candles = vec![candle(1.0, 10.0); 24];
        candles.push(candle(1.0, 100.0));
        let r = volume_ratio(&candles).unwrap();
        assert!(r > 1.5);
        assert!(is_volume_surge(&candles, 1.5));
    }

    #[test]
    fn obv_direction() {
        // Rising closes accumulate volume, falling closes subtract.
        let candles = vec![
            candle(100.0, 5.0),
            candle(101.0, 10.0),
            candle(100.0, 4.0),
            candle(100.0, 7.0),
        ];
        let obv = calculate_obv(&candles);
        assert_eq!(obv, vec![0.0, 10.0, 6.0, 6.0]);
    }

    #[test]
    fn obv_trend_rising() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| candle(100.0 + i as f64, 50.0))
            .collect();
        assert_eq!(obv_trend(&candles), ObvTrend::Rising);
    }

    #[test]
    fn obv_trend_falling() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| candle(200.0 - i as f64, 50.0))
            .collect();
        assert_eq!(obv_trend(&candles), ObvTrend::Falling);
    }

    #[test]
    fn obv_trend_flat_neutral() {
        let candles = vec![candle(100.0, 50.0); 30];
        assert_eq!(obv_trend(&candles), ObvTrend::Neutral);
    }
}
