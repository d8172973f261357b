// =============================================================================
// Commodity Channel Index (CCI)
// =============================================================================
//
// CCI = (TP − SMA(TP, period)) / (0.015 * mean_deviation)
// where TP is the typical price (H + L + C) / 3.
// =============================================================================

use crate::market_data::Candle;

/// Compute the latest CCI over `period` bars.
///
/// Returns `None` when the input is shorter than `period` or the mean
/// deviation is zero (flat window).
pub fn calculate_cci(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let window = &candles[candles.len() - period..];
    let typicals: Vec<f64> = window.iter().map(Candle::typical_price).collect();

    let mean = typicals.iter().sum::<f64>() / period as f64;
    let mean_dev = typicals.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / period as f64;

    if mean_dev == 0.0 {
        return None;
    }

    let latest_tp = *typicals.last()?;
    let cci = (latest_tp - mean) / (0.015 * mean_dev);
    cci.is_finite().then_some(cci)
}
