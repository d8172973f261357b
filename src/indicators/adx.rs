// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
// Trend strength, direction-agnostic. Each bar pair contributes a directional
// move (whichever of the high-side rise or low-side fall dominates) and a
// true range; Wilder averages of those feed the directional indicators
//
//   DI+ = 100 * avg(up moves)   / avg(true range)
//   DI- = 100 * avg(down moves) / avg(true range)
//   DX  = 100 * |DI+ - DI-| / (DI+ + DI-)
//
// and the ADX is one more Wilder average, this time over the DX stream.
// Because both DI terms divide by the same smoothed range, running averages
// and the textbook running sums give identical results.
// =============================================================================

use super::wilder::WilderAverage;
use crate::market_data::Candle;

/// Latest ADX over `period` bars, in [0, 100].
///
/// The DX stream only starts once the move/range averages have seeded, and
/// the ADX needs its own seed on top of that, so at least `2 * period + 1`
/// candles are required. Returns `None` below that, when the period is zero,
/// when the smoothed range collapses to zero, or when any intermediate value
/// is non-finite.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return None;
    }

    let mut up_avg = WilderAverage::new(period);
    let mut down_avg = WilderAverage::new(period);
    let mut range_avg = WilderAverage::new(period);
    let mut dx_avg = WilderAverage::new(period);

    let mut adx = None;
    for pair in candles.windows(2) {
        let (prev, bar) = (&pair[0], &pair[1]);

        // Only the dominant side of the bar-to-bar move counts, and only
        // when it actually expanded past the previous bar.
        let rise = bar.high - prev.high;
        let fall = prev.low - bar.low;
        let up_move = if rise > fall && rise > 0.0 { rise } else { 0.0 };
        let down_move = if fall > rise && fall > 0.0 { fall } else { 0.0 };

        let true_range = (bar.high - bar.low)
            .max((bar.high - prev.close).abs())
            .max((bar.low - prev.close).abs());

        let up = up_avg.update(up_move);
        let down = down_avg.update(down_move);
        let range = range_avg.update(true_range);

        if let (Some(up), Some(down), Some(range)) = (up, down, range) {
            let dx = directional_index(up, down, range)?;
            adx = dx_avg.update(dx);
        }
    }

    adx.filter(|value| value.is_finite())
}

/// DX from the smoothed up/down moves and range.
fn directional_index(up: f64, down: f64, range: f64) -> Option<f64> {
    if range == 0.0 {
        return None;
    }

    let di_up = up / range * 100.0;
    let di_down = down / range * 100.0;
    let di_total = di_up + di_down;
    if di_total == 0.0 {
        // Neither side moved: no trend to measure.
        return Some(0.0);
    }

    let dx = (di_up - di_down).abs() / di_total * 100.0;
    dx.is_finite().then_some(dx)
}
