// =============================================================================
// Volume-Weighted Average Price (VWAP) — calendar-day reset
// =============================================================================
//
// VWAP = Σ(typical_price · volume) / Σ(volume), accumulated from the first
// bar of the current calendar day (KST). The accumulator resets when the bar's
// local date changes.
// =============================================================================

use chrono::{Datelike, FixedOffset, TimeZone};

use crate::market_data::Candle;

/// KST offset used for the daily reset (no DST).
fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("valid fixed offset")
}

/// Local calendar day ordinal of a bar's open time.
fn day_ordinal(open_time_ms: i64) -> Option<i32> {
    let dt = kst().timestamp_millis_opt(open_time_ms).single()?;
    Some(dt.date_naive().num_days_from_ce())
}

/// Compute the VWAP of the latest bar, accumulating typical·volume from the
/// first bar of the latest bar's calendar day.
///
/// Returns `None` when the series is empty, the day has zero total volume, or
/// the result is non-finite.
pub fn calculate_vwap(candles: &[Candle]) -> Option<f64> {
    let last = candles.last()?;
    let last_day = day_ordinal(last.open_time)?;

    let mut tp_vol_sum = 0.0;
    let mut vol_sum = 0.0;
    for c in candles.iter().rev() {
        if day_ordinal(c.open_time)? != last_day {
            break;
        }
        tp_vol_sum += c.typical_price() * c.volume;
        vol_sum += c.volume;
    }

    if vol_sum <= 0.0 {
        return None;
    }
    let vwap = tp_vol_sum / vol_sum;
    vwap.is_finite().then_some(vwap)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 24 * 3600 * 1000;

    fn candle(t: i64, price: f64, volume: f64) -> Candle {
        Candle::new(t, price, price, price, price, volume)
    }

    #[test]
    fn vwap_empty() {
        assert!(calculate_vwap(&[]).is_none());
    }

    #[test]
    fn vwap_single_day_weighted() {
        // Volume-weighted mean of 100 (vol 1) and 200 (vol 3) = 175.
        let candles = vec![candle(0, 100.0, 1.0), candle(300_000, 200.0, 3.0)];
        let vwap = calculate_vwap(&candles).unwrap();
        assert!((vwap - 175.0).abs() < 1e-9);
    }

    #[test]
    fn vwap_resets_on_day_change() {
        // Bars from a previous day must not contribute.
        let candles = vec![
            candle(0, 1_000.0, 100.0),          // day 0
            candle(DAY_MS, 100.0, 1.0),         // day 1
            candle(DAY_MS + 300_000, 200.0, 3.0),
        ];
        let vwap = calculate_vwap(&candles).unwrap();
        assert!((vwap - 175.0).abs() < 1e-9);
    }

    #[test]
    fn vwap_zero_volume_none() {
        let candles = vec![candle(0, 100.0, 0.0), candle(300_000, 200.0, 0.0)];
        assert!(calculate_vwap(&candles).is_none());
    }
}
