// =============================================================================
// Indicator Engine
// =============================================================================
//
// Pure, side-effect-free implementations of the technical indicators consumed
// by the scoring engine. Series functions return an empty Vec (or `None`) on
// insufficient data; the snapshot builder maps those to NaN so downstream
// consumers skip fields that are not yet computable instead of reading zeros.
// =============================================================================

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod cci;
pub mod ema;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod volume;
pub mod vwap;
mod wilder;

use crate::market_data::Candle;
use crate::types::ObvTrend;

/// Minimum candle count before a snapshot is attempted.
pub const MIN_CANDLES_FOR_INDICATORS: usize = 50;

/// Derived indicator values for one instrument at one time.
///
/// Scalar `NaN` marks "not yet computable"; consumers must skip such fields.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub current_price: f64,
    pub open_price: f64,

    pub ema_fast: f64,
    pub ema_slow: f64,
    pub ema_12: f64,
    pub ema_26: f64,
    /// Fast > slow on the latest bar.
    pub ema_bullish: bool,
    /// +1 golden cross, -1 dead cross on the latest bar, 0 otherwise.
    pub ema_cross: i8,

    pub sma_5: f64,
    pub sma_20: f64,
    pub sma_60: f64,

    pub rsi_14: f64,

    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,

    pub bollinger_upper: f64,
    pub bollinger_mid: f64,
    pub bollinger_lower: f64,
    pub bollinger_pct_b: f64,
    pub bollinger_width: f64,

    pub atr_14: f64,
    /// ATR as a fraction of price (0.02 = 2 %).
    pub atr_pct: f64,

    pub vwap: f64,

    pub volume_ratio: f64,
    pub volume_surge: bool,
    pub obv_trend: ObvTrend,

    pub stoch_k: f64,
    pub stoch_d: f64,
    pub roc_12: f64,
    pub cci_20: f64,
    pub adx: f64,

    /// 10-bar low / high of the series, used by the dynamic stop.
    pub recent_low_10: f64,
    pub recent_high_10: f64,
}

fn nan_or(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

/// Compute the full indicator snapshot from a candle series (oldest first).
///
/// Returns `None` when the series is shorter than
/// [`MIN_CANDLES_FOR_INDICATORS`]; individual fields that still lack data at
/// that length come back as NaN.
pub fn compute_snapshot(candles: &[Candle], volume_surge_multiplier: f64) -> Option<IndicatorSnapshot> {
    if candles.len() < MIN_CANDLES_FOR_INDICATORS {
        return None;
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let last = candles.last()?;

    let cross = ema::ema_cross_state(&closes, 9, 21);
    let macd = macd::calculate_macd(&closes, 12, 26, 9);
    let bb = bollinger::calculate_bollinger(&closes, 20, 2.0);
    let stoch = stochastic::calculate_stochastic(candles, 14, 3);

    let tail10 = &candles[candles.len().saturating_sub(10)..];
    let recent_low_10 = tail10.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let recent_high_10 = tail10
        .iter()
        .map(|c| c.high)
        .fold(f64::NEG_INFINITY, f64::max);

    Some(IndicatorSnapshot {
        current_price: last.close,
        open_price: last.open,

        ema_fast: nan_or(ema::latest_ema(&closes, 9)),
        ema_slow: nan_or(ema::latest_ema(&closes, 21)),
        ema_12: nan_or(ema::latest_ema(&closes, 12)),
        ema_26: nan_or(ema::latest_ema(&closes, 26)),
        ema_bullish: cross.map_or(false, |s| s.bullish),
        ema_cross: cross.map_or(0, |s| s.cross),

        sma_5: nan_or(sma::latest_sma(&closes, 5)),
        sma_20: nan_or(sma::latest_sma(&closes, 20)),
        sma_60: nan_or(sma::latest_sma(&closes, 60)),

        rsi_14: nan_or(rsi::latest_rsi(&closes, 14)),

        macd: nan_or(macd.map(|m| m.macd)),
        macd_signal: nan_or(macd.map(|m| m.signal)),
        macd_histogram: nan_or(macd.map(|m| m.histogram)),

        bollinger_upper: nan_or(bb.as_ref().map(|b| b.upper)),
        bollinger_mid: nan_or(bb.as_ref().map(|b| b.middle)),
        bollinger_lower: nan_or(bb.as_ref().map(|b| b.lower)),
        bollinger_pct_b: bb.as_ref().map_or(f64::NAN, |b| b.percent_b),
        bollinger_width: nan_or(bb.as_ref().map(|b| b.width)),

        atr_14: nan_or(atr::calculate_atr(candles, 14)),
        atr_pct: nan_or(atr::calculate_atr_pct(candles, 14)),

        vwap: nan_or(vwap::calculate_vwap(candles)),

        volume_ratio: nan_or(volume::volume_ratio(candles)),
        volume_surge: volume::is_volume_surge(candles, volume_surge_multiplier),
        obv_trend: volume::obv_trend(candles),

        stoch_k: nan_or(stoch.map(|s| s.k)),
        stoch_d: nan_or(stoch.map(|s| s.d)),
        roc_12: nan_or(roc::latest_roc(&closes, 12)),
        cci_20: nan_or(cci::calculate_cci(candles, 20)),
        adx: nan_or(adx::calculate_adx(candles, 14)),

        recent_low_10,
        recent_high_10,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.1;
                Candle::new(
                    i as i64 * 300_000,
                    base,
                    base + 2.0,
                    base - 2.0,
                    base + 0.5,
                    50.0 + (i % 7) as f64,
                )
            })
            .collect()
    }

    #[test]
    fn snapshot_requires_min_candles() {
        assert!(compute_snapshot(&series(49), 1.5).is_none());
        assert!(compute_snapshot(&series(50), 1.5).is_some());
    }

    #[test]
    fn snapshot_core_fields_finite_at_100_bars() {
        let snap = compute_snapshot(&series(100), 1.5).unwrap();
        assert!(snap.current_price.is_finite());
        assert!(snap.ema_fast.is_finite());
        assert!(snap.ema_slow.is_finite());
        assert!(snap.sma_60.is_finite());
        assert!(snap.rsi_14.is_finite());
        assert!(snap.macd_histogram.is_finite());
        assert!(snap.bollinger_mid.is_finite());
        assert!(snap.atr_14.is_finite());
        assert!(snap.adx.is_finite());
        assert!(snap.vwap.is_finite());
    }

    #[test]
    fn snapshot_nan_for_uncomputable_fields() {
        // 50 bars: enough for the snapshot, not enough for SMA-60.
        let snap = compute_snapshot(&series(50), 1.5).unwrap();
        assert!(snap.sma_60.is_nan());
        assert!(snap.sma_20.is_finite());
    }

    #[test]
    fn snapshot_recent_extremes() {
        let candles = series(60);
        let snap = compute_snapshot(&candles, 1.5).unwrap();
        let tail = &candles[50..];
        let lo = tail.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let hi = tail.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        assert!((snap.recent_low_10 - lo).abs() < 1e-12);
        assert!((snap.recent_high_10 - hi).abs() < 1e-12);
    }
}
