// =============================================================================
// Candle / Ticker / Orderbook data types
// =============================================================================
//
// A candle series is indexed by open time, strictly increasing, contiguous at
// the chosen timeframe. Rows containing non-finite values never leave the
// adapter; downstream indicator code may assume finite OHLCV.
// =============================================================================

use serde::{Deserialize, Serialize};

/// A single OHLCV bar at a fixed timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time, milliseconds since the UNIX epoch (UTC).
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// OHLC sanity: low ≤ min(open, close) ≤ max(open, close) ≤ high,
    /// volume ≥ 0, all values finite.
    pub fn is_valid(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite();
        finite
            && self.volume >= 0.0
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
    }

    /// Typical price used by VWAP and CCI.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Composite key identifying a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CandleKey {
    pub market: String,
    /// Timeframe in minutes.
    pub unit: u32,
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}m", self.market, self.unit)
    }
}

/// Last-trade snapshot for one market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub market: String,
    pub last_price: f64,
    /// Signed 24 h change rate, e.g. 0.013 = +1.3 %.
    pub change_rate_24h: f64,
    pub opening_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    /// 24 h notional volume in the quote currency.
    pub acc_trade_price_24h: f64,
}

/// One price level of an orderbook side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookLevel {
    pub price: f64,
    pub size: f64,
}

/// Top-of-book snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orderbook {
    pub market: String,
    pub bids: Vec<OrderbookLevel>,
    pub asks: Vec<OrderbookLevel>,
}

/// Drop rows with non-finite or inconsistent values, preserving order.
pub fn drop_invalid_rows(candles: Vec<Candle>) -> Vec<Candle> {
    candles.into_iter().filter(Candle::is_valid).collect()
}

/// Check that open times are strictly increasing and contiguous at the given
/// timeframe. A single gap makes the series non-contiguous.
pub fn is_contiguous(candles: &[Candle], unit_minutes: u32) -> bool {
    let step = unit_minutes as i64 * 60_000;
    candles
        .windows(2)
        .all(|w| w[1].open_time - w[0].open_time == step)
}
