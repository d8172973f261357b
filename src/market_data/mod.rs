pub mod adapter;
pub mod candles;

// Re-export the core data types for convenient access
// (e.g. `use crate::market_data::Candle`).
pub use adapter::MarketDataAdapter;
pub use candles::{Candle, CandleKey, Orderbook, OrderbookLevel, Ticker};
