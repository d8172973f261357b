// =============================================================================
// Market Data Adapter — uniform read interface over the exchange
// =============================================================================
//
// Responsibilities:
//   - Candle fetch with validation (NaN rows dropped, minimum length 50) and
//     a last-known-good fallback cache per (market, timeframe) key.
//   - Batched ticker reads behind a 5-second TTL cache; within the TTL a
//     fetch failure silently serves the cache, past the TTL a stale cache is
//     served only when the live request fails.
//   - Orderbook and balance pass-through.
//   - Trade-history reads where a rejection on one instrument of a batch
//     degrades to an empty list instead of failing the whole batch.
//
// Repeated warnings are throttled: one log line per key per 5 minutes, with a
// suppressed-occurrence count appended.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::exchange::{ClosedOrder, ExchangeClient};
use crate::market_data::candles::{
    drop_invalid_rows, is_contiguous, Candle, CandleKey, Orderbook, Ticker,
};
use crate::types::{Balance, Instrument};

/// Minimum candle count required for indicator work.
pub const MIN_CANDLES: usize = 50;
/// Candles kept per (market, timeframe) in the fallback cache.
pub const MAX_CANDLES_CACHE: usize = 200;
/// How long a ticker batch stays fresh.
const TICKER_TTL: Duration = Duration::from_secs(5);
/// Gap between repeated identical warnings.
const WARN_THROTTLE: Duration = Duration::from_secs(300);

// -----------------------------------------------------------------------------
// Warning throttle
// -----------------------------------------------------------------------------

/// Emits a warning for a key at most once per [`WARN_THROTTLE`], reporting
/// how many identical warnings were suppressed in between.
struct WarnThrottle {
    last_warn: Mutex<HashMap<String, (Instant, u32)>>,
}

impl WarnThrottle {
    fn new() -> Self {
        Self {
            last_warn: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `Some(suppressed_count)` when the caller should log now.
    fn should_log(&self, key: &str) -> Option<u32> {
        let mut map = self.last_warn.lock();
        let now = Instant::now();
        match map.get_mut(key) {
            Some((last, suppressed)) => {
                if now.duration_since(*last) >= WARN_THROTTLE {
                    let count = *suppressed;
                    *last = now;
                    *suppressed = 0;
                    Some(count)
                } else {
                    *suppressed += 1;
                    None
                }
            }
            None => {
                map.insert(key.to_string(), (now, 0));
                Some(0)
            }
        }
    }
}

struct TickerCache {
    tickers: HashMap<String, Ticker>,
    fetched_at: Option<Instant>,
}

// -----------------------------------------------------------------------------
// Adapter
// -----------------------------------------------------------------------------

pub struct MarketDataAdapter {
    client: ExchangeClient,
    candle_cache: Mutex<HashMap<CandleKey, Vec<Candle>>>,
    ticker_cache: Mutex<TickerCache>,
    throttle: WarnThrottle,
}

impl MarketDataAdapter {
    pub fn new(client: ExchangeClient) -> Self {
        Self {
            client,
            candle_cache: Mutex::new(HashMap::new()),
            ticker_cache: Mutex::new(TickerCache {
                tickers: HashMap::new(),
                fetched_at: None,
            }),
            throttle: WarnThrottle::new(),
        }
    }

    fn warn_throttled(&self, key: &str, message: &str) {
        if let Some(suppressed) = self.throttle.should_log(key) {
            if suppressed > 0 {
                warn!("{message} ({suppressed} similar warnings suppressed)");
            } else {
                warn!("{message}");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Candles
    // -------------------------------------------------------------------------

    /// Fetch a candle series, falling back to the last-known cached series
    /// for this (market, timeframe) when the live series is unavailable or
    /// too short.
    pub async fn get_candles(
        &self,
        instrument: &Instrument,
        unit_minutes: u32,
        count: u32,
    ) -> EngineResult<Vec<Candle>> {
        let market = instrument.market_code();
        let key = CandleKey {
            market: market.clone(),
            unit: unit_minutes,
        };

        let fetched = self.client.get_candles(&market, unit_minutes, count).await;

        let candles = match fetched {
            Ok(rows) => drop_invalid_rows(rows),
            Err(e) => {
                self.warn_throttled(
                    &format!("{key}:fetch"),
                    &format!("candle fetch failed for {key}: {e}"),
                );
                return self.cached_candles(&key).ok_or(e);
            }
        };

        if candles.len() < MIN_CANDLES {
            self.warn_throttled(
                &format!("{key}:short"),
                &format!(
                    "candle series too short for {key}: {}/{MIN_CANDLES}",
                    candles.len()
                ),
            );
            if let Some(cached) = self.cached_candles(&key) {
                return Ok(cached);
            }
            return Err(EngineError::MissingInputs(format!(
                "only {} candles available for {key}",
                candles.len()
            )));
        }

        if !is_contiguous(&candles, unit_minutes) {
            self.warn_throttled(
                &format!("{key}:gaps"),
                &format!("candle series for {key} has gaps after row filtering"),
            );
        }

        let mut trimmed = candles;
        if trimmed.len() > MAX_CANDLES_CACHE {
            trimmed.drain(..trimmed.len() - MAX_CANDLES_CACHE);
        }
        self.candle_cache.lock().insert(key.clone(), trimmed.clone());

        debug!(key = %key, count = trimmed.len(), "candles refreshed");
        Ok(trimmed)
    }

    fn cached_candles(&self, key: &CandleKey) -> Option<Vec<Candle>> {
        let cache = self.candle_cache.lock();
        cache.get(key).filter(|c| c.len() >= MIN_CANDLES).cloned()
    }

    // -------------------------------------------------------------------------
    // Tickers
    // -------------------------------------------------------------------------

    /// Fetch the latest ticker for one instrument.
    pub async fn get_ticker(&self, instrument: &Instrument) -> EngineResult<Ticker> {
        let map = self
            .get_tickers(std::slice::from_ref(instrument))
            .await?;
        map.get(&instrument.market_code()).cloned().ok_or_else(|| {
            EngineError::MissingInputs(format!("no ticker for {instrument}"))
        })
    }

    /// Fetch tickers for a batch of instruments through the TTL cache.
    pub async fn get_tickers(
        &self,
        instruments: &[Instrument],
    ) -> EngineResult<HashMap<String, Ticker>> {
        let markets: Vec<String> = instruments.iter().map(|i| i.market_code()).collect();

        // Serve a fresh-enough cache without a round trip.
        {
            let cache = self.ticker_cache.lock();
            if let Some(fetched_at) = cache.fetched_at {
                let fresh = fetched_at.elapsed() < TICKER_TTL;
                let covers_all = markets.iter().all(|m| cache.tickers.contains_key(m));
                if fresh && covers_all {
                    return Ok(cache.tickers.clone());
                }
            }
        }

        match self.client.get_tickers(&markets).await {
            Ok(rows) => {
                let mut cache = self.ticker_cache.lock();
                for t in rows {
                    cache.tickers.insert(t.market.clone(), t);
                }
                cache.fetched_at = Some(Instant::now());
                Ok(cache.tickers.clone())
            }
            Err(e) => {
                // Stale cache beats nothing when the live request fails.
                let cache = self.ticker_cache.lock();
                if !cache.tickers.is_empty() {
                    self.warn_throttled(
                        "ticker:fetch",
                        &format!("ticker fetch failed, serving cache: {e}"),
                    );
                    Ok(cache.tickers.clone())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Latest prices keyed by instrument, from the ticker batch.
    pub async fn get_current_prices(
        &self,
        instruments: &[Instrument],
    ) -> EngineResult<HashMap<Instrument, f64>> {
        let tickers = self.get_tickers(instruments).await?;
        let mut prices = HashMap::new();
        for inst in instruments {
            if let Some(t) = tickers.get(&inst.market_code()) {
                if t.last_price > 0.0 {
                    prices.insert(inst.clone(), t.last_price);
                }
            }
        }
        Ok(prices)
    }

    // -------------------------------------------------------------------------
    // Orderbook / balances / trade history
    // -------------------------------------------------------------------------

    pub async fn get_orderbook(
        &self,
        instrument: &Instrument,
        depth: usize,
    ) -> EngineResult<Orderbook> {
        self.client
            .get_orderbook(&instrument.market_code(), depth)
            .await
    }

    /// Per-currency balances from the authenticated account endpoint.
    pub async fn get_balances(&self) -> EngineResult<HashMap<String, Balance>> {
        self.client.get_accounts().await
    }

    /// Executed-order history per instrument.
    ///
    /// When more than one instrument is requested, an upstream rejection on
    /// one of them degrades to an empty list for that instrument; a
    /// single-instrument call surfaces the rejection to the caller.
    pub async fn get_trade_history(
        &self,
        instruments: &[Instrument],
    ) -> EngineResult<HashMap<Instrument, Vec<ClosedOrder>>> {
        let single = instruments.len() == 1;
        let mut result = HashMap::new();

        for inst in instruments {
            match self
                .client
                .closed_orders(&inst.market_code(), 1, 100)
                .await
            {
                Ok(orders) => {
                    result.insert(inst.clone(), orders);
                }
                Err(e @ EngineError::UpstreamRejected(_)) if !single => {
                    warn!(instrument = %inst, error = %e, "trade history rejected, degrading to empty");
                    result.insert(inst.clone(), Vec::new());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(result)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_logs_first_then_suppresses() {
        let throttle = WarnThrottle::new();
        assert_eq!(throttle.should_log("key"), Some(0));
        assert_eq!(throttle.should_log("key"), None);
        assert_eq!(throttle.should_log("key"), None);
        // A different key has its own window.
        assert_eq!(throttle.should_log("other"), Some(0));
    }

    #[test]
    fn throttle_counts_suppressed() {
        let throttle = WarnThrottle::new();
        throttle.should_log("key");
        throttle.should_log("key");
        throttle.should_log("key");

        // Force the window to expire.
        {
            let mut map = throttle.last_warn.lock();
            let entry = map.get_mut("key").unwrap();
            entry.0 = Instant::now() - WARN_THROTTLE - Duration::from_secs(1);
        }
        assert_eq!(throttle.should_log("key"), Some(2));
    }

    #[test]
    fn candle_cache_requires_min_length() {
        let adapter = MarketDataAdapter::new(ExchangeClient::new("", ""));
        let key = CandleKey {
            market: "KRW-BTC".into(),
            unit: 5,
        };

        let short: Vec<Candle> = (0..10)
            .map(|i| Candle::new(i * 300_000, 1.0, 2.0, 0.5, 1.5, 1.0))
            .collect();
        adapter.candle_cache.lock().insert(key.clone(), short);
        assert!(adapter.cached_candles(&key).is_none());

        let long: Vec<Candle> = (0..60)
            .map(|i| Candle::new(i * 300_000, 1.0, 2.0, 0.5, 1.5, 1.0))
            .collect();
        adapter.candle_cache.lock().insert(key.clone(), long);
        assert_eq!(adapter.cached_candles(&key).unwrap().len(), 60);
    }
}
