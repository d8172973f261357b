// =============================================================================
// Order Executor — simulated / live order routing with a single contract
// =============================================================================
//
// The executor exposes identical operations in both modes so callers never
// branch on the trading mode:
//
//   open_long / open_short / close / balances_snapshot / cancel_all
//
// Live path: orders go to the exchange with a deterministic client
// identifier; a transport timeout is resolved by a status query on that
// identifier rather than a second POST. The fill is built from the reported
// execution values.
//
// Simulated path: a paper wallet tracks cash and holdings. Opening deducts
// only the fee; realized PnL is applied by the caller via add_realized_pnl.
//
// Failures append a FAILED audit row to the trade log and surface as typed
// errors; the executor never mutates local state on a failed live order.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::exchange::{ExchangeClient, OrderRequest};
use crate::execution::paper::{PaperWallet, SHORT_PREFIX};
use crate::market_data::MarketDataAdapter;
use crate::store::{Store, TradeRecord, TradeStatus};
use crate::types::{
    Balance, ExchangePosition, Instrument, OrderMethod, PositionSide, Side, TradingMode,
};

/// Canonical execution record emitted by every state-changing operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub trade_id: String,
    pub instrument: Instrument,
    pub side: Side,
    pub position_side: PositionSide,
    pub price: f64,
    pub quantity: f64,
    pub notional: f64,
    pub fee: f64,
    pub executed_at: DateTime<Utc>,
    pub mode: TradingMode,
    /// Exchange order uuid; absent for simulated fills.
    #[serde(default)]
    pub order_uuid: Option<String>,
}

/// Cash plus per-asset holdings, uniform across modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancesSnapshot {
    pub cash: f64,
    pub holdings: HashMap<String, f64>,
}

pub struct OrderExecutor {
    mode: TradingMode,
    client: Arc<ExchangeClient>,
    market_data: Arc<MarketDataAdapter>,
    store: Arc<dyn Store>,
    /// One mutex covers cash, holdings, and the snapshot file.
    paper: Mutex<PaperWallet>,
    min_order_notional: f64,
    fee_rate: f64,
    leverage: u32,
    quote_currency: String,
    trade_counter: AtomicU64,
    /// Exchange cash balance captured on entry into live mode.
    initial_capital: Mutex<Option<f64>>,
}

impl OrderExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: TradingMode,
        client: Arc<ExchangeClient>,
        market_data: Arc<MarketDataAdapter>,
        store: Arc<dyn Store>,
        paper: PaperWallet,
        min_order_notional: f64,
        fee_rate: f64,
        leverage: u32,
        quote_currency: impl Into<String>,
    ) -> Self {
        info!(mode = %mode, min_order_notional, fee_rate, leverage, "order executor initialised");
        Self {
            mode,
            client,
            market_data,
            store,
            paper: Mutex::new(paper),
            min_order_notional,
            fee_rate,
            leverage: leverage.max(1),
            quote_currency: quote_currency.into(),
            trade_counter: AtomicU64::new(0),
            initial_capital: Mutex::new(None),
        }
    }

    /// Deterministic trade id: market code + UTC timestamp + counter.
    fn next_trade_id(&self, instrument: &Instrument) -> String {
        let n = self.trade_counter.fetch_add(1, Ordering::Relaxed);
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        format!("{}{}_{stamp}_{n}", instrument.quote, instrument.base)
    }

    /// Exchange cash balance captured when live mode was entered.
    pub fn initial_capital(&self) -> Option<f64> {
        *self.initial_capital.lock()
    }

    /// Synchronize `initial_capital` with the exchange cash balance. Must be
    /// called before the first allocation cycle in live mode.
    pub async fn sync_initial_capital(&self) -> EngineResult<f64> {
        if self.mode != TradingMode::Live {
            let cash = self.paper.lock().cash();
            *self.initial_capital.lock() = Some(cash);
            return Ok(cash);
        }

        let balances = self.market_data.get_balances().await?;
        let cash = balances
            .get(&self.quote_currency)
            .map(|b| b.total)
            .unwrap_or(0.0);
        *self.initial_capital.lock() = Some(cash);
        info!(cash, currency = %self.quote_currency, "initial capital synchronized");
        Ok(cash)
    }

    // -------------------------------------------------------------------------
    // Opens
    // -------------------------------------------------------------------------

    /// Open a long exposure for `notional` quote units.
    pub async fn open_long(
        &self,
        instrument: &Instrument,
        notional: f64,
        method: OrderMethod,
        limit_price: Option<f64>,
    ) -> EngineResult<Fill> {
        // Minted up front so rejected attempts audit under the same id the
        // exchange would have seen.
        let trade_id = self.next_trade_id(instrument);

        if let Err(e) = self.validate_open(instrument, notional, method, limit_price, PositionSide::Long) {
            self.audit_failure(&trade_id, instrument, Side::Buy, PositionSide::Long, method, notional, &e);
            return Err(e);
        }

        let result = match self.mode {
            TradingMode::Live => {
                self.live_open(instrument, &trade_id, Side::Buy, PositionSide::Long, notional, method, limit_price)
                    .await
            }
            TradingMode::Simulated => {
                self.paper_open(instrument, &trade_id, PositionSide::Long, notional, limit_price)
                    .await
            }
        };

        if let Err(e) = &result {
            self.audit_failure(&trade_id, instrument, Side::Buy, PositionSide::Long, method, notional, e);
        }
        result
    }

    /// Open a short exposure. Only valid for derivative instruments.
    pub async fn open_short(&self, instrument: &Instrument, notional: f64) -> EngineResult<Fill> {
        let trade_id = self.next_trade_id(instrument);

        if let Err(e) = self.validate_open(
            instrument,
            notional,
            OrderMethod::Market,
            None,
            PositionSide::Short,
        ) {
            self.audit_failure(&trade_id, instrument, Side::Sell, PositionSide::Short, OrderMethod::Market, notional, &e);
            return Err(e);
        }

        let result = match self.mode {
            TradingMode::Live => {
                self.live_open(
                    instrument,
                    &trade_id,
                    Side::Sell,
                    PositionSide::Short,
                    notional,
                    OrderMethod::Market,
                    None,
                )
                .await
            }
            TradingMode::Simulated => {
                self.paper_open(instrument, &trade_id, PositionSide::Short, notional, None)
                    .await
            }
        };

        if let Err(e) = &result {
            self.audit_failure(&trade_id, instrument, Side::Sell, PositionSide::Short, OrderMethod::Market, notional, e);
        }
        result
    }

    fn validate_open(
        &self,
        instrument: &Instrument,
        notional: f64,
        method: OrderMethod,
        limit_price: Option<f64>,
        position_side: PositionSide,
    ) -> EngineResult<()> {
        if position_side == PositionSide::Short && !instrument.derivative {
            return Err(EngineError::InvalidOrder(format!(
                "short rejected: {instrument} is a spot instrument"
            )));
        }
        if notional < self.min_order_notional {
            return Err(EngineError::InvalidOrder(format!(
                "notional {notional:.2} below minimum {:.2}",
                self.min_order_notional
            )));
        }
        if method == OrderMethod::Limit && limit_price.is_none() {
            return Err(EngineError::InvalidOrder(
                "LIMIT order requires a limit price".into(),
            ));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    /// Close `quantity` of an open exposure at market.
    pub async fn close(
        &self,
        instrument: &Instrument,
        quantity: f64,
        position_side: PositionSide,
    ) -> EngineResult<Fill> {
        let trade_id = self.next_trade_id(instrument);

        if quantity <= 0.0 {
            let e = EngineError::InvalidOrder(format!("close quantity {quantity} must be positive"));
            self.audit_failure(
                &trade_id,
                instrument,
                close_side(position_side),
                position_side,
                OrderMethod::Market,
                0.0,
                &e,
            );
            return Err(e);
        }

        let result = match self.mode {
            TradingMode::Live => self.live_close(instrument, &trade_id, quantity, position_side).await,
            TradingMode::Simulated => {
                self.paper_close(instrument, &trade_id, quantity, position_side).await
            }
        };

        if let Err(e) = &result {
            self.audit_failure(
                &trade_id,
                instrument,
                close_side(position_side),
                position_side,
                OrderMethod::Market,
                0.0,
                e,
            );
        }
        result
    }

    // -------------------------------------------------------------------------
    // Live path
    // -------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    async fn live_open(
        &self,
        instrument: &Instrument,
        trade_id: &str,
        side: Side,
        position_side: PositionSide,
        notional: f64,
        method: OrderMethod,
        limit_price: Option<f64>,
    ) -> EngineResult<Fill> {
        let request = match method {
            // Market buy is priced by notional; the exchange fills volume.
            OrderMethod::Market => OrderRequest {
                market: instrument.market_code(),
                side,
                ord_type: if side == Side::Buy { "price" } else { "market" }.to_string(),
                volume: if side == Side::Sell {
                    let price = self.current_price(instrument).await?;
                    Some(notional / price)
                } else {
                    None
                },
                price: (side == Side::Buy).then_some(notional),
                identifier: Some(trade_id.to_string()),
            },
            OrderMethod::Limit => {
                let price = limit_price.expect("validated");
                OrderRequest {
                    market: instrument.market_code(),
                    side,
                    ord_type: "limit".to_string(),
                    volume: Some(notional / price),
                    price: Some(price),
                    identifier: Some(trade_id.to_string()),
                }
            }
        };

        let placed = match self.client.place_order(&request).await {
            Ok(placed) => placed,
            Err(EngineError::UpstreamUnavailable(reason)) => {
                // A timed-out POST may still have landed: resolve through the
                // deterministic identifier before reporting failure.
                warn!(trade_id, reason = %reason, "order submit unclear, resolving by identifier");
                self.client.get_order_by_identifier(trade_id).await?
            }
            Err(e) => return Err(e),
        };

        let reference_price = limit_price
            .or(if placed.price > 0.0 { Some(placed.price) } else { None });
        let price = match reference_price {
            Some(p) => p,
            None => self.current_price(instrument).await?,
        };
        let quantity = if placed.executed_volume > 0.0 {
            placed.executed_volume
        } else {
            notional / price
        };
        let fee = if placed.paid_fee > 0.0 {
            placed.paid_fee
        } else {
            notional * self.fee_rate
        };

        info!(
            trade_id,
            instrument = %instrument,
            side = %side,
            price,
            quantity,
            order_uuid = %placed.uuid,
            "live order placed"
        );

        Ok(Fill {
            trade_id: trade_id.to_string(),
            instrument: instrument.clone(),
            side,
            position_side,
            price,
            quantity,
            notional,
            fee,
            executed_at: Utc::now(),
            mode: TradingMode::Live,
            order_uuid: Some(placed.uuid),
        })
    }

    async fn live_close(
        &self,
        instrument: &Instrument,
        trade_id: &str,
        quantity: f64,
        position_side: PositionSide,
    ) -> EngineResult<Fill> {
        let side = close_side(position_side);
        let request = OrderRequest {
            market: instrument.market_code(),
            side,
            ord_type: "market".to_string(),
            volume: Some(quantity),
            price: None,
            identifier: Some(trade_id.to_string()),
        };

        let placed = match self.client.place_order(&request).await {
            Ok(placed) => placed,
            Err(EngineError::UpstreamUnavailable(reason)) => {
                warn!(trade_id, reason = %reason, "close submit unclear, resolving by identifier");
                self.client.get_order_by_identifier(trade_id).await?
            }
            Err(e) => return Err(e),
        };

        let price = if placed.price > 0.0 {
            placed.price
        } else {
            self.current_price(instrument).await?
        };
        let notional = price * quantity;
        let fee = if placed.paid_fee > 0.0 {
            placed.paid_fee
        } else {
            notional * self.fee_rate
        };

        info!(
            trade_id,
            instrument = %instrument,
            side = %side,
            price,
            quantity,
            "live position closed"
        );

        Ok(Fill {
            trade_id: trade_id.to_string(),
            instrument: instrument.clone(),
            side,
            position_side,
            price,
            quantity,
            notional,
            fee,
            executed_at: Utc::now(),
            mode: TradingMode::Live,
            order_uuid: Some(placed.uuid),
        })
    }

    // -------------------------------------------------------------------------
    // Simulated path
    // -------------------------------------------------------------------------

    async fn paper_open(
        &self,
        instrument: &Instrument,
        trade_id: &str,
        position_side: PositionSide,
        notional: f64,
        limit_price: Option<f64>,
    ) -> EngineResult<Fill> {
        let price = match limit_price {
            Some(p) => p,
            None => self.current_price(instrument).await?,
        };
        let quantity = notional / price;
        let fee = notional * self.fee_rate;

        self.paper
            .lock()
            .open(&instrument.base, position_side, quantity, fee)?;

        info!(
            trade_id,
            instrument = %instrument,
            side = %position_side,
            price,
            quantity,
            "simulated open"
        );

        Ok(Fill {
            trade_id: trade_id.to_string(),
            instrument: instrument.clone(),
            side: if position_side == PositionSide::Long {
                Side::Buy
            } else {
                Side::Sell
            },
            position_side,
            price,
            quantity,
            notional,
            fee,
            executed_at: Utc::now(),
            mode: TradingMode::Simulated,
            order_uuid: None,
        })
    }

    async fn paper_close(
        &self,
        instrument: &Instrument,
        trade_id: &str,
        quantity: f64,
        position_side: PositionSide,
    ) -> EngineResult<Fill> {
        let price = self.current_price(instrument).await?;
        let notional = price * quantity;
        let fee = notional * self.fee_rate;

        self.paper
            .lock()
            .close(&instrument.base, position_side, quantity, fee)?;

        info!(
            trade_id,
            instrument = %instrument,
            side = %position_side,
            price,
            quantity,
            "simulated close"
        );

        Ok(Fill {
            trade_id: trade_id.to_string(),
            instrument: instrument.clone(),
            side: close_side(position_side),
            position_side,
            price,
            quantity,
            notional,
            fee,
            executed_at: Utc::now(),
            mode: TradingMode::Simulated,
            order_uuid: None,
        })
    }

    /// Apply realized PnL to the simulated wallet. No-op in live mode, where
    /// the exchange account already reflects it.
    pub fn add_realized_pnl(&self, delta: f64) {
        if self.mode == TradingMode::Simulated {
            self.paper.lock().add_realized_pnl(delta);
        }
    }

    // -------------------------------------------------------------------------
    // Balances & positions
    // -------------------------------------------------------------------------

    /// Uniform cash + holdings view across both modes.
    pub async fn balances_snapshot(&self) -> EngineResult<BalancesSnapshot> {
        match self.mode {
            TradingMode::Simulated => {
                let wallet = self.paper.lock();
                Ok(BalancesSnapshot {
                    cash: wallet.cash(),
                    holdings: wallet.holdings().clone(),
                })
            }
            TradingMode::Live => {
                let balances = self.market_data.get_balances().await?;
                Ok(snapshot_from_balances(&balances, &self.quote_currency))
            }
        }
    }

    /// Authoritative open positions normalized to {instrument, side, qty}.
    pub async fn standardized_positions(&self) -> EngineResult<Vec<ExchangePosition>> {
        let snapshot = self.balances_snapshot().await?;

        let mut positions = Vec::new();
        for (key, qty) in snapshot.holdings {
            if qty <= 0.0 {
                continue;
            }
            let (base, side) = match key.strip_prefix(SHORT_PREFIX) {
                Some(base) => (base.to_string(), PositionSide::Short),
                None => (key, PositionSide::Long),
            };
            let mut instrument = Instrument::spot(base, self.quote_currency.clone());
            instrument.derivative = side == PositionSide::Short;
            positions.push(ExchangePosition {
                instrument,
                side,
                qty,
            });
        }
        Ok(positions)
    }

    /// Cancel every open order, optionally restricted to one instrument.
    pub async fn cancel_all(&self, instrument: Option<&Instrument>) -> EngineResult<u32> {
        if self.mode == TradingMode::Simulated {
            // The paper path fills synchronously; nothing rests on the book.
            return Ok(0);
        }

        let market = instrument.map(|i| i.market_code());
        let open = self.client.open_orders(market.as_deref()).await?;
        let mut cancelled = 0;
        for order in open {
            match self.client.cancel_order(&order.uuid).await {
                Ok(()) => cancelled += 1,
                Err(e) => warn!(uuid = %order.uuid, error = %e, "cancel failed"),
            }
        }
        info!(cancelled, "open orders cancelled");
        Ok(cancelled)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn current_price(&self, instrument: &Instrument) -> EngineResult<f64> {
        let ticker = self.market_data.get_ticker(instrument).await?;
        if ticker.last_price <= 0.0 {
            return Err(EngineError::MissingInputs(format!(
                "no usable price for {instrument}"
            )));
        }
        Ok(ticker.last_price)
    }

    /// Append a FAILED audit row under the attempt's own trade id — the same
    /// value live orders carry as their client identifier. Failures here are
    /// logged, never raised.
    #[allow(clippy::too_many_arguments)]
    fn audit_failure(
        &self,
        trade_id: &str,
        instrument: &Instrument,
        side: Side,
        position_side: PositionSide,
        method: OrderMethod,
        notional: f64,
        error: &EngineError,
    ) {
        warn!(
            trade_id,
            instrument = %instrument,
            side = %side,
            kind = error.kind(),
            error = %error,
            "order attempt failed"
        );
        self.store.append_trade(TradeRecord {
            trade_id: trade_id.to_string(),
            instrument: instrument.clone(),
            side,
            position_side,
            method,
            price: 0.0,
            quantity: 0.0,
            notional,
            fee: 0.0,
            status: TradeStatus::Failed,
            trigger_reason: format!("ERROR: {error}"),
            score_at_trade: 0.0,
            pnl_notional: None,
            pnl_pct: None,
            mode: self.mode,
            executed_at: Utc::now(),
        });
    }
}

fn close_side(position_side: PositionSide) -> Side {
    match position_side {
        PositionSide::Long => Side::Sell,
        PositionSide::Short => Side::Buy,
    }
}

fn snapshot_from_balances(
    balances: &HashMap<String, Balance>,
    quote_currency: &str,
) -> BalancesSnapshot {
    let cash = balances.get(quote_currency).map(|b| b.free).unwrap_or(0.0);
    let holdings = balances
        .iter()
        .filter(|(currency, balance)| currency.as_str() != quote_currency && balance.total > 0.0)
        .map(|(currency, balance)| (currency.clone(), balance.total))
        .collect();
    BalancesSnapshot { cash, holdings }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("meridian-exec-{name}-{}.json", std::process::id()))
    }

    fn executor(name: &str) -> (OrderExecutor, Arc<MemoryStore>, PathBuf) {
        let client = Arc::new(ExchangeClient::new("", ""));
        let market_data = Arc::new(MarketDataAdapter::new(ExchangeClient::new("", "")));
        let store = Arc::new(MemoryStore::new());
        let path = temp_path(name);
        let wallet = PaperWallet::new(&path, 1_000_000.0);
        let exec = OrderExecutor::new(
            TradingMode::Simulated,
            client,
            market_data,
            store.clone() as Arc<dyn Store>,
            wallet,
            5_000.0,
            0.0005,
            1,
            "KRW",
        );
        (exec, store, path)
    }

    #[tokio::test]
    async fn open_below_minimum_rejected_and_audited() {
        let (exec, store, path) = executor("min");
        let inst = Instrument::spot("BTC", "KRW");

        let err = exec
            .open_long(&inst, 1_000.0, OrderMethod::Market, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_order");

        let rows = store.trades_for_day(Utc::now().date_naive());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TradeStatus::Failed);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn limit_without_price_rejected() {
        let (exec, _, path) = executor("limit");
        let inst = Instrument::spot("BTC", "KRW");
        let err = exec
            .open_long(&inst, 10_000.0, OrderMethod::Limit, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_order");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn short_on_spot_rejected() {
        let (exec, _, path) = executor("short");
        let inst = Instrument::spot("BTC", "KRW");
        let err = exec.open_short(&inst, 10_000.0).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_order");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn close_zero_quantity_rejected() {
        let (exec, _, path) = executor("zero");
        let inst = Instrument::spot("BTC", "KRW");
        let err = exec.close(&inst, 0.0, PositionSide::Long).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_order");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn simulated_open_with_limit_price_fills_locally() {
        // A limit price sidesteps the ticker lookup, so the whole simulated
        // open path runs without network access.
        let (exec, _, path) = executor("fill");
        let inst = Instrument::spot("BTC", "KRW");

        let fill = exec
            .open_long(&inst, 100_000.0, OrderMethod::Limit, Some(50_000_000.0))
            .await
            .unwrap();

        assert_eq!(fill.mode, TradingMode::Simulated);
        assert_eq!(fill.side, Side::Buy);
        assert_eq!(fill.position_side, PositionSide::Long);
        assert!((fill.quantity - 100_000.0 / 50_000_000.0).abs() < 1e-15);
        assert!((fill.fee - 50.0).abs() < 1e-9);
        assert!(fill.order_uuid.is_none());
        assert!(fill.trade_id.starts_with("KRWBTC_"));

        let snapshot = exec.balances_snapshot().await.unwrap();
        assert!((snapshot.cash - 999_950.0).abs() < 1e-9);
        assert!((snapshot.holdings["BTC"] - fill.quantity).abs() < 1e-15);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn trade_ids_are_unique_and_ordered() {
        let (exec, _, path) = executor("ids");
        let inst = Instrument::spot("BTC", "KRW");
        let a = exec.next_trade_id(&inst);
        let b = exec.next_trade_id(&inst);
        assert_ne!(a, b);
        assert!(a.ends_with("_0"));
        assert!(b.ends_with("_1"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn standardized_positions_parse_short_prefix() {
        let (exec, _, path) = executor("std");
        {
            let mut wallet = exec.paper.lock();
            wallet.open("BTC", PositionSide::Long, 0.5, 0.0).unwrap();
            wallet.open("ETH", PositionSide::Short, 2.0, 0.0).unwrap();
        }

        let mut positions = exec.standardized_positions().await.unwrap();
        positions.sort_by(|a, b| a.instrument.base.cmp(&b.instrument.base));

        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].instrument.base, "BTC");
        assert_eq!(positions[0].side, PositionSide::Long);
        assert_eq!(positions[1].instrument.base, "ETH");
        assert_eq!(positions[1].side, PositionSide::Short);
        assert!((positions[1].qty - 2.0).abs() < 1e-12);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn cancel_all_is_noop_in_simulated_mode() {
        let (exec, _, path) = executor("cancel");
        assert_eq!(exec.cancel_all(None).await.unwrap(), 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn live_snapshot_maps_quote_currency_to_cash() {
        let mut balances = HashMap::new();
        balances.insert(
            "KRW".to_string(),
            Balance {
                free: 700_000.0,
                used: 0.0,
                total: 700_000.0,
                avg_buy_price: 0.0,
            },
        );
        balances.insert(
            "BTC".to_string(),
            Balance {
                free: 0.01,
                used: 0.0,
                total: 0.01,
                avg_buy_price: 100_000_000.0,
            },
        );
        let snapshot = snapshot_from_balances(&balances, "KRW");
        assert!((snapshot.cash - 700_000.0).abs() < 1e-9);
        assert_eq!(snapshot.holdings.len(), 1);
        assert!((snapshot.holdings["BTC"] - 0.01).abs() < 1e-12);
    }
}
