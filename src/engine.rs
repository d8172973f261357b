// =============================================================================
// Engine — component wiring and the scheduled job bodies
// =============================================================================
//
// The engine owns every subsystem; there is no module-level mutable state.
// Job bodies are the only layer that converts errors into notification
// events: each body catches per-instrument failures, records them, and keeps
// going so one bad instrument never blocks the others.
//
// Data flow per cycle:
//   collect_data    pull candles into the store
//   calc_indicators candles -> indicator snapshot + volatility profile
//   scoring         snapshots -> scoring results
//   execute_buy     results -> allocations -> fills -> tracked positions
//   risk_check      positions + prices -> risk actions -> closes, then
//                   one reconciliation pass
//   daily_feedback  close rows -> daily summary (00:30 KST)
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use tracing::{info, warn};

use crate::allocator::PortfolioAllocator;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::exchange::ExchangeClient;
use crate::execution::{Fill, OrderExecutor, PaperWallet};
use crate::indicators::{self, IndicatorSnapshot};
use crate::market_data::MarketDataAdapter;
use crate::notify::{run_log_drain, NotificationEvent, NotificationSink};
use crate::position::{Position, PositionTracker};
use crate::reconcile::reconcile_once;
use crate::risk::{RiskActionKind, RiskEngine};
use crate::scheduler::{JobId, Scheduler};
use crate::scoring::{MultiFactorScorer, VolatilityProfile};
use crate::store::{DailySummary, MemoryStore, Store, TradeRecord, TradeStatus};
use crate::types::{Instrument, OrderMethod, PositionSide, TradingMode, VolatilityRegime};

/// Candle timeframe driving indicators and scoring, in minutes.
const PRIMARY_TIMEFRAME_MIN: u32 = 5;
/// Candle count requested per collection cycle.
const CANDLE_FETCH_COUNT: u32 = 200;
/// Scheduler tick granularity.
const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("valid fixed offset")
}

pub struct Engine {
    cfg: EngineConfig,
    instruments: Vec<Instrument>,
    market_data: Arc<MarketDataAdapter>,
    store: Arc<dyn Store>,
    scorer: MultiFactorScorer,
    allocator: PortfolioAllocator,
    executor: Arc<OrderExecutor>,
    tracker: Arc<PositionTracker>,
    risk: Arc<RiskEngine>,
    scheduler: Scheduler,
    sink: NotificationSink,
    stopping: Arc<AtomicBool>,
}

impl Engine {
    /// Build the engine from validated configuration. Spawns the
    /// notification log drain.
    pub fn new(cfg: EngineConfig) -> EngineResult<Self> {
        cfg.validate()?;

        let instruments: Vec<Instrument> = cfg
            .target_instruments
            .iter()
            .map(|base| Instrument::spot(base.clone(), cfg.quote_currency.clone()))
            .collect();

        let client = Arc::new(ExchangeClient::new(
            cfg.access_key.clone(),
            cfg.secret_key.clone(),
        ));
        let market_data = Arc::new(MarketDataAdapter::new((*client).clone()));
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

        let scorer = MultiFactorScorer::new(cfg.weights.clone(), cfg.thresholds.clone())?;
        let allocator = PortfolioAllocator::new(cfg.allocator.clone());
        let risk = Arc::new(RiskEngine::new(cfg.risk.clone()));

        let wallet = PaperWallet::new("data/paper_state.json", cfg.paper_starting_cash);
        let executor = Arc::new(OrderExecutor::new(
            cfg.trading_mode,
            client,
            market_data.clone(),
            store.clone(),
            wallet,
            cfg.allocator.min_order_notional,
            cfg.fee_rate,
            cfg.leverage,
            cfg.quote_currency.clone(),
        ));

        let tracker = Arc::new(PositionTracker::new("data/open_positions.json"));
        let scheduler = Scheduler::new(&cfg.intervals);

        let (sink, rx) = NotificationSink::channel();
        tokio::spawn(run_log_drain(rx));

        Ok(Self {
            cfg,
            instruments,
            market_data,
            store,
            scorer,
            allocator,
            executor,
            tracker,
            risk,
            scheduler,
            sink,
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag checked between jobs; setting it lets the current job finish and
    /// then exits the loop.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stopping.clone()
    }

    // -------------------------------------------------------------------------
    // Main loop
    // -------------------------------------------------------------------------

    /// Run the cooperative scheduler loop until the stop flag is set.
    pub async fn run(&self) -> EngineResult<()> {
        self.sink.publish(NotificationEvent::EngineStarted {
            mode: self.cfg.trading_mode.to_string(),
            instruments: self.instruments.iter().map(|i| i.market_code()).collect(),
        });

        // Live mode must know the exchange cash balance before the first
        // allocation cycle.
        if self.cfg.trading_mode == TradingMode::Live {
            let capital = self.executor.sync_initial_capital().await?;
            info!(capital, "live mode: initial capital synchronized");
        }

        info!(
            mode = %self.cfg.trading_mode,
            instruments = ?self.cfg.target_instruments,
            "engine loop starting"
        );

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        while !self.stopping.load(Ordering::Relaxed) {
            ticker.tick().await;

            for job in self.scheduler.due_jobs(Utc::now()) {
                if self.stopping.load(Ordering::Relaxed) && job != JobId::DailyFeedback {
                    break;
                }
                self.dispatch(job).await;
            }
        }

        // Shutdown: the daily summary completes even while stopping.
        self.dispatch(JobId::DailyFeedback).await;
        self.sink.publish(NotificationEvent::EngineStopped);
        info!("engine loop stopped");
        Ok(())
    }

    /// Run one job body, recording stats and converting errors to events.
    async fn dispatch(&self, job: JobId) {
        // Pause and the daily-loss halt suppress entries only; every other
        // job keeps running.
        if job.is_entry_job() && !self.risk.entries_allowed() {
            info!(state = ?self.risk.halt_state(), "buy execution skipped");
            return;
        }

        self.scheduler.mark_running(job);
        let result = match job {
            JobId::CollectData => self.job_collect_data().await,
            JobId::CalcIndicators => self.job_calc_indicators().await,
            JobId::Scoring => self.job_scoring().await,
            JobId::ExecuteBuy => self.job_execute_buy().await,
            JobId::RiskCheck => self.job_risk_check().await,
            JobId::DailyFeedback => self.job_daily_feedback().await,
        };

        match result {
            Ok(()) => self.scheduler.record_success(job),
            Err(e) => {
                self.scheduler.record_error(job);
                warn!(job = %job, kind = e.kind(), error = %e, "job failed");
                self.sink.publish(NotificationEvent::JobError {
                    job: job.as_str().to_string(),
                    error_kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    // -------------------------------------------------------------------------
    // Job: collect data
    // -------------------------------------------------------------------------

    async fn job_collect_data(&self) -> EngineResult<()> {
        let mut failures = 0;
        let mut last_error = None;

        for instrument in &self.instruments {
            match self
                .market_data
                .get_candles(instrument, PRIMARY_TIMEFRAME_MIN, CANDLE_FETCH_COUNT)
                .await
            {
                Ok(candles) => {
                    info!(instrument = %instrument, rows = candles.len(), "candles collected");
                    self.store.put_candles(instrument, candles);
                }
                Err(e) => {
                    warn!(instrument = %instrument, error = %e, "candle collection failed");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        // Only a total blackout fails the job.
        if failures == self.instruments.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Job: indicators
    // -------------------------------------------------------------------------

    async fn job_calc_indicators(&self) -> EngineResult<()> {
        for instrument in &self.instruments {
            let Some(candles) = self.store.get_candles(instrument) else {
                warn!(instrument = %instrument, "no candles collected yet; skipping indicators");
                continue;
            };

            let Some(snapshot) =
                indicators::compute_snapshot(&candles, 1.5)
            else {
                warn!(
                    instrument = %instrument,
                    rows = candles.len(),
                    "series too short for indicators"
                );
                continue;
            };

            self.store
                .put_volatility(instrument, volatility_profile(&snapshot));
            self.store.put_indicators(instrument, snapshot);
            info!(instrument = %instrument, "indicators refreshed");
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Job: scoring
    // -------------------------------------------------------------------------

    async fn job_scoring(&self) -> EngineResult<()> {
        let sentiment = self.store.latest_sentiment();
        let mut scored = 0;

        for instrument in &self.instruments {
            let Some(ind) = self.store.latest_indicators(instrument) else {
                warn!(instrument = %instrument, "scoring skipped: indicators missing");
                continue;
            };
            let volatility = self.store.latest_volatility(instrument);

            let result =
                self.scorer
                    .score(instrument, &ind, volatility.as_ref(), sentiment.as_ref());
            info!(
                instrument = %instrument,
                total = result.total_score,
                signal = %result.signal,
                confidence = result.confidence,
                "scored"
            );
            self.store.insert_scoring_result(result);
            scored += 1;
        }

        if scored == 0 && !self.instruments.is_empty() {
            return Err(EngineError::MissingInputs(
                "no instrument had indicator snapshots to score".into(),
            ));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Job: buy execution
    // -------------------------------------------------------------------------

    async fn job_execute_buy(&self) -> EngineResult<()> {
        // Re-score from the stored snapshots so entries always use the
        // freshest persisted inputs.
        let sentiment = self.store.latest_sentiment();
        let mut candidates = Vec::new();
        for instrument in &self.instruments {
            if self.tracker.has(&instrument.market_code()) {
                continue; // one open exposure per instrument
            }
            let Some(ind) = self.store.latest_indicators(instrument) else {
                continue;
            };
            let volatility = self.store.latest_volatility(instrument);
            let result =
                self.scorer
                    .score(instrument, &ind, volatility.as_ref(), sentiment.as_ref());
            if result.signal.is_buy() {
                candidates.push(result);
            }
        }

        if candidates.is_empty() {
            info!("buy cycle: no candidates");
            return Ok(());
        }

        let balances = self.executor.balances_snapshot().await?;
        let cash = balances.cash;
        if cash < self.cfg.allocator.min_order_notional {
            warn!(cash, "buy cycle: cash below minimum order");
            return Ok(());
        }

        let candidate_instruments: Vec<Instrument> =
            candidates.iter().map(|c| c.instrument.clone()).collect();
        let prices = self
            .market_data
            .get_current_prices(&candidate_instruments)
            .await?;

        // Daily circuit breaker: realized loss measured against the session's
        // starting capital when known, otherwise the current portfolio.
        let margins: f64 = self
            .tracker
            .all()
            .values()
            .map(|p| p.initial_margin)
            .sum();
        let portfolio_value = self
            .executor
            .initial_capital()
            .unwrap_or(cash + margins);
        if self.risk.check_daily_loss(portfolio_value) {
            let status = self.risk.status();
            self.sink.publish(NotificationEvent::DailyLossHalt {
                daily_pnl: status.daily_realized_pnl,
                portfolio_value,
            });
            return Ok(());
        }

        let allocations = self.allocator.allocate(cash, &candidates, &prices);
        for alloc in allocations {
            let fill = match self
                .executor
                .open_long(
                    &alloc.instrument,
                    alloc.notional,
                    OrderMethod::Limit,
                    Some(alloc.limit_price),
                )
                .await
            {
                Ok(fill) => fill,
                Err(e) => {
                    warn!(instrument = %alloc.instrument, error = %e, "buy failed");
                    continue;
                }
            };

            self.tracker.open(Position {
                trade_id: fill.trade_id.clone(),
                instrument: fill.instrument.clone(),
                position_side: PositionSide::Long,
                volume: fill.quantity,
                avg_entry_price: fill.price,
                initial_quantity: fill.quantity,
                stop_loss: fill.price * (1.0 + self.cfg.risk.stop_loss_pct / 100.0),
                take_profit: fill.price * (1.0 + self.cfg.risk.take_profit_pct / 100.0),
                initial_margin: fill.notional / self.cfg.leverage.max(1) as f64,
                opened_at: fill.executed_at,
                peak_price: fill.price,
                tp_stage: 0,
                trailing_active: false,
            });

            self.record_fill(
                &fill,
                OrderMethod::Limit,
                format!("SCORE_{:.0}", alloc.score),
                alloc.score,
                None,
                None,
            );
            self.sink.publish(NotificationEvent::TradeExecuted {
                trade_id: fill.trade_id.clone(),
                market: fill.instrument.market_code(),
                side: fill.side.to_string(),
                price: fill.price,
                quantity: fill.quantity,
                notional: fill.notional,
                trigger: format!("{} ({:.0})", alloc.signal, alloc.score),
            });
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Job: risk check (+ reconciliation)
    // -------------------------------------------------------------------------

    async fn job_risk_check(&self) -> EngineResult<()> {
        let positions = self.tracker.all();

        if !positions.is_empty() {
            let held: Vec<Instrument> = positions
                .values()
                .map(|p| p.instrument.clone())
                .collect();
            let prices = self.market_data.get_current_prices(&held).await?;

            for (market, position) in positions {
                let Some(&price) = prices.get(&position.instrument) else {
                    warn!(market = %market, "risk check skipped: no current price");
                    continue;
                };

                // Peak must be current before the trailing rule runs.
                self.tracker.update_peak(&market, price);
                let position = self
                    .tracker
                    .get(&market)
                    .unwrap_or(position);

                let ind = self.store.latest_indicators(&position.instrument);
                let action = self.risk.evaluate(&position, price, ind.as_ref(), Utc::now());

                if action.action == RiskActionKind::Hold {
                    continue;
                }

                self.sink.publish(NotificationEvent::RiskTriggered {
                    action: action.clone(),
                });
                warn!(action = %action, "risk action");

                if let Err(e) = self.close_from_action(&position, &action).await {
                    warn!(market = %market, error = %e, "risk close failed");
                }
            }
        }

        // Reconciliation runs on every risk tick so local state never drifts
        // from the exchange for more than one cycle.
        let report = reconcile_once(&self.executor, &self.tracker, &self.sink).await?;
        if report.disappeared > 0 || report.unmanaged_closed > 0 {
            warn!(
                disappeared = report.disappeared,
                unmanaged_closed = report.unmanaged_closed,
                "reconciliation healed divergence"
            );
        }

        Ok(())
    }

    /// Close (fully or partially) a position as instructed by a risk action.
    async fn close_from_action(
        &self,
        position: &Position,
        action: &crate::risk::RiskAction,
    ) -> EngineResult<()> {
        let market = position.instrument.market_code();

        let qty_to_close = if action.quantity_pct >= 1.0 {
            position.volume
        } else {
            (position.initial_quantity * action.quantity_pct).min(position.volume)
        };
        if qty_to_close <= 0.0 {
            return Ok(());
        }

        let fill = self
            .executor
            .close(&position.instrument, qty_to_close, position.position_side)
            .await?;

        // Realized PnL on the closed quantity.
        let gross = match position.position_side {
            PositionSide::Long => (fill.price - position.avg_entry_price) * qty_to_close,
            PositionSide::Short => (position.avg_entry_price - fill.price) * qty_to_close,
        };
        self.executor.add_realized_pnl(gross);

        let entry_fee = position.avg_entry_price * qty_to_close * self.cfg.fee_rate;
        let net = gross - fill.fee - entry_fee;
        let pnl_pct = position.pnl_fraction(fill.price) * 100.0;

        self.risk.record_trade_result(net);

        let full_close = qty_to_close >= position.volume || action.quantity_pct >= 1.0;
        if full_close {
            if self.tracker.evict(&market).is_none() {
                return Err(EngineError::StateInconsistency(format!(
                    "{market} vanished from the tracker during close"
                )));
            }
        } else if self
            .tracker
            .reduce(&market, qty_to_close, action.new_tp_stage.unwrap_or(0))
            .is_none()
        {
            return Err(EngineError::StateInconsistency(format!(
                "{market} vanished from the tracker during partial close"
            )));
        }

        self.record_fill(
            &fill,
            OrderMethod::Market,
            action.action.to_string(),
            0.0,
            Some(net),
            Some(pnl_pct),
        );

        info!(
            market = %market,
            action = %action.action,
            qty = qty_to_close,
            net_pnl = net,
            full_close,
            "position exit executed"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Job: daily feedback
    // -------------------------------------------------------------------------

    async fn job_daily_feedback(&self) -> EngineResult<()> {
        let today = Utc::now().with_timezone(&kst()).date_naive();
        let rows = self.store.trades_for_day(today);

        // Only realized exits count toward the day's result.
        let closes: Vec<&TradeRecord> = rows
            .iter()
            .filter(|r| r.status == TradeStatus::Filled && r.pnl_notional.is_some())
            .collect();

        let trades = closes.len() as u32;
        let wins = closes
            .iter()
            .filter(|r| r.pnl_notional.unwrap_or(0.0) >= 0.0)
            .count() as u32;
        let losses = trades - wins;
        let realized_pnl: f64 = closes.iter().filter_map(|r| r.pnl_notional).sum();
        let fees: f64 = rows
            .iter()
            .filter(|r| r.status == TradeStatus::Filled)
            .map(|r| r.fee)
            .sum();

        let summary = DailySummary {
            trades,
            wins,
            losses,
            win_rate: if trades > 0 {
                wins as f64 / trades as f64
            } else {
                0.0
            },
            realized_pnl,
            fees,
        };

        info!(
            date = %today,
            trades,
            wins,
            losses,
            realized_pnl,
            "daily summary"
        );
        self.store.save_daily_summary(today, summary.clone());
        self.sink.publish(NotificationEvent::DailySummary {
            date: today.to_string(),
            summary,
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Append a FILLED trade-log row for a fill.
    fn record_fill(
        &self,
        fill: &Fill,
        method: OrderMethod,
        trigger_reason: String,
        score: f64,
        pnl_notional: Option<f64>,
        pnl_pct: Option<f64>,
    ) {
        self.store.append_trade(TradeRecord {
            trade_id: fill.trade_id.clone(),
            instrument: fill.instrument.clone(),
            side: fill.side,
            position_side: fill.position_side,
            method,
            price: fill.price,
            quantity: fill.quantity,
            notional: fill.notional,
            fee: fill.fee,
            status: TradeStatus::Filled,
            trigger_reason,
            score_at_trade: score,
            pnl_notional,
            pnl_pct,
            mode: fill.mode,
            executed_at: fill.executed_at,
        });
    }
}

/// Derive the volatility profile fed into scoring from the indicator
/// snapshot. Regime boundaries follow the ATR% bands the scorer rewards.
fn volatility_profile(snapshot: &IndicatorSnapshot) -> VolatilityProfile {
    let atr_percent = snapshot.atr_pct * 100.0;
    let regime = if !atr_percent.is_finite() {
        VolatilityRegime::Medium
    } else if atr_percent < 1.0 {
        VolatilityRegime::Low
    } else if atr_percent <= 3.0 {
        VolatilityRegime::Medium
    } else if atr_percent <= 5.0 {
        VolatilityRegime::High
    } else {
        VolatilityRegime::Extreme
    };

    VolatilityProfile {
        regime,
        atr_percent,
        bb_width: snapshot.bollinger_width,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_atr(atr_fraction: f64) -> IndicatorSnapshot {
        let mut snap = blank();
        snap.atr_pct = atr_fraction;
        snap.bollinger_width = 0.04;
        snap
    }

    fn blank() -> IndicatorSnapshot {
        IndicatorSnapshot {
            current_price: f64::NAN,
            open_price: f64::NAN,
            ema_fast: f64::NAN,
            ema_slow: f64::NAN,
            ema_12: f64::NAN,
            ema_26: f64::NAN,
            ema_bullish: false,
            ema_cross: 0,
            sma_5: f64::NAN,
            sma_20: f64::NAN,
            sma_60: f64::NAN,
            rsi_14: f64::NAN,
            macd: f64::NAN,
            macd_signal: f64::NAN,
            macd_histogram: f64::NAN,
            bollinger_upper: f64::NAN,
            bollinger_mid: f64::NAN,
            bollinger_lower: f64::NAN,
            bollinger_pct_b: f64::NAN,
            bollinger_width: f64::NAN,
            atr_14: f64::NAN,
            atr_pct: f64::NAN,
            vwap: f64::NAN,
            volume_ratio: f64::NAN,
            volume_surge: false,
            obv_trend: crate::types::ObvTrend::Neutral,
            stoch_k: f64::NAN,
            stoch_d: f64::NAN,
            roc_12: f64::NAN,
            cci_20: f64::NAN,
            adx: f64::NAN,
            recent_low_10: f64::NAN,
            recent_high_10: f64::NAN,
        }
    }

    #[test]
    fn volatility_regime_bands() {
        assert_eq!(
            volatility_profile(&snapshot_with_atr(0.005)).regime,
            VolatilityRegime::Low
        );
        assert_eq!(
            volatility_profile(&snapshot_with_atr(0.02)).regime,
            VolatilityRegime::Medium
        );
        assert_eq!(
            volatility_profile(&snapshot_with_atr(0.04)).regime,
            VolatilityRegime::High
        );
        assert_eq!(
            volatility_profile(&snapshot_with_atr(0.08)).regime,
            VolatilityRegime::Extreme
        );
        // Unknown ATR falls back to the neutral regime.
        assert_eq!(
            volatility_profile(&blank()).regime,
            VolatilityRegime::Medium
        );
    }

    #[test]
    fn volatility_profile_converts_to_percent() {
        let profile = volatility_profile(&snapshot_with_atr(0.02));
        assert!((profile.atr_percent - 2.0).abs() < 1e-12);
        assert!((profile.bb_width - 0.04).abs() < 1e-12);
    }
}
