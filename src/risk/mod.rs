// =============================================================================
// Risk Engine — per-position exit cascade + daily-loss circuit breaker
// =============================================================================
//
// Exit cascade, first match wins:
//   1. Fixed stop loss        PnL% <= stop_loss_pct (default -1.0%)
//   2. Dynamic stop           10-bar low (long) / high (short), capped at
//                             2% from entry
//   3. Take-profit tiers      +2.5% full close; +1.5% closes 30% (stage 2);
//                             +0.8% closes 30% (stage 1). The final tier is
//                             checked first so a price that jumps straight
//                             past it closes fully.
//   4. Trailing stop          active from stage >= 1; 0.4% pullback from peak
//   5. EMA-cross exit         only while PnL% < 0
//   6. Max-hold               default 60 minutes, only at PnL% <= 0
//
// Peak price is updated by the caller before evaluation.
//
// The daily circuit breaker tracks realized PnL against the portfolio value;
// crossing the (negative) daily loss limit suppresses new entries for the
// rest of the KST day. Exits always keep running. Counters and the auto-halt
// reset on KST day rollover; a manual pause survives rollover until resumed.
// =============================================================================

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RiskConfig;
use crate::indicators::IndicatorSnapshot;
use crate::position::Position;
use crate::types::PositionSide;

/// Dynamic-stop cap: the stop never sits further than 2% from entry.
const DYNAMIC_SL_CAP: f64 = 0.02;
/// Take-profit tiers as PnL fractions.
const TP_TIER_1: f64 = 0.008;
const TP_TIER_2: f64 = 0.015;
const TP_TIER_FINAL: f64 = 0.025;
/// Fraction of the initial quantity closed by the partial tiers.
const TP_PARTIAL_FRACTION: f64 = 0.30;

fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("valid fixed offset")
}

fn kst_today() -> NaiveDate {
    Utc::now().with_timezone(&kst()).date_naive()
}

/// What the executor should do with a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskActionKind {
    Hold,
    StopLoss,
    TakeProfit,
    TrailingStop,
    MaxHold,
}

impl std::fmt::Display for RiskActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hold => write!(f, "HOLD"),
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::TakeProfit => write!(f, "TAKE_PROFIT"),
            Self::TrailingStop => write!(f, "TRAILING_STOP"),
            Self::MaxHold => write!(f, "MAX_HOLD"),
        }
    }
}

/// One risk decision for one open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAction {
    pub market: String,
    pub action: RiskActionKind,
    /// Current PnL in percent (1.6 = +1.6%).
    pub pnl_pct: f64,
    pub pnl_notional: f64,
    pub reason: String,
    /// 1 = informational, 2 = attention, 3 = immediate.
    pub urgency: u8,
    /// Fraction of the initial quantity to close (1.0 = everything left).
    pub quantity_pct: f64,
    /// Take-profit stage to record after a partial close.
    pub new_tp_stage: Option<u8>,
}

impl RiskAction {
    fn hold(market: &str, pnl_pct: f64, pnl_notional: f64, reason: String) -> Self {
        Self {
            market: market.to_string(),
            action: RiskActionKind::Hold,
            pnl_pct,
            pnl_notional,
            reason,
            urgency: 1,
            quantity_pct: 0.0,
            new_tp_stage: None,
        }
    }
}

impl std::fmt::Display for RiskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} | PnL {:+.2}% ({:+.0}) | {}",
            self.market, self.action, self.pnl_pct, self.pnl_notional, self.reason
        )
    }
}

/// Entry-gate state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltState {
    Active,
    HaltedByDailyLimit,
    ManuallyPaused,
}

/// Serializable snapshot of the daily counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskStatus {
    pub halt_state: HaltState,
    pub daily_realized_pnl: f64,
    pub daily_trades: u32,
    pub daily_wins: u32,
    pub daily_losses: u32,
    pub consecutive_losses: u32,
    pub current_date: NaiveDate,
}

struct DailyCounters {
    halt_state: HaltState,
    daily_realized_pnl: f64,
    daily_trades: u32,
    daily_wins: u32,
    daily_losses: u32,
    consecutive_losses: u32,
    current_date: NaiveDate,
}

pub struct RiskEngine {
    cfg: RiskConfig,
    counters: RwLock<DailyCounters>,
}

impl RiskEngine {
    pub fn new(cfg: RiskConfig) -> Self {
        info!(
            stop_loss_pct = cfg.stop_loss_pct,
            take_profit_pct = cfg.take_profit_pct,
            trailing_stop_pct = cfg.trailing_stop_pct,
            max_holding_minutes = cfg.max_holding_minutes,
            daily_loss_limit_pct = cfg.daily_loss_limit_pct,
            "risk engine initialised"
        );
        Self {
            cfg,
            counters: RwLock::new(DailyCounters {
                halt_state: HaltState::Active,
                daily_realized_pnl: 0.0,
                daily_trades: 0,
                daily_wins: 0,
                daily_losses: 0,
                consecutive_losses: 0,
                current_date: kst_today(),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Per-position evaluation
    // -------------------------------------------------------------------------

    /// Evaluate one open position against the exit cascade. Exactly one
    /// action is produced per call; HOLD when no rule fires.
    pub fn evaluate(
        &self,
        position: &Position,
        current_price: f64,
        indicators: Option<&IndicatorSnapshot>,
        now: DateTime<Utc>,
    ) -> RiskAction {
        let market = position.instrument.market_code();
        if position.avg_entry_price <= 0.0 {
            return RiskAction::hold(&market, 0.0, 0.0, "no entry price on record".into());
        }

        let pnl = position.pnl_fraction(current_price);
        let pnl_pct = pnl * 100.0;
        let pnl_notional = position.pnl_notional(current_price);

        // 1. Fixed stop loss.
        if pnl_pct <= self.cfg.stop_loss_pct {
            return RiskAction {
                market,
                action: RiskActionKind::StopLoss,
                pnl_pct,
                pnl_notional,
                reason: format!(
                    "stop loss: {pnl_pct:.2}% <= {:.2}%",
                    self.cfg.stop_loss_pct
                ),
                urgency: 3,
                quantity_pct: 1.0,
                new_tp_stage: None,
            };
        }

        // 2. Dynamic stop from the recent 10-bar extreme, capped at 2% from
        // entry.
        if let Some(ind) = indicators {
            let hit = match position.position_side {
                PositionSide::Long => {
                    let cap = position.avg_entry_price * (1.0 - DYNAMIC_SL_CAP);
                    let stop = ind.recent_low_10.max(cap);
                    ind.recent_low_10.is_finite() && current_price < stop
                }
                PositionSide::Short => {
                    let cap = position.avg_entry_price * (1.0 + DYNAMIC_SL_CAP);
                    let stop = ind.recent_high_10.min(cap);
                    ind.recent_high_10.is_finite() && current_price > stop
                }
            };
            if hit {
                return RiskAction {
                    market,
                    action: RiskActionKind::StopLoss,
                    pnl_pct,
                    pnl_notional,
                    reason: "dynamic stop: price through recent 10-bar extreme".into(),
                    urgency: 3,
                    quantity_pct: 1.0,
                    new_tp_stage: None,
                };
            }
        }

        // 3. Take-profit tiers, highest first: a jump through the final tier
        // closes the whole position regardless of stage.
        if pnl >= TP_TIER_FINAL {
            return RiskAction {
                market,
                action: RiskActionKind::TakeProfit,
                pnl_pct,
                pnl_notional,
                reason: format!("take profit final: {pnl_pct:.2}% >= {:.1}%", TP_TIER_FINAL * 100.0),
                urgency: 2,
                quantity_pct: 1.0,
                new_tp_stage: Some(2),
            };
        }
        if position.tp_stage < 2 && pnl >= TP_TIER_2 {
            return RiskAction {
                market,
                action: RiskActionKind::TakeProfit,
                pnl_pct,
                pnl_notional,
                reason: format!("take profit tier 2: {pnl_pct:.2}% >= {:.1}%", TP_TIER_2 * 100.0),
                urgency: 2,
                quantity_pct: TP_PARTIAL_FRACTION,
                new_tp_stage: Some(2),
            };
        }
        if position.tp_stage < 1 && pnl >= TP_TIER_1 {
            return RiskAction {
                market,
                action: RiskActionKind::TakeProfit,
                pnl_pct,
                pnl_notional,
                reason: format!("take profit tier 1: {pnl_pct:.2}% >= {:.1}%", TP_TIER_1 * 100.0),
                urgency: 2,
                quantity_pct: TP_PARTIAL_FRACTION,
                new_tp_stage: Some(1),
            };
        }

        // 4. Trailing stop, active once the first tier has fired.
        if position.tp_stage >= 1 && position.peak_price > 0.0 {
            let pullback = match position.position_side {
                PositionSide::Long => (position.peak_price - current_price) / position.peak_price,
                PositionSide::Short => (current_price - position.peak_price) / position.peak_price,
            };
            if pullback >= self.cfg.trailing_stop_pct / 100.0 {
                return RiskAction {
                    market,
                    action: RiskActionKind::TrailingStop,
                    pnl_pct,
                    pnl_notional,
                    reason: format!(
                        "trailing stop: {:.2}% pullback from peak {:.2}",
                        pullback * 100.0,
                        position.peak_price
                    ),
                    urgency: 2,
                    quantity_pct: 1.0,
                    new_tp_stage: None,
                };
            }
        }

        // 5. EMA-cross exit while underwater.
        if pnl < 0.0 {
            if let Some(ind) = indicators {
                let crossed = match position.position_side {
                    PositionSide::Long => ind.ema_cross == -1,
                    PositionSide::Short => ind.ema_cross == 1,
                };
                if crossed {
                    return RiskAction {
                        market,
                        action: RiskActionKind::StopLoss,
                        pnl_pct,
                        pnl_notional,
                        reason: "ema cross against an underwater position".into(),
                        urgency: 2,
                        quantity_pct: 1.0,
                        new_tp_stage: None,
                    };
                }
            }
        }

        // 6. Max hold, only while not in profit.
        let held = position.hold_minutes(now);
        if held >= self.cfg.max_holding_minutes && pnl <= 0.0 {
            return RiskAction {
                market,
                action: RiskActionKind::MaxHold,
                pnl_pct,
                pnl_notional,
                reason: format!(
                    "max hold: {held} minutes >= {}",
                    self.cfg.max_holding_minutes
                ),
                urgency: 1,
                quantity_pct: 1.0,
                new_tp_stage: None,
            };
        }

        RiskAction::hold(
            &market,
            pnl_pct,
            pnl_notional,
            format!(
                "within bounds (stop {:.1}% / final tp {:.1}%)",
                self.cfg.stop_loss_pct,
                TP_TIER_FINAL * 100.0
            ),
        )
    }

    // -------------------------------------------------------------------------
    // Daily circuit breaker
    // -------------------------------------------------------------------------

    /// Record a realized trade result into the daily counters.
    pub fn record_trade_result(&self, pnl: f64) {
        self.maybe_reset_daily();
        let mut c = self.counters.write();
        c.daily_realized_pnl += pnl;
        c.daily_trades += 1;
        if pnl >= 0.0 {
            c.daily_wins += 1;
            c.consecutive_losses = 0;
        } else {
            c.daily_losses += 1;
            c.consecutive_losses += 1;
        }
        info!(
            pnl,
            daily_pnl = c.daily_realized_pnl,
            trades = c.daily_trades,
            consecutive_losses = c.consecutive_losses,
            "trade result recorded"
        );
    }

    /// Check the daily loss limit against the current portfolio value and
    /// trip the breaker when crossed. `daily_loss_limit_pct` is negative, so
    /// the comparison is `pnl_pct <= limit`.
    pub fn check_daily_loss(&self, portfolio_value: f64) -> bool {
        self.maybe_reset_daily();
        if portfolio_value <= 0.0 {
            return false;
        }

        let mut c = self.counters.write();
        let daily_pnl_pct = c.daily_realized_pnl / portfolio_value * 100.0;

        if daily_pnl_pct <= self.cfg.daily_loss_limit_pct {
            if c.halt_state == HaltState::Active {
                warn!(
                    daily_pnl = c.daily_realized_pnl,
                    daily_pnl_pct,
                    limit = self.cfg.daily_loss_limit_pct,
                    "daily loss limit reached: halting new entries"
                );
                c.halt_state = HaltState::HaltedByDailyLimit;
            }
            true
        } else {
            false
        }
    }

    /// Whether new entries may be dispatched. Exits are never gated.
    pub fn entries_allowed(&self) -> bool {
        self.maybe_reset_daily();
        self.counters.read().halt_state == HaltState::Active
    }

    pub fn halt_state(&self) -> HaltState {
        self.maybe_reset_daily();
        self.counters.read().halt_state
    }

    /// Manually suspend new entries.
    pub fn pause(&self) {
        let mut c = self.counters.write();
        c.halt_state = HaltState::ManuallyPaused;
        warn!("trading manually paused");
    }

    /// Resume from a manual pause or a tripped breaker.
    pub fn resume(&self) {
        let mut c = self.counters.write();
        c.halt_state = HaltState::Active;
        info!("trading resumed");
    }

    pub fn status(&self) -> RiskStatus {
        self.maybe_reset_daily();
        let c = self.counters.read();
        RiskStatus {
            halt_state: c.halt_state,
            daily_realized_pnl: c.daily_realized_pnl,
            daily_trades: c.daily_trades,
            daily_wins: c.daily_wins,
            daily_losses: c.daily_losses,
            consecutive_losses: c.consecutive_losses,
            current_date: c.current_date,
        }
    }

    /// Reset counters when the KST date rolls over. A tripped daily breaker
    /// clears with the new day; a manual pause stays until resumed.
    fn maybe_reset_daily(&self) {
        let today = kst_today();
        {
            let c = self.counters.read();
            if c.current_date == today {
                return;
            }
        }
        let mut c = self.counters.write();
        if c.current_date != today {
            info!(old = %c.current_date, new = %today, "daily risk counters reset");
            c.daily_realized_pnl = 0.0;
            c.daily_trades = 0;
            c.daily_wins = 0;
            c.daily_losses = 0;
            c.consecutive_losses = 0;
            c.current_date = today;
            if c.halt_state == HaltState::HaltedByDailyLimit {
                c.halt_state = HaltState::Active;
            }
        }
    }
}
