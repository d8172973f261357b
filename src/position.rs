// =============================================================================
// Position Tracker — authoritative local position state
// =============================================================================
//
// Single-writer invariant: only the engine loop mutates positions. Readers
// take a snapshot under a short lock. Every mutation persists the full map to
// a JSON snapshot (atomic tmp + rename) so restarts rehydrate open positions.
//
// A position whose volume reaches zero is closed and must be evicted; the
// tracker never stores zero-volume entries.
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{Instrument, PositionSide};

fn default_tp_stage() -> u8 {
    0
}

/// An open exposure in one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub trade_id: String,
    pub instrument: Instrument,
    pub position_side: PositionSide,
    /// Remaining open quantity; strictly positive while tracked.
    pub volume: f64,
    pub avg_entry_price: f64,
    /// Quantity at open; partial-close fractions are taken from this.
    pub initial_quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub initial_margin: f64,
    pub opened_at: DateTime<Utc>,
    /// High-water mark for longs, low-water mark for shorts.
    #[serde(default)]
    pub peak_price: f64,
    /// 0 = no tier hit, 1 = first tier, 2 = second tier.
    #[serde(default = "default_tp_stage")]
    pub tp_stage: u8,
    /// Set once the first take-profit tier fires.
    #[serde(default)]
    pub trailing_active: bool,
}

impl Position {
    /// Signed PnL fraction at `current_price` (0.016 = +1.6 %).
    pub fn pnl_fraction(&self, current_price: f64) -> f64 {
        if self.avg_entry_price <= 0.0 {
            return 0.0;
        }
        match self.position_side {
            PositionSide::Long => (current_price - self.avg_entry_price) / self.avg_entry_price,
            PositionSide::Short => (self.avg_entry_price - current_price) / self.avg_entry_price,
        }
    }

    /// Signed PnL in quote-currency units at `current_price`.
    pub fn pnl_notional(&self, current_price: f64) -> f64 {
        match self.position_side {
            PositionSide::Long => (current_price - self.avg_entry_price) * self.volume,
            PositionSide::Short => (self.avg_entry_price - current_price) * self.volume,
        }
    }

    pub fn hold_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_minutes()
    }
}

/// Thread-safe store of open positions keyed by market code.
pub struct PositionTracker {
    positions: RwLock<HashMap<String, Position>>,
    state_path: PathBuf,
}

impl PositionTracker {
    /// Create a tracker backed by `state_path`, rehydrating any persisted
    /// positions. Unreadable state is logged and ignored.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let positions = Self::load(&state_path);
        if !positions.is_empty() {
            info!(count = positions.len(), "open positions rehydrated");
        }
        Self {
            positions: RwLock::new(positions),
            state_path,
        }
    }

    // -------------------------------------------------------------------------
    // Mutations (engine loop only)
    // -------------------------------------------------------------------------

    /// Register a newly opened position.
    pub fn open(&self, mut position: Position) {
        if position.peak_price <= 0.0 {
            position.peak_price = position.avg_entry_price;
        }
        info!(
            trade_id = %position.trade_id,
            instrument = %position.instrument,
            side = %position.position_side,
            entry = position.avg_entry_price,
            qty = position.volume,
            stop_loss = position.stop_loss,
            take_profit = position.take_profit,
            "position opened"
        );
        let market = position.instrument.market_code();
        self.positions.write().insert(market, position);
        self.persist();
    }

    /// Advance the peak price (high-water for longs, low-water for shorts).
    pub fn update_peak(&self, market: &str, current_price: f64) {
        let mut positions = self.positions.write();
        let Some(pos) = positions.get_mut(market) else {
            return;
        };
        let moved = match pos.position_side {
            PositionSide::Long => current_price > pos.peak_price,
            PositionSide::Short => current_price < pos.peak_price,
        };
        if moved {
            pos.peak_price = current_price;
            drop(positions);
            self.persist();
        }
    }

    /// Reduce a position after a partial close. Bumps `tp_stage` to at least
    /// `new_stage` and activates the trailing stop. Returns the updated
    /// remaining volume, or `None` when the market is not tracked.
    pub fn reduce(&self, market: &str, closed_qty: f64, new_stage: u8) -> Option<f64> {
        let remaining = {
            let mut positions = self.positions.write();
            let pos = positions.get_mut(market)?;
            pos.volume = (pos.volume - closed_qty).max(0.0);
            pos.tp_stage = pos.tp_stage.max(new_stage);
            pos.trailing_active = true;
            pos.volume
        };
        self.persist();

        info!(
            market,
            closed_qty,
            remaining,
            stage = new_stage,
            "position reduced"
        );
        Some(remaining)
    }

    /// Remove a position entirely, returning the final record.
    pub fn evict(&self, market: &str) -> Option<Position> {
        let removed = self.positions.write().remove(market);
        if let Some(pos) = &removed {
            self.persist();
            info!(
                market,
                side = %pos.position_side,
                "position closed"
            );
        }
        removed
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn get(&self, market: &str) -> Option<Position> {
        self.positions.read().get(market).cloned()
    }

    pub fn has(&self, market: &str) -> bool {
        self.positions.read().contains_key(market)
    }

    /// Snapshot of all open positions.
    pub fn all(&self) -> HashMap<String, Position> {
        self.positions.read().clone()
    }

    pub fn count(&self) -> usize {
        self.positions.read().len()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    fn load(path: &Path) -> HashMap<String, Position> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return HashMap::new(),
        };
        match serde_json::from_str::<HashMap<String, Position>>(&content) {
            Ok(map) => map
                .into_iter()
                .filter(|(_, p)| p.volume > 0.0 && p.avg_entry_price > 0.0)
                .collect(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "position snapshot unreadable, starting empty");
                HashMap::new()
            }
        }
    }

    /// Atomic write: serialize to `.tmp`, then rename over the snapshot.
    fn persist(&self) {
        let snapshot = self.positions.read().clone();
        let content = match serde_json::to_string(&snapshot) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "position snapshot serialize failed");
                return;
            }
        };

        if let Some(parent) = self.state_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp = self.state_path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, &content) {
            warn!(error = %e, "position snapshot write failed");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, &self.state_path) {
            warn!(error = %e, "position snapshot rename failed");
        }
    }
}
