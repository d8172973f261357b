// =============================================================================
// Portfolio Allocator — score-proportional budget split
// =============================================================================
//
// Strategy:
//   - Budget split proportional to score (higher score, bigger slice).
//   - Per-instrument weight clamped to [min_pct, max_pct], then renormalized.
//   - STRONG_BUY candidates get a raw-weight boost (default 1.5x).
//   - A reserve fraction of cash is never allocated.
//   - Slices below the minimum order notional are dropped.
//
// The allocator is stateless and deterministic over its inputs.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AllocatorConfig;
use crate::scoring::ScoringResult;
use crate::types::{Instrument, TradeSignal};

/// An intended order with notional and limit price.
///
/// Score and signal are copied in by value so allocations never hold
/// references back into scoring state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub instrument: Instrument,
    pub score: f64,
    pub signal: TradeSignal,
    /// Normalized weight in [min_pct, max_pct] after clamping.
    pub weight: f64,
    /// Allocation notional in the quote currency, rounded to whole units.
    pub notional: f64,
    /// Limit price = current price × (1 − limit_discount), rounded.
    pub limit_price: f64,
    /// Target quantity = notional / limit price.
    pub target_quantity: f64,
}

impl std::fmt::Display for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {:.0} ({:.1}%) | {:.8} @ {:.0} | {} ({:.0})",
            self.instrument,
            self.notional,
            self.weight * 100.0,
            self.target_quantity,
            self.limit_price,
            self.signal,
            self.score
        )
    }
}

/// Score-based portfolio allocator.
pub struct PortfolioAllocator {
    cfg: AllocatorConfig,
}

impl PortfolioAllocator {
    pub fn new(cfg: AllocatorConfig) -> Self {
        info!(
            min_pct = cfg.min_allocation_pct,
            max_pct = cfg.max_allocation_pct,
            boost = cfg.strong_buy_boost,
            reserve = cfg.reserve_ratio,
            "allocator initialised"
        );
        Self { cfg }
    }

    /// Split the available cash across buy candidates.
    ///
    /// `candidates` should already be filtered to BUY / STRONG_BUY signals;
    /// anything else is ignored. Candidates without a current price are
    /// skipped with a warning. Returns allocations sorted by notional
    /// descending.
    pub fn allocate(
        &self,
        available_cash: f64,
        candidates: &[ScoringResult],
        current_prices: &HashMap<Instrument, f64>,
    ) -> Vec<Allocation> {
        if candidates.is_empty() {
            debug!("allocation skipped: no candidates");
            return Vec::new();
        }

        let investable = available_cash * (1.0 - self.cfg.reserve_ratio);
        info!(
            available = available_cash,
            investable,
            reserve = self.cfg.reserve_ratio,
            candidates = candidates.len(),
            "allocation cycle"
        );

        if investable < self.cfg.min_order_notional {
            warn!(investable, "allocation skipped: investable below minimum order");
            return Vec::new();
        }

        // 1. Raw score-based weights (STRONG_BUY boosted).
        let mut raw_weights: HashMap<&Instrument, f64> = HashMap::new();
        for c in candidates {
            if !c.signal.is_buy() {
                continue;
            }
            if !current_prices.contains_key(&c.instrument) {
                warn!(instrument = %c.instrument, "allocation skipped for instrument: no current price");
                continue;
            }

            let mut weight = c.total_score;
            if c.signal == TradeSignal::StrongBuy {
                weight *= self.cfg.strong_buy_boost;
            }
            raw_weights.insert(&c.instrument, weight);
        }

        if raw_weights.is_empty() {
            return Vec::new();
        }

        // 2. Normalize, 3. clamp to [min_pct, max_pct], renormalize.
        let total_raw: f64 = raw_weights.values().sum();
        let mut clamped: HashMap<&Instrument, f64> = raw_weights
            .iter()
            .map(|(inst, w)| {
                let normalized = w / total_raw;
                (
                    *inst,
                    normalized.clamp(self.cfg.min_allocation_pct, self.cfg.max_allocation_pct),
                )
            })
            .collect();

        let clamped_total: f64 = clamped.values().sum();
        if clamped_total > 0.0 {
            for w in clamped.values_mut() {
                *w /= clamped_total;
            }
        }

        // 4. Notional split; drop slices under the minimum order.
        let mut allocations = Vec::new();
        for c in candidates {
            let weight = match clamped.get(&c.instrument) {
                Some(w) => *w,
                None => continue,
            };

            let amount = investable * weight;
            if amount < self.cfg.min_order_notional {
                info!(
                    instrument = %c.instrument,
                    amount,
                    minimum = self.cfg.min_order_notional,
                    "allocation dropped: below minimum order"
                );
                continue;
            }

            let current_price = current_prices[&c.instrument];
            let limit_price = current_price * (1.0 - self.cfg.limit_discount_pct);
            let notional = amount.round();
            let limit_price_rounded = limit_price.round();
            let target_quantity = notional / limit_price;

            allocations.push(Allocation {
                instrument: c.instrument.clone(),
                score: c.total_score,
                signal: c.signal,
                weight,
                notional,
                limit_price: limit_price_rounded,
                target_quantity,
            });
        }

        allocations.sort_by(|a, b| {
            b.notional
                .partial_cmp(&a.notional)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for alloc in &allocations {
            info!(allocation = %alloc, "allocation result");
        }

        allocations
    }
}
