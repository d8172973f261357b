// =============================================================================
// Reconciler — diff-and-heal between local positions and the exchange
// =============================================================================
//
// Every risk-check cycle the tracker is compared against the authoritative
// position source (the exchange account in live mode, the paper holdings in
// simulated mode), normalized to {instrument, side, qty}:
//
//   1. Tracked locally, absent (or opposite side) on the exchange:
//      the position is gone; log critical, emit an event, evict it.
//   2. Present on the exchange, untracked locally (or opposite side):
//      an unmanaged position; market-close it immediately, log critical,
//      emit an event. The tracker is not touched (it had no record).
//
// The tracker therefore never disagrees with the exchange for more than one
// cycle.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use crate::error::EngineResult;
use crate::execution::OrderExecutor;
use crate::notify::{NotificationEvent, NotificationSink};
use crate::position::PositionTracker;

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Local positions confirmed by the exchange.
    pub matched: u32,
    /// Local positions evicted because the exchange no longer has them.
    pub disappeared: u32,
    /// Exchange positions closed because nothing local tracked them.
    pub unmanaged_closed: u32,
}

/// Run one reconciliation cycle.
pub async fn reconcile_once(
    executor: &Arc<OrderExecutor>,
    tracker: &Arc<PositionTracker>,
    sink: &NotificationSink,
) -> EngineResult<ReconcileReport> {
    let exchange_positions = executor.standardized_positions().await?;
    let tracked = tracker.all();

    let mut report = ReconcileReport::default();

    // 1. Tracked here but missing (or flipped) on the exchange.
    for (market, local) in &tracked {
        let confirmed = exchange_positions.iter().any(|p| {
            p.instrument.market_code() == *market && p.side == local.position_side
        });
        if confirmed {
            report.matched += 1;
            continue;
        }

        error!(
            market = %market,
            side = %local.position_side,
            "tracked position no longer exists on the exchange; evicting"
        );
        tracker.evict(market);
        report.disappeared += 1;
        sink.publish(NotificationEvent::PositionDisappeared {
            market: market.clone(),
            side: local.position_side.to_string(),
        });
    }

    // 2. On the exchange but not tracked here: close it immediately. The
    // tracker had no record, so a successful close leaves it untouched.
    for exchange_pos in &exchange_positions {
        let market = exchange_pos.instrument.market_code();
        let managed = tracked
            .get(&market)
            .map(|local| local.position_side == exchange_pos.side)
            .unwrap_or(false);
        if managed {
            continue;
        }

        error!(
            market = %market,
            side = %exchange_pos.side,
            qty = exchange_pos.qty,
            "unmanaged exchange position detected; closing at market"
        );

        match executor
            .close(&exchange_pos.instrument, exchange_pos.qty, exchange_pos.side)
            .await
        {
            Ok(_fill) => {
                report.unmanaged_closed += 1;
                sink.publish(NotificationEvent::UnmanagedClosed {
                    market,
                    side: exchange_pos.side.to_string(),
                    qty: exchange_pos.qty,
                });
            }
            Err(e) => {
                // Leave it for the next cycle rather than failing the pass.
                error!(market = %market, error = %e, "unmanaged close failed");
            }
        }
    }

    Ok(report)
}
