// =============================================================================
// Notification events
// =============================================================================
//
// Jobs and components publish events into an mpsc channel; the built-in drain
// logs them. External sinks (chat webhooks, dashboards) are separate
// processes consuming the same event shape.
//
// Publishing never blocks the engine: a full or closed channel drops the
// event with a log line.
// =============================================================================

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::risk::RiskAction;
use crate::store::DailySummary;

/// Events surfaced to operators.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    EngineStarted {
        mode: String,
        instruments: Vec<String>,
    },
    EngineStopped,
    TradeExecuted {
        trade_id: String,
        market: String,
        side: String,
        price: f64,
        quantity: f64,
        notional: f64,
        trigger: String,
    },
    RiskTriggered {
        action: RiskAction,
    },
    JobError {
        job: String,
        error_kind: String,
        message: String,
    },
    DailyLossHalt {
        daily_pnl: f64,
        portfolio_value: f64,
    },
    PositionDisappeared {
        market: String,
        side: String,
    },
    UnmanagedClosed {
        market: String,
        side: String,
        qty: f64,
    },
    DailySummary {
        date: String,
        summary: DailySummary,
    },
}

/// Bounded queue between the engine and the drain.
const CHANNEL_CAPACITY: usize = 256;

/// Cloneable publisher handle.
#[derive(Clone)]
pub struct NotificationSink {
    tx: mpsc::Sender<NotificationEvent>,
}

impl NotificationSink {
    /// Create a sink and its receiving end.
    pub fn channel() -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Publish an event without blocking the caller.
    pub fn publish(&self, event: NotificationEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "notification dropped");
        }
    }
}

/// Drain the event channel into the structured log. Runs until the channel
/// closes; spawn it once at startup.
pub async fn run_log_drain(mut rx: mpsc::Receiver<NotificationEvent>) {
    while let Some(event) = rx.recv().await {
        match &event {
            NotificationEvent::JobError { job, error_kind, message } => {
                error!(job = %job, kind = %error_kind, message = %message, "notification: job error");
            }
            NotificationEvent::DailyLossHalt { daily_pnl, portfolio_value } => {
                error!(
                    daily_pnl = %daily_pnl,
                    portfolio_value = %portfolio_value,
                    "notification: daily loss halt"
                );
            }
            NotificationEvent::PositionDisappeared { market, side } => {
                error!(market = %market, side = %side, "notification: position disappeared");
            }
            NotificationEvent::UnmanagedClosed { market, side, qty } => {
                error!(market = %market, side = %side, qty = %qty, "notification: unmanaged position closed");
            }
            NotificationEvent::RiskTriggered { action } => {
                warn!(action = %action, "notification: risk action");
            }
            other => {
                info!(event = ?other, "notification");
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let (sink, mut rx) = NotificationSink::channel();
        sink.publish(NotificationEvent::EngineStopped);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, NotificationEvent::EngineStopped));
    }

    #[tokio::test]
    async fn publish_never_blocks_when_full() {
        let (sink, _rx) = NotificationSink::channel();
        for _ in 0..(CHANNEL_CAPACITY + 10) {
            sink.publish(NotificationEvent::EngineStopped);
        }
        // Reaching here without awaiting proves the overflow path drops.
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = NotificationEvent::PositionDisappeared {
            market: "KRW-ETH".into(),
            side: "long".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "position_disappeared");
        assert_eq!(json["market"], "KRW-ETH");
    }
}
