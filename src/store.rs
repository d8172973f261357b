// =============================================================================
// Store — capability interface for engine bookkeeping
// =============================================================================
//
// The engine persists indicator snapshots, scoring results, trade rows, and
// daily summaries through this narrow interface. Production deployments back
// it with a database; tests and the default wiring use the in-memory
// implementation below.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorSnapshot;
use crate::market_data::Candle;
use crate::scoring::{ScoringResult, SentimentSnapshot, VolatilityProfile};
use crate::types::{Instrument, OrderMethod, PositionSide, Side, TradingMode};

/// Outcome of an order attempt as recorded in the trade log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Filled,
    Failed,
}

/// One row of the append-only trade log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub instrument: Instrument,
    pub side: Side,
    pub position_side: PositionSide,
    pub method: OrderMethod,
    pub price: f64,
    pub quantity: f64,
    pub notional: f64,
    pub fee: f64,
    pub status: TradeStatus,
    pub trigger_reason: String,
    #[serde(default)]
    pub score_at_trade: f64,
    #[serde(default)]
    pub pnl_notional: Option<f64>,
    #[serde(default)]
    pub pnl_pct: Option<f64>,
    pub mode: TradingMode,
    pub executed_at: DateTime<Utc>,
}

/// Aggregates produced by the daily feedback job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailySummary {
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub realized_pnl: f64,
    pub fees: f64,
}

/// Read/write capabilities the engine requires from its backing store.
pub trait Store: Send + Sync {
    fn put_candles(&self, instrument: &Instrument, candles: Vec<Candle>);
    fn get_candles(&self, instrument: &Instrument) -> Option<Vec<Candle>>;

    fn put_indicators(&self, instrument: &Instrument, snapshot: IndicatorSnapshot);
    fn latest_indicators(&self, instrument: &Instrument) -> Option<IndicatorSnapshot>;

    fn put_volatility(&self, instrument: &Instrument, profile: VolatilityProfile);
    fn latest_volatility(&self, instrument: &Instrument) -> Option<VolatilityProfile>;

    fn put_sentiment(&self, snapshot: SentimentSnapshot);
    fn latest_sentiment(&self) -> Option<SentimentSnapshot>;

    fn insert_scoring_result(&self, result: ScoringResult);
    fn latest_scoring(&self, instrument: &Instrument) -> Option<ScoringResult>;

    fn append_trade(&self, record: TradeRecord);
    fn trades_for_day(&self, day: NaiveDate) -> Vec<TradeRecord>;

    fn save_daily_summary(&self, day: NaiveDate, summary: DailySummary);
    fn daily_summary(&self, day: NaiveDate) -> Option<DailySummary>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

#[derive(Default)]
pub struct MemoryStore {
    candles: RwLock<HashMap<Instrument, Vec<Candle>>>,
    indicators: RwLock<HashMap<Instrument, IndicatorSnapshot>>,
    volatility: RwLock<HashMap<Instrument, VolatilityProfile>>,
    sentiment: RwLock<Option<SentimentSnapshot>>,
    scoring: RwLock<HashMap<Instrument, ScoringResult>>,
    trades: RwLock<Vec<TradeRecord>>,
    summaries: RwLock<HashMap<NaiveDate, DailySummary>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn put_candles(&self, instrument: &Instrument, candles: Vec<Candle>) {
        self.candles.write().insert(instrument.clone(), candles);
    }

    fn get_candles(&self, instrument: &Instrument) -> Option<Vec<Candle>> {
        self.candles.read().get(instrument).cloned()
    }

    fn put_indicators(&self, instrument: &Instrument, snapshot: IndicatorSnapshot) {
        self.indicators.write().insert(instrument.clone(), snapshot);
    }

    fn latest_indicators(&self, instrument: &Instrument) -> Option<IndicatorSnapshot> {
        self.indicators.read().get(instrument).cloned()
    }

    fn put_volatility(&self, instrument: &Instrument, profile: VolatilityProfile) {
        self.volatility.write().insert(instrument.clone(), profile);
    }

    fn latest_volatility(&self, instrument: &Instrument) -> Option<VolatilityProfile> {
        self.volatility.read().get(instrument).cloned()
    }

    fn put_sentiment(&self, snapshot: SentimentSnapshot) {
        *self.sentiment.write() = Some(snapshot);
    }

    fn latest_sentiment(&self) -> Option<SentimentSnapshot> {
        self.sentiment.read().clone()
    }

    fn insert_scoring_result(&self, result: ScoringResult) {
        self.scoring.write().insert(result.instrument.clone(), result);
    }

    fn latest_scoring(&self, instrument: &Instrument) -> Option<ScoringResult> {
        self.scoring.read().get(instrument).cloned()
    }

    fn append_trade(&self, record: TradeRecord) {
        self.trades.write().push(record);
    }

    fn trades_for_day(&self, day: NaiveDate) -> Vec<TradeRecord> {
        self.trades
            .read()
            .iter()
            .filter(|t| t.executed_at.date_naive() == day)
            .cloned()
            .collect()
    }

    fn save_daily_summary(&self, day: NaiveDate, summary: DailySummary) {
        self.summaries.write().insert(day, summary);
    }

    fn daily_summary(&self, day: NaiveDate) -> Option<DailySummary> {
        self.summaries.read().get(&day).cloned()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn record(trade_id: &str, at: DateTime<Utc>) -> TradeRecord {
        TradeRecord {
            trade_id: trade_id.to_string(),
            instrument: Instrument::spot("BTC", "KRW"),
            side: Side::Buy,
            position_side: PositionSide::Long,
            method: OrderMethod::Limit,
            price: 100.0,
            quantity: 1.0,
            notional: 100.0,
            fee: 0.05,
            status: TradeStatus::Filled,
            trigger_reason: "SCORE_80".to_string(),
            score_at_trade: 80.0,
            pnl_notional: None,
            pnl_pct: None,
            mode: TradingMode::Simulated,
            executed_at: at,
        }
    }

    #[test]
    fn trade_log_filters_by_day() {
        let store = MemoryStore::new();
        let today = Utc::now();
        let yesterday = today - chrono::Duration::days(1);

        store.append_trade(record("a", today));
        store.append_trade(record("b", yesterday));
        store.append_trade(record("c", today));

        let rows = store.trades_for_day(today.date_naive());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.executed_at.date_naive() == today.date_naive()));
    }

    #[test]
    fn sentiment_is_process_wide() {
        let store = MemoryStore::new();
        assert!(store.latest_sentiment().is_none());
        store.put_sentiment(SentimentSnapshot {
            fear_greed_index: 22.0,
            news_sentiment: 0.1,
            social_volume_change: 5.0,
        });
        assert!((store.latest_sentiment().unwrap().fear_greed_index - 22.0).abs() < 1e-12);
    }

    #[test]
    fn scoring_results_overwrite_per_instrument() {
        let store = MemoryStore::new();
        let inst = Instrument::spot("BTC", "KRW");
        let mut result = ScoringResult {
            instrument: inst.clone(),
            technical_score: 50.0,
            momentum_score: 50.0,
            volatility_score: 50.0,
            volume_score: 50.0,
            sentiment_score: 50.0,
            total_score: 50.0,
            signal: crate::types::TradeSignal::Hold,
            confidence: 60.0,
            rationale: String::new(),
            details: HashMap::new(),
            scored_at: Utc::now(),
        };
        store.insert_scoring_result(result.clone());
        result.total_score = 72.0;
        store.insert_scoring_result(result);
        assert!((store.latest_scoring(&inst).unwrap().total_score - 72.0).abs() < 1e-12);
    }

    #[test]
    fn daily_summary_roundtrip() {
        let store = MemoryStore::new();
        let day = Utc::now().date_naive();
        store.save_daily_summary(
            day,
            DailySummary {
                trades: 4,
                wins: 3,
                losses: 1,
                win_rate: 0.75,
                realized_pnl: 1_234.0,
                fees: 12.0,
            },
        );
        let loaded = store.daily_summary(day).unwrap();
        assert_eq!(loaded.trades, 4);
        assert!((loaded.win_rate - 0.75).abs() < 1e-12);
    }
}
