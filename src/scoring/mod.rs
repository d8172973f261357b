// =============================================================================
// Multi-Factor Scoring
// =============================================================================

pub mod engine;

pub use engine::MultiFactorScorer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Instrument, TradeSignal, VolatilityRegime};

/// Optional volatility input to the scoring engine. Absence yields a neutral
/// volatility sub-score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityProfile {
    pub regime: VolatilityRegime,
    /// ATR as a percentage of price (2.0 = 2 %).
    pub atr_percent: f64,
    /// Bollinger width as a fraction ((upper − lower) / mid).
    pub bb_width: f64,
}

/// Optional process-wide sentiment input. Absence yields a neutral sentiment
/// sub-score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    /// Fear/greed index in [0, 100].
    pub fear_greed_index: f64,
    /// News sentiment in [-1, 1].
    pub news_sentiment: f64,
    /// Social-volume change in percent.
    pub social_volume_change: f64,
}

/// One line item of a factor sub-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDetail {
    pub name: String,
    pub raw_value: f64,
    pub contribution: f64,
}

impl FactorDetail {
    pub fn new(name: &str, raw_value: f64, contribution: f64) -> Self {
        Self {
            name: name.to_string(),
            raw_value,
            contribution,
        }
    }
}

/// Result of scoring one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    pub instrument: Instrument,
    pub technical_score: f64,
    pub momentum_score: f64,
    pub volatility_score: f64,
    pub volume_score: f64,
    pub sentiment_score: f64,
    /// Weighted composite, clamped to [0, 100].
    pub total_score: f64,
    pub signal: TradeSignal,
    pub confidence: f64,
    pub rationale: String,
    pub details: HashMap<String, Vec<FactorDetail>>,
    pub scored_at: DateTime<Utc>,
}

impl std::fmt::Display for ScoringResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {:.1} {} (confidence {:.0}%)",
            self.instrument, self.total_score, self.signal, self.confidence
        )
    }
}
