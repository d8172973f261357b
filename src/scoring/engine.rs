// =============================================================================
// Multi-Factor Scoring Engine
// =============================================================================
//
// Classifies the indicator snapshot into five factors and produces a 0-100
// composite score with a trade signal.
//
// Factor weights (defaults):
//     Technical  30%  (RSI, MACD, Bollinger, moving averages, ADX)
//     Momentum   25%  (price gap, stochastic, ROC, CCI)
//     Volatility 15%  (regime, ATR %, Bollinger width)
//     Volume     15%  (volume ratio, OBV trend, VWAP gap)
//     Sentiment  15%  (fear/greed, news, social volume)
//
// Each factor starts at 50 and adds signed contributions for bounded
// predicates; the sub-score is clamped to [0, 100]. NaN inputs fail every
// predicate and contribute nothing.
// =============================================================================

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::{ScoringWeights, SignalThresholds};
use crate::error::EngineResult;
use crate::indicators::IndicatorSnapshot;
use crate::types::{Instrument, ObvTrend, TradeSignal, VolatilityRegime};

use super::{FactorDetail, ScoringResult, SentimentSnapshot, VolatilityProfile};

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// The multi-factor scoring engine. Stateless over its inputs; construction
/// fails when the configured weights do not sum to 1.0 (±0.01).
pub struct MultiFactorScorer {
    weights: ScoringWeights,
    thresholds: SignalThresholds,
}

impl MultiFactorScorer {
    pub fn new(weights: ScoringWeights, thresholds: SignalThresholds) -> EngineResult<Self> {
        weights.validate()?;
        info!(
            technical = weights.technical,
            momentum = weights.momentum,
            volatility = weights.volatility,
            volume = weights.volume,
            sentiment = weights.sentiment,
            buy = thresholds.buy,
            strong_buy = thresholds.strong_buy,
            sell = thresholds.sell,
            "scorer initialised"
        );
        Ok(Self {
            weights,
            thresholds,
        })
    }

    // -------------------------------------------------------------------------
    // Public API
    // -------------------------------------------------------------------------

    /// Score a single instrument from its indicator snapshot plus optional
    /// volatility and sentiment inputs.
    pub fn score(
        &self,
        instrument: &Instrument,
        ind: &IndicatorSnapshot,
        volatility: Option<&VolatilityProfile>,
        sentiment: Option<&SentimentSnapshot>,
    ) -> ScoringResult {
        let (tech, tech_details) = self.technical_factor(ind);
        let (momentum, momentum_details) = self.momentum_factor(ind);
        let (vol, vol_details) = self.volatility_factor(volatility);
        let (volume, volume_details) = self.volume_factor(ind);
        let (sent, sent_details) = self.sentiment_factor(sentiment);

        let total = clamp(
            self.weights.technical * tech
                + self.weights.momentum * momentum
                + self.weights.volatility * vol
                + self.weights.volume * volume
                + self.weights.sentiment * sent,
        );

        let signal = self.determine_signal(total);
        let factor_scores = [tech, momentum, vol, volume, sent];
        let confidence = self.confidence(total, &factor_scores);
        let rationale = self.rationale(instrument, &factor_scores, signal);

        let mut details = HashMap::new();
        details.insert("technical".to_string(), tech_details);
        details.insert("momentum".to_string(), momentum_details);
        details.insert("volatility".to_string(), vol_details);
        details.insert("volume".to_string(), volume_details);
        details.insert("sentiment".to_string(), sent_details);

        debug!(
            instrument = %instrument,
            total = total,
            signal = %signal,
            confidence = confidence,
            "instrument scored"
        );

        ScoringResult {
            instrument: instrument.clone(),
            technical_score: round2(tech),
            momentum_score: round2(momentum),
            volatility_score: round2(vol),
            volume_score: round2(volume),
            sentiment_score: round2(sent),
            total_score: round2(total),
            signal,
            confidence: round2(confidence),
            rationale,
            details,
            scored_at: Utc::now(),
        }
    }

    /// Score a batch of instruments and return the results sorted by total
    /// score descending. Instruments whose inputs are missing are skipped.
    pub fn score_all<'a, I>(&self, inputs: I) -> Vec<ScoringResult>
    where
        I: IntoIterator<
            Item = (
                &'a Instrument,
                Option<&'a IndicatorSnapshot>,
                Option<&'a VolatilityProfile>,
                Option<&'a SentimentSnapshot>,
            ),
        >,
    {
        let mut results: Vec<ScoringResult> = inputs
            .into_iter()
            .filter_map(|(instrument, ind, vol, sent)| match ind {
                Some(snapshot) => Some(self.score(instrument, snapshot, vol, sent)),
                None => {
                    warn!(instrument = %instrument, "scoring skipped: no indicator snapshot");
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    /// Filter a scored batch down to BUY / STRONG_BUY candidates.
    pub fn buy_candidates(results: &[ScoringResult]) -> Vec<ScoringResult> {
        results
            .iter()
            .filter(|r| r.signal.is_buy())
            .cloned()
            .collect()
    }

    // -------------------------------------------------------------------------
    // Factor 1: Technical — 30%
    // -------------------------------------------------------------------------

    fn technical_factor(&self, ind: &IndicatorSnapshot) -> (f64, Vec<FactorDetail>) {
        let mut score = 50.0;
        let mut details = Vec::new();

        // RSI (14)
        let rsi = ind.rsi_14;
        let rsi_contrib = if rsi < 20.0 {
            30.0
        } else if rsi < 30.0 {
            20.0
        } else if rsi < 40.0 {
            10.0
        } else if rsi > 85.0 {
            -30.0
        } else if rsi > 75.0 {
            -20.0
        } else if rsi > 65.0 {
            -5.0
        } else {
            0.0
        };
        score += rsi_contrib;
        details.push(FactorDetail::new("RSI(14)", round2(rsi), rsi_contrib));

        // MACD histogram vs signal
        let hist = ind.macd_histogram;
        let macd_signal = ind.macd_signal;
        let macd_contrib = if hist > 0.0 && macd_signal < 0.0 {
            15.0
        } else if hist > 0.0 {
            8.0
        } else if hist < 0.0 && macd_signal > 0.0 {
            -12.0
        } else if hist < 0.0 {
            -5.0
        } else {
            0.0
        };
        score += macd_contrib;
        details.push(FactorDetail::new("MACD histogram", round4(hist), macd_contrib));

        // Bollinger position (%B)
        let pct_b = ind.bollinger_pct_b;
        let bb_valid =
            pct_b.is_finite() && ind.bollinger_lower > 0.0 && ind.current_price > 0.0;
        let bb_contrib = if bb_valid {
            if pct_b < 0.1 {
                20.0
            } else if pct_b < 0.25 {
                12.0
            } else if pct_b > 0.9 {
                -15.0
            } else if pct_b > 0.75 {
                -8.0
            } else {
                0.0
            }
        } else {
            0.0
        };
        score += bb_contrib;
        let bb_raw = if bb_valid { round3(pct_b) } else { 0.0 };
        details.push(FactorDetail::new("Bollinger position", bb_raw, bb_contrib));

        // Moving-average stack (SMA 5/20/60)
        let (sma5, sma20, sma60) = (ind.sma_5, ind.sma_20, ind.sma_60);
        let ma_contrib = if sma5 > 0.0 && sma20 > 0.0 && sma60 > 0.0 {
            if sma5 > sma20 && sma20 > sma60 {
                12.0
            } else if sma5 < sma20 && sma20 < sma60 {
                -12.0
            } else if sma5 > sma20 {
                5.0
            } else if sma5 < sma20 {
                -5.0
            } else {
                0.0
            }
        } else {
            0.0
        };
        score += ma_contrib;
        details.push(FactorDetail::new("SMA alignment", 0.0, ma_contrib));

        // EMA 12/26 spread
        let (ema12, ema26) = (ind.ema_12, ind.ema_26);
        let ema_contrib = if ema12 > 0.0 && ema26 > 0.0 {
            let diff_pct = (ema12 - ema26) / ema26 * 100.0;
            if diff_pct > 1.0 {
                5.0
            } else if diff_pct < -1.0 {
                -5.0
            } else {
                0.0
            }
        } else {
            0.0
        };
        score += ema_contrib;
        details.push(FactorDetail::new("EMA(12/26)", round2(ema_contrib), ema_contrib));

        // ADX trend strength (direction-agnostic)
        let adx = ind.adx;
        let adx_contrib = if adx > 40.0 {
            5.0
        } else if adx < 15.0 {
            -3.0
        } else {
            0.0
        };
        score += adx_contrib;
        details.push(FactorDetail::new("ADX", round2(adx), adx_contrib));

        (clamp(score), details)
    }

    // -------------------------------------------------------------------------
    // Factor 2: Momentum — 25%
    // -------------------------------------------------------------------------

    fn momentum_factor(&self, ind: &IndicatorSnapshot) -> (f64, Vec<FactorDetail>) {
        let mut score = 50.0;
        let mut details = Vec::new();

        // Day gap: a moderate pullback is a contrarian entry, a crash is not.
        let (close, open) = (ind.current_price, ind.open_price);
        let mut gap_contrib = 0.0;
        if open > 0.0 {
            let gap = (close - open) / open * 100.0;
            gap_contrib = if gap > -5.0 && gap <= -3.0 {
                15.0
            } else if gap > -3.0 && gap <= -0.5 {
                20.0
            } else if gap > -10.0 && gap <= -5.0 {
                5.0
            } else if gap <= -10.0 {
                -15.0
            } else if gap > 0.0 && gap <= 2.0 {
                5.0
            } else if gap > 2.0 && gap <= 5.0 {
                -3.0
            } else if gap > 5.0 {
                -10.0
            } else {
                0.0
            };
            details.push(FactorDetail::new("price gap", round2(gap), gap_contrib));
        }
        score += gap_contrib;

        // Stochastic K (+ oversold K/D cross bonus)
        let (k, d) = (ind.stoch_k, ind.stoch_d);
        let mut stoch_contrib = if k < 15.0 {
            20.0
        } else if k < 25.0 {
            12.0
        } else if k > 85.0 {
            -15.0
        } else if k > 75.0 {
            -8.0
        } else {
            0.0
        };
        if k > d && k < 30.0 {
            stoch_contrib += 5.0;
        }
        score += stoch_contrib;
        details.push(FactorDetail::new("stochastic K", round2(k), stoch_contrib));

        // ROC (12)
        let roc = ind.roc_12;
        let roc_contrib = if roc < -5.0 {
            10.0
        } else if roc > 10.0 {
            -5.0
        } else if roc > 0.0 && roc <= 5.0 {
            5.0
        } else {
            0.0
        };
        score += roc_contrib;
        details.push(FactorDetail::new("ROC(12)", round2(roc), roc_contrib));

        // CCI (20)
        let cci = ind.cci_20;
        let cci_contrib = if cci < -200.0 {
            15.0
        } else if cci < -100.0 {
            8.0
        } else if cci > 200.0 {
            -12.0
        } else if cci > 100.0 {
            -5.0
        } else {
            0.0
        };
        score += cci_contrib;
        details.push(FactorDetail::new("CCI(20)", round2(cci), cci_contrib));

        (clamp(score), details)
    }

    // -------------------------------------------------------------------------
    // Factor 3: Volatility — 15%
    // -------------------------------------------------------------------------

    fn volatility_factor(&self, vol: Option<&VolatilityProfile>) -> (f64, Vec<FactorDetail>) {
        let mut score = 50.0;
        let mut details = Vec::new();

        let vol = match vol {
            Some(v) => v,
            None => {
                details.push(FactorDetail::new("volatility data", 0.0, 0.0));
                return (score, details);
            }
        };

        // Regime: MEDIUM is the sweet spot for automated entries.
        let regime_contrib = match vol.regime {
            VolatilityRegime::Low => -10.0,
            VolatilityRegime::Medium => 25.0,
            VolatilityRegime::High => 5.0,
            VolatilityRegime::Extreme => -20.0,
        };
        score += regime_contrib;
        details.push(FactorDetail::new("volatility regime", 0.0, regime_contrib));

        // ATR %
        let atr_pct = vol.atr_percent;
        let atr_contrib = if (1.0..=3.0).contains(&atr_pct) {
            10.0
        } else if atr_pct > 3.0 && atr_pct <= 5.0 {
            0.0
        } else if atr_pct > 5.0 {
            -10.0
        } else if atr_pct < 0.5 {
            -5.0
        } else {
            0.0
        };
        score += atr_contrib;
        details.push(FactorDetail::new("ATR %", round2(atr_pct), atr_contrib));

        // Bollinger width
        let bbw = vol.bb_width;
        let bbw_contrib = if bbw > 0.02 && bbw < 0.06 {
            5.0
        } else if bbw >= 0.10 {
            -5.0
        } else if bbw <= 0.01 {
            -3.0
        } else {
            0.0
        };
        score += bbw_contrib;
        details.push(FactorDetail::new("Bollinger width", round4(bbw), bbw_contrib));

        (clamp(score), details)
    }

    // -------------------------------------------------------------------------
    // Factor 4: Volume — 15%
    // -------------------------------------------------------------------------

    fn volume_factor(&self, ind: &IndicatorSnapshot) -> (f64, Vec<FactorDetail>) {
        let mut score = 50.0;
        let mut details = Vec::new();

        // Volume ratio (current vs 20-bar mean)
        let ratio = ind.volume_ratio;
        let vr_contrib = if ratio > 5.0 {
            30.0
        } else if ratio > 3.0 {
            22.0
        } else if ratio > 2.0 {
            15.0
        } else if ratio > 1.5 {
            10.0
        } else if ratio > 1.0 {
            3.0
        } else if ratio < 0.3 {
            -20.0
        } else if ratio < 0.5 {
            -12.0
        } else if ratio < 0.7 {
            -5.0
        } else {
            0.0
        };
        score += vr_contrib;
        details.push(FactorDetail::new("volume ratio", round2(ratio), vr_contrib));

        // OBV trend
        let obv_contrib = match ind.obv_trend {
            ObvTrend::Rising => 10.0,
            ObvTrend::Falling => -8.0,
            ObvTrend::Neutral => 0.0,
        };
        score += obv_contrib;
        details.push(FactorDetail::new("OBV trend", 0.0, obv_contrib));

        // VWAP gap
        let (vwap, close) = (ind.vwap, ind.current_price);
        let mut vwap_contrib = 0.0;
        if vwap > 0.0 && close > 0.0 {
            let gap = (close - vwap) / vwap * 100.0;
            vwap_contrib = if gap < -2.0 {
                8.0
            } else if gap > 3.0 {
                -5.0
            } else {
                0.0
            };
            details.push(FactorDetail::new("VWAP gap", round2(gap), vwap_contrib));
        }
        score += vwap_contrib;

        (clamp(score), details)
    }

    // -------------------------------------------------------------------------
    // Factor 5: Sentiment — 15%
    // -------------------------------------------------------------------------

    fn sentiment_factor(&self, sentiment: Option<&SentimentSnapshot>) -> (f64, Vec<FactorDetail>) {
        let mut score = 50.0;
        let mut details = Vec::new();

        let sentiment = match sentiment {
            Some(s) => s,
            None => {
                details.push(FactorDetail::new("sentiment data", 0.0, 0.0));
                return (score, details);
            }
        };

        // Fear/greed index: contrarian reading, extreme fear buys.
        let fg = sentiment.fear_greed_index;
        let fg_contrib = if fg < 15.0 {
            30.0
        } else if fg < 25.0 {
            20.0
        } else if fg < 35.0 {
            10.0
        } else if fg > 85.0 {
            -25.0
        } else if fg > 75.0 {
            -15.0
        } else if fg > 65.0 {
            -8.0
        } else {
            0.0
        };
        score += fg_contrib;
        details.push(FactorDetail::new("fear/greed index", fg, fg_contrib));

        // News sentiment
        let news = sentiment.news_sentiment;
        let news_contrib = if news > 0.5 {
            8.0
        } else if news > 0.2 {
            4.0
        } else if news < -0.5 {
            -8.0
        } else if news < -0.2 {
            -4.0
        } else {
            0.0
        };
        score += news_contrib;
        details.push(FactorDetail::new("news sentiment", round2(news), news_contrib));

        // Social volume change
        let social = sentiment.social_volume_change;
        let social_contrib = if social > 100.0 {
            5.0
        } else if social < -50.0 {
            -3.0
        } else {
            0.0
        };
        score += social_contrib;
        details.push(FactorDetail::new(
            "social volume change",
            round1(social),
            social_contrib,
        ));

        (clamp(score), details)
    }

    // -------------------------------------------------------------------------
    // Signal & confidence
    // -------------------------------------------------------------------------

    fn determine_signal(&self, total: f64) -> TradeSignal {
        if total >= self.thresholds.strong_buy {
            TradeSignal::StrongBuy
        } else if total >= self.thresholds.buy {
            TradeSignal::Buy
        } else if total <= self.thresholds.sell {
            TradeSignal::Sell
        } else {
            TradeSignal::Hold
        }
    }

    /// Confidence is a blend of factor agreement, score extremity, and
    /// directional consensus.
    fn confidence(&self, total: f64, factor_scores: &[f64]) -> f64 {
        let n = factor_scores.len() as f64;
        let mean = factor_scores.iter().sum::<f64>() / n;
        let variance = factor_scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        let consistency = (100.0 - std_dev * 2.5).max(0.0);

        let distance = 40.0 + (total - 50.0).abs() * 1.2;

        let buy_agreement = factor_scores.iter().filter(|&&s| s >= 60.0).count();
        let sell_agreement = factor_scores.iter().filter(|&&s| s <= 40.0).count();
        let agreement_bonus = buy_agreement.max(sell_agreement) as f64 * 5.0;

        clamp(distance * 0.4 + consistency * 0.4 + agreement_bonus * 0.2)
    }

    // -------------------------------------------------------------------------
    // Rationale
    // -------------------------------------------------------------------------

    fn rationale(
        &self,
        instrument: &Instrument,
        factor_scores: &[f64],
        signal: TradeSignal,
    ) -> String {
        const FACTOR_NAMES: [&str; 5] =
            ["technical", "momentum", "volatility", "volume", "sentiment"];

        let strengths: Vec<&str> = FACTOR_NAMES
            .iter()
            .zip(factor_scores.iter())
            .filter(|(_, &s)| s >= 65.0)
            .map(|(n, _)| *n)
            .collect();
        let weaknesses: Vec<&str> = FACTOR_NAMES
            .iter()
            .zip(factor_scores.iter())
            .filter(|(_, &s)| s <= 40.0)
            .map(|(n, _)| *n)
            .collect();

        let mut parts = vec![format!("[{instrument}]")];

        parts.push(
            match signal {
                TradeSignal::StrongBuy => "strong buy",
                TradeSignal::Buy => "buy",
                TradeSignal::Hold => "hold",
                TradeSignal::Sell => "sell",
            }
            .to_string(),
        );

        if !strengths.is_empty() {
            parts.push(format!("strengths: {}", strengths.join(", ")));
        }
        if !weaknesses.is_empty() {
            parts.push(format!("caution: {}", weaknesses.join(", ")));
        }

        parts.push(
            match signal {
                TradeSignal::StrongBuy => "Multiple factors are signalling a buy at once.",
                TradeSignal::Buy => "Broadly positive, with some caution warranted.",
                TradeSignal::Sell => "Most factors are weak; an exit is advised.",
                TradeSignal::Hold => "No clear direction; staying flat is advised.",
            }
            .to_string(),
        );

        parts.join(" | ")
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScoringWeights, SignalThresholds};

    fn scorer() -> MultiFactorScorer {
        MultiFactorScorer::new(ScoringWeights::default(), SignalThresholds::default()).unwrap()
    }

    fn btc() -> Instrument {
        Instrument::spot("BTC", "KRW")
    }

    /// A snapshot with every field neutral / NaN so single predicates can be
    /// exercised in isolation.
    fn blank_snapshot() -> IndicatorSnapshot {
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
            obv_trend: ObvTrend::Neutral,
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
    fn weights_must_sum_to_one() {
        let mut w = ScoringWeights::default();
        w.technical = 0.60;
        assert!(MultiFactorScorer::new(w, SignalThresholds::default()).is_err());
    }

    #[test]
    fn blank_snapshot_is_neutral() {
        let s = scorer();
        let result = s.score(&btc(), &blank_snapshot(), None, None);
        // All factors stay at 50 => total 50 => HOLD.
        assert!((result.total_score - 50.0).abs() < 1e-9);
        assert_eq!(result.signal, TradeSignal::Hold);
    }

    #[test]
    fn scores_stay_in_range() {
        let mut ind = blank_snapshot();
        // Stack every bullish predicate at once.
        ind.rsi_14 = 10.0;
        ind.macd_histogram = 1.0;
        ind.macd_signal = -1.0;
        ind.bollinger_pct_b = 0.05;
        ind.bollinger_lower = 90.0;
        ind.current_price = 100.0;
        ind.open_price = 100.5;
        ind.sma_5 = 3.0;
        ind.sma_20 = 2.0;
        ind.sma_60 = 1.0;
        ind.ema_12 = 102.0;
        ind.ema_26 = 100.0;
        ind.adx = 45.0;
        ind.stoch_k = 5.0;
        ind.stoch_d = 2.0;
        ind.roc_12 = -7.0;
        ind.cci_20 = -250.0;
        ind.volume_ratio = 6.0;
        ind.obv_trend = ObvTrend::Rising;
        ind.vwap = 110.0;

        let vol = VolatilityProfile {
            regime: VolatilityRegime::Medium,
            atr_percent: 2.0,
            bb_width: 0.04,
        };
        let sent = SentimentSnapshot {
            fear_greed_index: 5.0,
            news_sentiment: 0.8,
            social_volume_change: 200.0,
        };

        let result = scorer().score(&btc(), &ind, Some(&vol), Some(&sent));
        for sub in [
            result.technical_score,
            result.momentum_score,
            result.volatility_score,
            result.volume_score,
            result.sentiment_score,
            result.total_score,
            result.confidence,
        ] {
            assert!((0.0..=100.0).contains(&sub), "score {sub} out of range");
        }
        assert_eq!(result.signal, TradeSignal::StrongBuy);
    }

    #[test]
    fn rsi_boundary_exactly_30_contributes_20() {
        let s = scorer();
        let mut ind = blank_snapshot();
        ind.rsi_14 = 30.0;
        let (_, details) = s.technical_factor(&ind);
        let rsi_detail = details.iter().find(|d| d.name == "RSI(14)").unwrap();
        // 30.0 is not < 30 but is < 40 => +10.
        assert!((rsi_detail.contribution - 10.0).abs() < 1e-12);

        ind.rsi_14 = 29.999;
        let (_, details) = s.technical_factor(&ind);
        let rsi_detail = details.iter().find(|d| d.name == "RSI(14)").unwrap();
        assert!((rsi_detail.contribution - 20.0).abs() < 1e-12);
    }

    #[test]
    fn rsi_boundary_exactly_85() {
        let s = scorer();
        let mut ind = blank_snapshot();
        ind.rsi_14 = 85.0;
        let (_, details) = s.technical_factor(&ind);
        let rsi_detail = details.iter().find(|d| d.name == "RSI(14)").unwrap();
        // 85.0 is not > 85 but is > 75 => -20.
        assert!((rsi_detail.contribution + 20.0).abs() < 1e-12);

        ind.rsi_14 = 85.001;
        let (_, details) = s.technical_factor(&ind);
        let rsi_detail = details.iter().find(|d| d.name == "RSI(14)").unwrap();
        assert!((rsi_detail.contribution + 30.0).abs() < 1e-12);
    }

    #[test]
    fn signal_threshold_boundaries() {
        let s = scorer();
        assert_eq!(s.determine_signal(80.0), TradeSignal::StrongBuy);
        assert_eq!(s.determine_signal(79.999), TradeSignal::Buy);
        assert_eq!(s.determine_signal(70.0), TradeSignal::Buy);
        assert_eq!(s.determine_signal(69.999), TradeSignal::Hold);
        assert_eq!(s.determine_signal(30.0), TradeSignal::Sell);
        assert_eq!(s.determine_signal(30.001), TradeSignal::Hold);
    }

    #[test]
    fn scenario_btc_oversold_bounce() {
        // RSI=25, MACD hist positive with negative signal, %B=0.05, perfect
        // SMA stack, ADX=42, volume ratio=3.2, MEDIUM regime, fear/greed=22.
        let mut ind = blank_snapshot();
        ind.rsi_14 = 25.0;
        ind.macd_histogram = 125_000.0;
        ind.macd_signal = -10_000.0;
        ind.bollinger_pct_b = 0.05;
        ind.bollinger_lower = 140_000_000.0;
        ind.current_price = 143_000_000.0;
        ind.open_price = 143_000_000.0;
        ind.sma_5 = 3.0;
        ind.sma_20 = 2.0;
        ind.sma_60 = 1.0;
        ind.adx = 42.0;
        ind.volume_ratio = 3.2;

        let vol = VolatilityProfile {
            regime: VolatilityRegime::Medium,
            atr_percent: 2.0,
            bb_width: 0.04,
        };
        let sent = SentimentSnapshot {
            fear_greed_index: 22.0,
            news_sentiment: 0.0,
            social_volume_change: 0.0,
        };

        let result = scorer().score(&btc(), &ind, Some(&vol), Some(&sent));
        assert!(
            result.total_score >= 70.0,
            "expected total >= 70, got {}",
            result.total_score
        );
        assert!(result.signal.is_buy());

        let rsi_detail = result.details["technical"]
            .iter()
            .find(|d| d.name == "RSI(14)")
            .unwrap();
        assert!((rsi_detail.contribution - 20.0).abs() < 1e-12);
    }

    #[test]
    fn scenario_xrp_overbought() {
        // RSI=82, %B=0.95, volume ratio=0.4, OBV falling, fear/greed=90.
        let mut ind = blank_snapshot();
        ind.rsi_14 = 82.0;
        ind.bollinger_pct_b = 0.95;
        ind.bollinger_lower = 280_000.0;
        ind.current_price = 285_000.0;
        ind.open_price = 285_000.0;
        ind.volume_ratio = 0.4;
        ind.obv_trend = ObvTrend::Falling;

        let sent = SentimentSnapshot {
            fear_greed_index: 90.0,
            news_sentiment: 0.0,
            social_volume_change: 0.0,
        };

        let result = scorer().score(&Instrument::spot("XRP", "KRW"), &ind, None, Some(&sent));
        assert!(
            result.total_score <= 50.0,
            "expected total <= 50, got {}",
            result.total_score
        );
        assert!(matches!(
            result.signal,
            TradeSignal::Sell | TradeSignal::Hold
        ));
    }

    #[test]
    fn scoring_is_deterministic() {
        let mut ind = blank_snapshot();
        ind.rsi_14 = 33.0;
        ind.volume_ratio = 1.8;
        ind.current_price = 100.0;
        ind.open_price = 101.0;

        let s = scorer();
        let a = s.score(&btc(), &ind, None, None);
        let b = s.score(&btc(), &ind, None, None);
        assert_eq!(a.total_score, b.total_score);
        assert_eq!(a.signal, b.signal);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.rationale, b.rationale);
        assert_eq!(a.details, b.details);
    }

    #[test]
    fn missing_optional_inputs_yield_neutral_factors() {
        let result = scorer().score(&btc(), &blank_snapshot(), None, None);
        assert!((result.volatility_score - 50.0).abs() < 1e-9);
        assert!((result.sentiment_score - 50.0).abs() < 1e-9);
        assert_eq!(result.details["volatility"].len(), 1);
        assert_eq!(result.details["sentiment"].len(), 1);
        assert_eq!(result.details["volatility"][0].contribution, 0.0);
    }

    #[test]
    fn score_all_sorts_descending_and_skips_missing() {
        let s = scorer();
        let btc = btc();
        let eth = Instrument::spot("ETH", "KRW");
        let xrp = Instrument::spot("XRP", "KRW");

        let mut bullish = blank_snapshot();
        bullish.rsi_14 = 25.0;
        bullish.volume_ratio = 3.2;
        let neutral = blank_snapshot();

        let inputs: Vec<(
            &Instrument,
            Option<&IndicatorSnapshot>,
            Option<&VolatilityProfile>,
            Option<&SentimentSnapshot>,
        )> = vec![
            (&xrp, None, None, None),
            (&eth, Some(&neutral), None, None),
            (&btc, Some(&bullish), None, None),
        ];
        let results = s.score_all(inputs);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].instrument.base, "BTC");
        assert!(results[0].total_score >= results[1].total_score);
    }

    #[test]
    fn rationale_lists_strengths_and_weaknesses() {
        let s = scorer();
        let text = s.rationale(&btc(), &[80.0, 50.0, 50.0, 30.0, 50.0], TradeSignal::Hold);
        assert!(text.contains("strengths: technical"));
        assert!(text.contains("caution: volume"));
    }
}
