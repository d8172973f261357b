// =============================================================================
// Engine Configuration — environment-driven settings with atomic save
// =============================================================================
//
// Every tunable parameter lives here. Values load from environment variables
// (after dotenv) with the documented defaults; an optional JSON file can
// override the environment for operator tooling. All fields carry
// `#[serde(default)]` so adding new fields never breaks loading an older
// config file.
//
// Scoring weights are validated at construction: a sum outside [0.99, 1.01]
// is a fatal ConfigError.
// =============================================================================

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::types::TradingMode;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_instruments() -> Vec<String> {
    vec![
        "BTC".to_string(),
        "ETH".to_string(),
        "XRP".to_string(),
        "SOL".to_string(),
    ]
}

fn default_quote_currency() -> String {
    "KRW".to_string()
}

fn default_leverage() -> u32 {
    1
}

fn default_stop_loss_pct() -> f64 {
    -1.0
}

fn default_take_profit_pct() -> f64 {
    2.5
}

fn default_trailing_stop_pct() -> f64 {
    0.4
}

fn default_max_holding_minutes() -> i64 {
    60
}

fn default_daily_loss_limit_pct() -> f64 {
    -5.0
}

fn default_data_collection_interval_min() -> u64 {
    5
}

fn default_indicator_calc_interval_min() -> u64 {
    15
}

fn default_scoring_interval_min() -> u64 {
    30
}

fn default_buy_execution_interval_min() -> u64 {
    30
}

fn default_risk_check_interval_min() -> u64 {
    5
}

fn default_weight_technical() -> f64 {
    0.30
}

fn default_weight_momentum() -> f64 {
    0.25
}

fn default_weight_volatility() -> f64 {
    0.15
}

fn default_weight_volume() -> f64 {
    0.15
}

fn default_weight_sentiment() -> f64 {
    0.15
}

fn default_buy_threshold() -> f64 {
    70.0
}

fn default_strong_buy_threshold() -> f64 {
    80.0
}

fn default_sell_threshold() -> f64 {
    30.0
}

fn default_min_allocation_pct() -> f64 {
    0.10
}

fn default_max_allocation_pct() -> f64 {
    0.50
}

fn default_strong_buy_boost() -> f64 {
    1.5
}

fn default_limit_discount_pct() -> f64 {
    0.003
}

fn default_reserve_ratio() -> f64 {
    0.10
}

fn default_min_order_notional() -> f64 {
    5_000.0
}

fn default_paper_starting_cash() -> f64 {
    1_000_000.0
}

fn default_fee_rate() -> f64 {
    0.0005
}

// =============================================================================
// Sub-structs
// =============================================================================

/// Multi-factor scoring weights. Must sum to 1.0 within ±0.01.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_weight_technical")]
    pub technical: f64,
    #[serde(default = "default_weight_momentum")]
    pub momentum: f64,
    #[serde(default = "default_weight_volatility")]
    pub volatility: f64,
    #[serde(default = "default_weight_volume")]
    pub volume: f64,
    #[serde(default = "default_weight_sentiment")]
    pub sentiment: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            technical: default_weight_technical(),
            momentum: default_weight_momentum(),
            volatility: default_weight_volatility(),
            volume: default_weight_volume(),
            sentiment: default_weight_sentiment(),
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.technical + self.momentum + self.volatility + self.volume + self.sentiment
    }

    /// Reject weights whose sum falls outside [0.99, 1.01].
    pub fn validate(&self) -> EngineResult<()> {
        let total = self.sum();
        if !(0.99..=1.01).contains(&total) {
            return Err(EngineError::Config(format!(
                "scoring weights must sum to 1.0 (±0.01), got {total:.4}"
            )));
        }
        Ok(())
    }
}

/// Signal thresholds applied to the weighted total score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalThresholds {
    #[serde(default = "default_buy_threshold")]
    pub buy: f64,
    #[serde(default = "default_strong_buy_threshold")]
    pub strong_buy: f64,
    #[serde(default = "default_sell_threshold")]
    pub sell: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            buy: default_buy_threshold(),
            strong_buy: default_strong_buy_threshold(),
            sell: default_sell_threshold(),
        }
    }
}

/// Allocator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default = "default_min_allocation_pct")]
    pub min_allocation_pct: f64,
    #[serde(default = "default_max_allocation_pct")]
    pub max_allocation_pct: f64,
    #[serde(default = "default_strong_buy_boost")]
    pub strong_buy_boost: f64,
    #[serde(default = "default_limit_discount_pct")]
    pub limit_discount_pct: f64,
    #[serde(default = "default_reserve_ratio")]
    pub reserve_ratio: f64,
    #[serde(default = "default_min_order_notional")]
    pub min_order_notional: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            min_allocation_pct: default_min_allocation_pct(),
            max_allocation_pct: default_max_allocation_pct(),
            strong_buy_boost: default_strong_buy_boost(),
            limit_discount_pct: default_limit_discount_pct(),
            reserve_ratio: default_reserve_ratio(),
            min_order_notional: default_min_order_notional(),
        }
    }
}

/// Risk engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fixed stop-loss threshold in percent (negative).
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    /// Final take-profit tier in percent (positive).
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    /// Pullback from peak that triggers the trailing stop, in percent.
    #[serde(default = "default_trailing_stop_pct")]
    pub trailing_stop_pct: f64,
    #[serde(default = "default_max_holding_minutes")]
    pub max_holding_minutes: i64,
    /// Daily loss limit in percent. Negative: −5.0 means halt at −5%.
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            trailing_stop_pct: default_trailing_stop_pct(),
            max_holding_minutes: default_max_holding_minutes(),
            daily_loss_limit_pct: default_daily_loss_limit_pct(),
        }
    }
}

/// Scheduler job intervals in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalConfig {
    #[serde(default = "default_data_collection_interval_min")]
    pub data_collection_min: u64,
    #[serde(default = "default_indicator_calc_interval_min")]
    pub indicator_calc_min: u64,
    #[serde(default = "default_scoring_interval_min")]
    pub scoring_min: u64,
    #[serde(default = "default_buy_execution_interval_min")]
    pub buy_execution_min: u64,
    #[serde(default = "default_risk_check_interval_min")]
    pub risk_check_min: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            data_collection_min: default_data_collection_interval_min(),
            indicator_calc_min: default_indicator_calc_interval_min(),
            scoring_min: default_scoring_interval_min(),
            buy_execution_min: default_buy_execution_interval_min(),
            risk_check_min: default_risk_check_interval_min(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the Meridian engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub trading_mode: TradingMode,

    /// Base assets the scheduler cycles over.
    #[serde(default = "default_instruments")]
    pub target_instruments: Vec<String>,

    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,

    /// Derivative leverage; 1 for spot-only operation.
    #[serde(default = "default_leverage")]
    pub leverage: u32,

    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,

    #[serde(default = "default_paper_starting_cash")]
    pub paper_starting_cash: f64,

    #[serde(default)]
    pub weights: ScoringWeights,

    #[serde(default)]
    pub thresholds: SignalThresholds,

    #[serde(default)]
    pub allocator: AllocatorConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub intervals: IntervalConfig,

    /// Exchange credentials. Required in live mode, ignored otherwise.
    #[serde(default, skip_serializing)]
    pub access_key: String,
    #[serde(default, skip_serializing)]
    pub secret_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Simulated,
            target_instruments: default_instruments(),
            quote_currency: default_quote_currency(),
            leverage: default_leverage(),
            fee_rate: default_fee_rate(),
            paper_starting_cash: default_paper_starting_cash(),
            weights: ScoringWeights::default(),
            thresholds: SignalThresholds::default(),
            allocator: AllocatorConfig::default(),
            risk: RiskConfig::default(),
            intervals: IntervalConfig::default(),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

impl EngineConfig {
    /// Build the configuration from environment variables (after dotenv),
    /// falling back to the documented defaults, then validate.
    pub fn from_env() -> EngineResult<Self> {
        let mut cfg = Self::default();

        if let Ok(mode) = std::env::var("TRADING_MODE") {
            cfg.trading_mode = mode
                .parse()
                .map_err(|e: String| EngineError::Config(e))?;
        }

        if let Ok(raw) = std::env::var("TARGET_INSTRUMENTS") {
            let bases: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !bases.is_empty() {
                cfg.target_instruments = bases;
            }
        }

        cfg.leverage = env_parse("LEVERAGE", cfg.leverage).max(1);
        cfg.fee_rate = env_parse("FEE_RATE", cfg.fee_rate);
        cfg.paper_starting_cash =
            env_parse("PAPER_STARTING_CASH", cfg.paper_starting_cash);

        cfg.risk.stop_loss_pct = env_parse("STOP_LOSS_PCT", cfg.risk.stop_loss_pct);
        cfg.risk.take_profit_pct =
            env_parse("TAKE_PROFIT_PCT", cfg.risk.take_profit_pct);
        cfg.risk.trailing_stop_pct =
            env_parse("TRAILING_STOP_PCT", cfg.risk.trailing_stop_pct);
        cfg.risk.max_holding_minutes =
            env_parse("MAX_HOLDING_MINUTES", cfg.risk.max_holding_minutes);
        cfg.risk.daily_loss_limit_pct =
            env_parse("DAILY_LOSS_LIMIT_PCT", cfg.risk.daily_loss_limit_pct);

        cfg.intervals.data_collection_min =
            env_parse("DATA_COLLECTION_INTERVAL_MIN", cfg.intervals.data_collection_min).max(1);
        cfg.intervals.indicator_calc_min =
            env_parse("INDICATOR_CALC_INTERVAL_MIN", cfg.intervals.indicator_calc_min).max(1);
        cfg.intervals.scoring_min =
            env_parse("SCORING_INTERVAL_MIN", cfg.intervals.scoring_min).max(1);
        cfg.intervals.buy_execution_min =
            env_parse("BUY_EXECUTION_INTERVAL_MIN", cfg.intervals.buy_execution_min).max(1);
        cfg.intervals.risk_check_min =
            env_parse("RISK_CHECK_INTERVAL_MIN", cfg.intervals.risk_check_min).max(1);

        cfg.weights.technical = env_parse("WEIGHT_TECHNICAL", cfg.weights.technical);
        cfg.weights.momentum = env_parse("WEIGHT_MOMENTUM", cfg.weights.momentum);
        cfg.weights.volatility = env_parse("WEIGHT_VOLATILITY", cfg.weights.volatility);
        cfg.weights.volume = env_parse("WEIGHT_VOLUME", cfg.weights.volume);
        cfg.weights.sentiment = env_parse("WEIGHT_SENTIMENT", cfg.weights.sentiment);

        cfg.thresholds.buy = env_parse("BUY_THRESHOLD", cfg.thresholds.buy);
        cfg.thresholds.strong_buy =
            env_parse("STRONG_BUY_THRESHOLD", cfg.thresholds.strong_buy);
        cfg.thresholds.sell = env_parse("SELL_THRESHOLD", cfg.thresholds.sell);

        cfg.allocator.min_allocation_pct =
            env_parse("MIN_ALLOCATION_PCT", cfg.allocator.min_allocation_pct);
        cfg.allocator.max_allocation_pct =
            env_parse("MAX_ALLOCATION_PCT", cfg.allocator.max_allocation_pct);
        cfg.allocator.strong_buy_boost =
            env_parse("STRONG_BUY_BOOST", cfg.allocator.strong_buy_boost);
        cfg.allocator.limit_discount_pct =
            env_parse("LIMIT_DISCOUNT_PCT", cfg.allocator.limit_discount_pct);
        cfg.allocator.reserve_ratio =
            env_parse("RESERVE_RATIO", cfg.allocator.reserve_ratio);
        cfg.allocator.min_order_notional =
            env_parse("MIN_ORDER_NOTIONAL", cfg.allocator.min_order_notional);

        cfg.access_key = std::env::var("EXCHANGE_ACCESS_KEY").unwrap_or_default();
        cfg.secret_key = std::env::var("EXCHANGE_SECRET_KEY").unwrap_or_default();

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate cross-field constraints. Fatal at startup when violated.
    pub fn validate(&self) -> EngineResult<()> {
        self.weights.validate()?;

        if self.target_instruments.is_empty() {
            return Err(EngineError::Config(
                "target_instruments must not be empty".into(),
            ));
        }
        if self.allocator.min_allocation_pct > self.allocator.max_allocation_pct {
            return Err(EngineError::Config(format!(
                "min_allocation_pct {} exceeds max_allocation_pct {}",
                self.allocator.min_allocation_pct, self.allocator.max_allocation_pct
            )));
        }
        if !(0.0..1.0).contains(&self.allocator.reserve_ratio) {
            return Err(EngineError::Config(format!(
                "reserve_ratio must be in [0, 1), got {}",
                self.allocator.reserve_ratio
            )));
        }
        if self.risk.daily_loss_limit_pct >= 0.0 {
            return Err(EngineError::Config(format!(
                "daily_loss_limit_pct must be negative, got {}",
                self.risk.daily_loss_limit_pct
            )));
        }
        if self.trading_mode == TradingMode::Live
            && (self.access_key.is_empty() || self.secret_key.is_empty())
        {
            return Err(EngineError::Config(
                "live mode requires EXCHANGE_ACCESS_KEY and EXCHANGE_SECRET_KEY".into(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            instruments = ?config.target_instruments,
            trading_mode = %config.trading_mode,
            "config loaded"
        );
        Ok(config)
    }

    /// Persist the current configuration using an atomic write (write to
    /// `.tmp`, then rename). Prevents corruption if the process crashes
    /// mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }
}
