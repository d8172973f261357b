// =============================================================================
// Shared types used across the Meridian trading engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Whether orders are simulated in-process or sent to the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Simulated,
    Live,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Simulated
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulated => write!(f, "simulated"),
            Self::Live => write!(f, "live"),
        }
    }
}

impl std::str::FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simulated" | "paper" => Ok(Self::Simulated),
            "live" => Ok(Self::Live),
            other => Err(format!("unknown trading mode: {other}")),
        }
    }
}

/// Order side as the exchange sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Direction of an open exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl Default for PositionSide {
    fn default() -> Self {
        Self::Long
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// How an order is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderMethod {
    Market,
    Limit,
}

impl std::fmt::Display for OrderMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Categorical trade decision emitted by the scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSignal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
}

impl TradeSignal {
    /// A buy candidate is anything the allocator may size.
    pub fn is_buy(&self) -> bool {
        matches!(self, Self::Buy | Self::StrongBuy)
    }
}

impl std::fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongBuy => write!(f, "STRONG_BUY"),
            Self::Buy => write!(f, "BUY"),
            Self::Hold => write!(f, "HOLD"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Market volatility regime classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolatilityRegime {
    Low,
    Medium,
    High,
    Extreme,
}

/// On-balance-volume trend direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObvTrend {
    Rising,
    Falling,
    Neutral,
}

impl Default for ObvTrend {
    fn default() -> Self {
        Self::Neutral
    }
}

/// A tradable market identifier: base asset quoted in a specific currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Base asset, e.g. "BTC".
    pub base: String,
    /// Quote currency, e.g. "KRW".
    pub quote: String,
    /// Derivative instruments may be shorted; spot instruments may not.
    #[serde(default)]
    pub derivative: bool,
}

impl Instrument {
    pub fn spot(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
            derivative: false,
        }
    }

    /// Exchange market code, e.g. "KRW-BTC".
    pub fn market_code(&self) -> String {
        format!("{}-{}", self.quote, self.base)
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.market_code())
    }
}

/// Per-currency balance snapshot from the exchange.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub free: f64,
    #[serde(default)]
    pub used: f64,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub avg_buy_price: f64,
}

/// Normalized open-position row used by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangePosition {
    pub instrument: Instrument,
    pub side: PositionSide,
    pub qty: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_code_format() {
        let inst = Instrument::spot("BTC", "KRW");
        assert_eq!(inst.market_code(), "KRW-BTC");
        assert!(!inst.derivative);
    }

    #[test]
    fn trading_mode_parse() {
        assert_eq!("live".parse::<TradingMode>().unwrap(), TradingMode::Live);
        assert_eq!(
            "Simulated".parse::<TradingMode>().unwrap(),
            TradingMode::Simulated
        );
        assert!("demo2".parse::<TradingMode>().is_err());
    }

    #[test]
    fn signal_buy_filter() {
        assert!(TradeSignal::Buy.is_buy());
        assert!(TradeSignal::StrongBuy.is_buy());
        assert!(!TradeSignal::Hold.is_buy());
        assert!(!TradeSignal::Sell.is_buy());
    }
}
