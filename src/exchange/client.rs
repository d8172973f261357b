// =============================================================================
// Exchange REST Client — public market data + authenticated account/orders
// =============================================================================
//
// All requests flow through the shared pacer (minimum 60 ms gap). Transient
// failures (network, timeout, 5xx) retry twice with linear backoff before
// surfacing as UpstreamUnavailable; 4xx responses surface immediately as
// UpstreamRejected and are never retried.
//
// Responses are parsed into typed view structs; a response missing mandatory
// fields is an UpstreamRejected, not a panic.
//
// SECURITY: the secret key is never logged or serialized.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::exchange::auth;
use crate::exchange::pacer::RequestPacer;
use crate::market_data::{Candle, Orderbook, OrderbookLevel, Ticker};
use crate::types::{Balance, Side};

/// Retry budget for transient failures.
const MAX_RETRIES: u32 = 2;
/// Base backoff between retries; grows linearly with the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(300);

/// A new-order request in the exchange's own vocabulary.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub market: String,
    pub side: Side,
    /// "price" = market buy by notional, "market" = market sell by volume,
    /// "limit" = limit order with price + volume.
    pub ord_type: String,
    pub volume: Option<f64>,
    pub price: Option<f64>,
    /// Deterministic client order identifier, used to resolve timeouts by
    /// status query instead of a second POST.
    pub identifier: Option<String>,
}

/// Typed view of a placed-order response.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub uuid: String,
    pub side: Side,
    pub state: String,
    pub price: f64,
    pub executed_volume: f64,
    pub paid_fee: f64,
    pub created_at: String,
}

/// Typed view of one executed-orders row.
#[derive(Debug, Clone)]
pub struct ClosedOrder {
    pub uuid: String,
    pub side: Side,
    pub executed_volume: f64,
    pub price: f64,
    pub paid_fee: f64,
    pub created_at: String,
}

/// REST client with bearer-token signing.
#[derive(Clone)]
pub struct ExchangeClient {
    access_key: String,
    secret_key: String,
    base_url: String,
    client: reqwest::Client,
    pacer: std::sync::Arc<RequestPacer>,
}

impl ExchangeClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self::with_base_url(access_key, secret_key, "https://api.upbit.com")
    }

    pub fn with_base_url(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            base_url: base_url.into(),
            client,
            pacer: std::sync::Arc::new(RequestPacer::default()),
        }
    }

    // -------------------------------------------------------------------------
    // Transport core
    // -------------------------------------------------------------------------

    /// Send a request with pacing and the transient-failure retry budget.
    ///
    /// `query` is appended to the URL and, for signed requests, hashed into
    /// the bearer token.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        query: Option<&str>,
        signed: bool,
    ) -> EngineResult<serde_json::Value> {
        let url = match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        };

        let mut last_err: Option<EngineError> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                sleep(RETRY_BACKOFF * attempt).await;
            }
            self.pacer.pace().await;

            let mut req = self.client.request(method.clone(), &url);
            if signed {
                let token = auth::bearer_token(
                    &self.access_key,
                    &self.secret_key,
                    query.filter(|q| !q.is_empty()),
                );
                req = req.header("Authorization", format!("Bearer {token}"));
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(path, attempt, error = %e, "request transport error");
                    last_err = Some(EngineError::UpstreamUnavailable(format!(
                        "{method} {path}: {e}"
                    )));
                    continue;
                }
            };

            let status = resp.status();
            let body: serde_json::Value = match resp.json().await {
                Ok(body) => body,
                Err(e) => {
                    last_err = Some(EngineError::UpstreamUnavailable(format!(
                        "{method} {path}: body parse failed: {e}"
                    )));
                    continue;
                }
            };

            if status.is_success() {
                debug!(path, attempt, "request ok");
                return Ok(body);
            }

            let message = body["error"]["message"]
                .as_str()
                .or_else(|| body["error"]["name"].as_str())
                .unwrap_or("unknown error")
                .to_string();

            if status.is_client_error() {
                // Auth / permission / validation problems do not heal on retry.
                warn!(path, status = %status, message = %message, "request rejected");
                return Err(EngineError::UpstreamRejected(format!(
                    "{method} {path} returned {status}: {message}"
                )));
            }

            warn!(path, status = %status, attempt, message = %message, "server error");
            last_err = Some(EngineError::UpstreamUnavailable(format!(
                "{method} {path} returned {status}: {message}"
            )));
        }

        Err(last_err.unwrap_or_else(|| {
            EngineError::UpstreamUnavailable(format!("{method} {path}: retries exhausted"))
        }))
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// Fetch minute candles for one market, returned oldest-first.
    pub async fn get_candles(
        &self,
        market: &str,
        unit_minutes: u32,
        count: u32,
    ) -> EngineResult<Vec<Candle>> {
        let path = format!("/v1/candles/minutes/{unit_minutes}");
        let query = format!("market={market}&count={count}");
        let body = self
            .request(reqwest::Method::GET, &path, Some(&query), false)
            .await?;

        let rows: Vec<RawCandle> = parse_rows(&body, "candles")?;

        // The exchange returns newest-first; flip to time-ascending.
        let mut candles: Vec<Candle> = rows
            .into_iter()
            .map(|r| r.into_candle())
            .collect::<EngineResult<_>>()?;
        candles.reverse();

        debug!(market, unit_minutes, count = candles.len(), "candles fetched");
        Ok(candles)
    }

    /// Fetch tickers for a batch of markets.
    pub async fn get_tickers(&self, markets: &[String]) -> EngineResult<Vec<Ticker>> {
        if markets.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("markets={}", markets.join(","));
        let body = self
            .request(reqwest::Method::GET, "/v1/ticker", Some(&query), false)
            .await?;

        let rows: Vec<RawTicker> = parse_rows(&body, "ticker")?;
        Ok(rows.into_iter().map(RawTicker::into_ticker).collect())
    }

    /// Fetch the orderbook for one market, trimmed to `depth` levels.
    pub async fn get_orderbook(&self, market: &str, depth: usize) -> EngineResult<Orderbook> {
        let query = format!("markets={market}");
        let body = self
            .request(reqwest::Method::GET, "/v1/orderbook", Some(&query), false)
            .await?;

        let rows: Vec<RawOrderbook> = parse_rows(&body, "orderbook")?;
        let raw = rows.into_iter().next().ok_or_else(|| {
            EngineError::UpstreamRejected(format!("orderbook response empty for {market}"))
        })?;

        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for unit in raw.orderbook_units.into_iter().take(depth) {
            bids.push(OrderbookLevel {
                price: unit.bid_price,
                size: unit.bid_size,
            });
            asks.push(OrderbookLevel {
                price: unit.ask_price,
                size: unit.ask_size,
            });
        }

        Ok(Orderbook {
            market: raw.market,
            bids,
            asks,
        })
    }

    // -------------------------------------------------------------------------
    // Private account
    // -------------------------------------------------------------------------

    /// Fetch per-currency account balances.
    pub async fn get_accounts(&self) -> EngineResult<HashMap<String, Balance>> {
        let body = self
            .request(reqwest::Method::GET, "/v1/accounts", None, true)
            .await?;

        let rows: Vec<RawAccount> = parse_rows(&body, "accounts")?;

        let mut balances = HashMap::new();
        for row in rows {
            let free = parse_num(&row.balance).unwrap_or(0.0);
            let used = parse_num(&row.locked).unwrap_or(0.0);
            balances.insert(
                row.currency,
                Balance {
                    free,
                    used,
                    total: free + used,
                    avg_buy_price: parse_num(&row.avg_buy_price).unwrap_or(0.0),
                },
            );
        }
        Ok(balances)
    }

    // -------------------------------------------------------------------------
    // Private orders
    // -------------------------------------------------------------------------

    /// Submit a new order.
    pub async fn place_order(&self, order: &OrderRequest) -> EngineResult<PlacedOrder> {
        let side = match order.side {
            Side::Buy => "bid",
            Side::Sell => "ask",
        };
        let mut params = vec![
            format!("market={}", order.market),
            format!("side={side}"),
            format!("ord_type={}", order.ord_type),
        ];
        if let Some(volume) = order.volume {
            params.push(format!("volume={volume}"));
        }
        if let Some(price) = order.price {
            params.push(format!("price={price}"));
        }
        if let Some(identifier) = &order.identifier {
            params.push(format!("identifier={identifier}"));
        }
        let query = params.join("&");

        debug!(market = %order.market, side = %order.side, ord_type = %order.ord_type, "placing order");

        let body = self
            .request(reqwest::Method::POST, "/v1/orders", Some(&query), true)
            .await?;

        PlacedOrder::from_value(&body)
    }

    /// Look an order up by its deterministic client identifier. Used to
    /// resolve a connection timeout without risking a duplicate POST.
    pub async fn get_order_by_identifier(&self, identifier: &str) -> EngineResult<PlacedOrder> {
        let query = format!("identifier={identifier}");
        let body = self
            .request(reqwest::Method::GET, "/v1/order", Some(&query), true)
            .await?;
        PlacedOrder::from_value(&body)
    }

    /// List open (waiting) orders, optionally restricted to one market.
    pub async fn open_orders(&self, market: Option<&str>) -> EngineResult<Vec<PlacedOrder>> {
        let query = match market {
            Some(m) => format!("state=wait&market={m}"),
            None => "state=wait".to_string(),
        };
        let body = self
            .request(reqwest::Method::GET, "/v1/orders", Some(&query), true)
            .await?;

        let rows = body.as_array().ok_or_else(|| {
            EngineError::UpstreamRejected("open orders response is not an array".into())
        })?;
        rows.iter().map(PlacedOrder::from_value).collect()
    }

    /// Cancel a single order by uuid.
    pub async fn cancel_order(&self, uuid: &str) -> EngineResult<()> {
        let query = format!("uuid={uuid}");
        self.request(reqwest::Method::DELETE, "/v1/order", Some(&query), true)
            .await?;
        debug!(uuid, "order cancelled");
        Ok(())
    }

    /// List executed orders for a market (paged).
    pub async fn closed_orders(
        &self,
        market: &str,
        page: u32,
        limit: u32,
    ) -> EngineResult<Vec<ClosedOrder>> {
        let query = format!("market={market}&state=done&page={page}&limit={limit}");
        let body = self
            .request(reqwest::Method::GET, "/v1/orders", Some(&query), true)
            .await?;

        let rows = body.as_array().ok_or_else(|| {
            EngineError::UpstreamRejected("closed orders response is not an array".into())
        })?;
        rows.iter().map(ClosedOrder::from_value).collect()
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// =============================================================================
// Raw DTOs & typed-view constructors
// =============================================================================

#[derive(Deserialize)]
struct RawCandle {
    candle_date_time_utc: String,
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
    candle_acc_trade_volume: f64,
}

impl RawCandle {
    fn into_candle(self) -> EngineResult<Candle> {
        let open_time = NaiveDateTime::parse_from_str(&self.candle_date_time_utc, "%Y-%m-%dT%H:%M:%S")
            .map_err(|e| {
                EngineError::UpstreamRejected(format!(
                    "unparseable candle timestamp {}: {e}",
                    self.candle_date_time_utc
                ))
            })?
            .and_utc()
            .timestamp_millis();

        Ok(Candle::new(
            open_time,
            self.opening_price,
            self.high_price,
            self.low_price,
            self.trade_price,
            self.candle_acc_trade_volume,
        ))
    }
}

#[derive(Deserialize)]
struct RawTicker {
    market: String,
    trade_price: f64,
    #[serde(default)]
    signed_change_rate: f64,
    #[serde(default)]
    opening_price: f64,
    #[serde(default)]
    high_price: f64,
    #[serde(default)]
    low_price: f64,
    #[serde(default)]
    acc_trade_price_24h: f64,
}

impl RawTicker {
    fn into_ticker(self) -> Ticker {
        Ticker {
            market: self.market,
            last_price: self.trade_price,
            change_rate_24h: self.signed_change_rate,
            opening_price: self.opening_price,
            high_price: self.high_price,
            low_price: self.low_price,
            acc_trade_price_24h: self.acc_trade_price_24h,
        }
    }
}

#[derive(Deserialize)]
struct RawOrderbookUnit {
    ask_price: f64,
    bid_price: f64,
    ask_size: f64,
    bid_size: f64,
}

#[derive(Deserialize)]
struct RawOrderbook {
    market: String,
    orderbook_units: Vec<RawOrderbookUnit>,
}

#[derive(Deserialize)]
struct RawAccount {
    currency: String,
    #[serde(default)]
    balance: serde_json::Value,
    #[serde(default)]
    locked: serde_json::Value,
    #[serde(default)]
    avg_buy_price: serde_json::Value,
}

impl PlacedOrder {
    /// Build the typed view, rejecting responses missing mandatory fields.
    fn from_value(value: &serde_json::Value) -> EngineResult<Self> {
        let uuid = value["uuid"]
            .as_str()
            .ok_or_else(|| EngineError::UpstreamRejected("order response missing uuid".into()))?
            .to_string();
        let side = match value["side"].as_str() {
            Some("bid") => Side::Buy,
            Some("ask") => Side::Sell,
            other => {
                return Err(EngineError::UpstreamRejected(format!(
                    "order response has invalid side: {other:?}"
                )))
            }
        };

        Ok(Self {
            uuid,
            side,
            state: value["state"].as_str().unwrap_or("").to_string(),
            price: parse_num(&value["price"]).unwrap_or(0.0),
            executed_volume: parse_num(&value["executed_volume"]).unwrap_or(0.0),
            paid_fee: parse_num(&value["paid_fee"]).unwrap_or(0.0),
            created_at: value["created_at"].as_str().unwrap_or("").to_string(),
        })
    }
}

impl ClosedOrder {
    fn from_value(value: &serde_json::Value) -> EngineResult<Self> {
        let placed = PlacedOrder::from_value(value)?;
        Ok(Self {
            uuid: placed.uuid,
            side: placed.side,
            executed_volume: placed.executed_volume,
            price: placed.price,
            paid_fee: placed.paid_fee,
            created_at: placed.created_at,
        })
    }
}

/// Parse the array body of a response into DTO rows.
fn parse_rows<T: serde::de::DeserializeOwned>(
    body: &serde_json::Value,
    what: &str,
) -> EngineResult<Vec<T>> {
    serde_json::from_value(body.clone()).map_err(|e| {
        EngineError::UpstreamRejected(format!("malformed {what} response: {e}"))
    })
}

/// The exchange sends numbers both as JSON numbers and as strings.
fn parse_num(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_candle_parses_utc_timestamp() {
        let raw = RawCandle {
            candle_date_time_utc: "2024-03-01T12:05:00".to_string(),
            opening_price: 100.0,
            high_price: 105.0,
            low_price: 95.0,
            trade_price: 102.0,
            candle_acc_trade_volume: 12.5,
        };
        let candle = raw.into_candle().unwrap();
        assert_eq!(candle.open_time % 60_000, 0);
        assert!((candle.close - 102.0).abs() < f64::EPSILON);
    }

    #[test]
    fn raw_candle_bad_timestamp_rejected() {
        let raw = RawCandle {
            candle_date_time_utc: "not-a-time".to_string(),
            opening_price: 1.0,
            high_price: 1.0,
            low_price: 1.0,
            trade_price: 1.0,
            candle_acc_trade_volume: 1.0,
        };
        let err = raw.into_candle().unwrap_err();
        assert_eq!(err.kind(), "upstream_rejected");
    }

    #[test]
    fn placed_order_requires_uuid_and_side() {
        let ok = serde_json::json!({
            "uuid": "abc",
            "side": "bid",
            "state": "done",
            "price": "100.5",
            "executed_volume": "0.5",
            "paid_fee": "0.05",
            "created_at": "2024-03-01T12:00:00+09:00"
        });
        let order = PlacedOrder::from_value(&ok).unwrap();
        assert_eq!(order.uuid, "abc");
        assert_eq!(order.side, Side::Buy);
        assert!((order.price - 100.5).abs() < 1e-12);
        assert!((order.executed_volume - 0.5).abs() < 1e-12);

        let missing_uuid = serde_json::json!({"side": "bid"});
        assert!(PlacedOrder::from_value(&missing_uuid).is_err());

        let bad_side = serde_json::json!({"uuid": "abc", "side": "hold"});
        assert!(PlacedOrder::from_value(&bad_side).is_err());
    }

    #[test]
    fn parse_num_accepts_strings_and_numbers() {
        assert_eq!(parse_num(&serde_json::json!(1.5)), Some(1.5));
        assert_eq!(parse_num(&serde_json::json!("2.5")), Some(2.5));
        assert_eq!(parse_num(&serde_json::json!(null)), None);
        assert_eq!(parse_num(&serde_json::json!("abc")), None);
    }

    #[test]
    fn client_debug_redacts_secrets() {
        let client = ExchangeClient::new("my-access-key", "my-secret-key");
        let debug = format!("{client:?}");
        assert!(!debug.contains("my-access-key"));
        assert!(!debug.contains("my-secret-key"));
        assert!(debug.contains("<redacted>"));
    }
}
