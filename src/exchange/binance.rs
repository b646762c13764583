// =============================================================================
// Binance REST API Client — HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: The secret key is never logged or serialized. All signed requests
// include X-MBX-APIKEY as a header and a recvWindow of 5 000 ms to tolerate
// minor clock drift between the bot and Binance servers.
//
// Every response is mapped onto the `ExchangeError` taxonomy: 5xx and rate
// limits are transient, 4xx rejections are non-retryable, and reqwest
// timeouts surface as `Timeout` so the tick can move on.
// =============================================================================

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::market::Candle;
use crate::types::{BalanceInfo, OrderStatus, OrderType};

use super::{
    DepthSnapshot, Exchange, ExchangeError, Fill, NewOrder, OrderAck, OrderInfo, SymbolFilters,
    Ticker,
};

type HmacSha256 = Hmac<Sha256>;

/// Default recv-window sent with every signed request (milliseconds).
const RECV_WINDOW: u64 = 5000;

/// Bounded timeout for every exchange call (seconds).
const CALL_TIMEOUT_SECS: u64 = 10;

/// Binance REST API client with HMAC-SHA256 request signing.
#[derive(Clone)]
pub struct BinanceClient {
    secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BinanceClient`.
    ///
    /// # Arguments
    /// * `api_key` — Binance API key (sent as a header, never in query params).
    /// * `secret`  — Binance secret key used exclusively for HMAC signing.
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let secret = secret.into();

        let mut default_headers = HeaderMap::new();
        // The API key header is required for all signed endpoints.
        if let Ok(val) = HeaderValue::from_str(&api_key) {
            default_headers.insert("X-MBX-APIKEY", val);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(CALL_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");

        debug!("BinanceClient initialised (base_url=https://api.binance.com)");

        Self {
            secret,
            base_url: "https://api.binance.com".to_string(),
            client,
        }
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// Produce an HMAC-SHA256 hex signature of `query`.
    fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Current UNIX timestamp in milliseconds.
    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    /// Build the full query string for a signed request (appends timestamp,
    /// recvWindow, and signature).
    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    // -------------------------------------------------------------------------
    // Response plumbing
    // -------------------------------------------------------------------------

    /// Classify a reqwest transport failure.
    fn map_transport(err: reqwest::Error, what: &str) -> ExchangeError {
        if err.is_timeout() {
            ExchangeError::Timeout(format!("{what}: {err}"))
        } else {
            ExchangeError::Transient(format!("{what}: {err}"))
        }
    }

    /// Classify a non-success HTTP status using the Binance error payload.
    fn map_status(status: StatusCode, body: &serde_json::Value, what: &str) -> ExchangeError {
        let code = body.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
        let msg = body
            .get("msg")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        // 429/418 are rate-limit responses; 5xx is exchange-side trouble.
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418
        {
            return ExchangeError::Transient(format!("{what}: {status} {msg}"));
        }

        // -2010: NEW_ORDER_REJECTED, typically insufficient balance.
        if code == -2010 && msg.to_lowercase().contains("insufficient") {
            return ExchangeError::InsufficientBalance(format!("{what}: {msg}"));
        }

        ExchangeError::NonRetryable(format!("{what}: {status} code={code} {msg}"))
    }

    /// Send a request and parse the JSON body, mapping failures onto the
    /// error taxonomy.
    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<serde_json::Value, ExchangeError> {
        let resp = req
            .send()
            .await
            .map_err(|e| Self::map_transport(e, what))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Self::map_transport(e, what))?;

        if !status.is_success() {
            let err = Self::map_status(status, &body, what);
            warn!(%status, what, "exchange call failed");
            return Err(err);
        }

        Ok(body)
    }

    /// Parse a JSON value that may be either a string or a number into Decimal.
    fn parse_decimal(val: &serde_json::Value, field: &str) -> Result<Decimal, ExchangeError> {
        let parsed = if let Some(s) = val.as_str() {
            Decimal::from_str(s).ok()
        } else {
            val.as_f64().and_then(Decimal::from_f64_retain)
        };
        parsed.ok_or_else(|| {
            ExchangeError::NonRetryable(format!("unparseable decimal field {field}: {val}"))
        })
    }

    fn format_decimal(value: Decimal) -> String {
        value.normalize().to_string()
    }
}

#[async_trait::async_trait]
impl Exchange for BinanceClient {
    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/ticker/24hr — last price, best bid/ask, 24h quote volume.
    #[instrument(skip(self), name = "binance::get_ticker")]
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.base_url, symbol);
        let body = self.send(self.client.get(&url), "GET /api/v3/ticker/24hr").await?;

        Ok(Ticker {
            symbol: symbol.to_string(),
            last_price: Self::parse_decimal(&body["lastPrice"], "lastPrice")?,
            bid: Self::parse_decimal(&body["bidPrice"], "bidPrice")?,
            ask: Self::parse_decimal(&body["askPrice"], "askPrice")?,
            quote_volume_24h: Self::parse_decimal(&body["quoteVolume"], "quoteVolume")?,
        })
    }

    /// GET /api/v3/klines (public — no signature required).
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime
    #[instrument(skip(self), name = "binance::get_klines")]
    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        let body = self.send(self.client.get(&url), "GET /api/v3/klines").await?;

        let raw = body
            .as_array()
            .ok_or_else(|| ExchangeError::NonRetryable("klines response is not an array".into()))?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            let arr = match entry.as_array() {
                Some(a) if a.len() >= 7 => a,
                _ => {
                    warn!("skipping malformed kline entry");
                    continue;
                }
            };

            candles.push(Candle::new(
                arr[0].as_i64().unwrap_or(0),
                Self::parse_decimal(&arr[1], "open")?,
                Self::parse_decimal(&arr[2], "high")?,
                Self::parse_decimal(&arr[3], "low")?,
                Self::parse_decimal(&arr[4], "close")?,
                Self::parse_decimal(&arr[5], "volume")?,
                arr[6].as_i64().unwrap_or(0),
            ));
        }

        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// GET /api/v3/depth — top-of-book levels.
    #[instrument(skip(self), name = "binance::get_depth")]
    async fn get_depth(&self, symbol: &str, levels: u32) -> Result<DepthSnapshot, ExchangeError> {
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.base_url, symbol, levels
        );
        let body = self.send(self.client.get(&url), "GET /api/v3/depth").await?;

        let parse_side = |key: &str| -> Result<Vec<(Decimal, Decimal)>, ExchangeError> {
            let mut out = Vec::new();
            for level in body[key].as_array().into_iter().flatten() {
                let pair = level.as_array().filter(|a| a.len() >= 2).ok_or_else(|| {
                    ExchangeError::NonRetryable(format!("malformed depth level in {key}"))
                })?;
                out.push((
                    Self::parse_decimal(&pair[0], "depth price")?,
                    Self::parse_decimal(&pair[1], "depth qty")?,
                ));
            }
            Ok(out)
        };

        Ok(DepthSnapshot {
            bids: parse_side("bids")?,
            asks: parse_side("asks")?,
        })
    }

    /// GET /api/v3/exchangeInfo — tick/step/notional filters for all symbols.
    #[instrument(skip(self), name = "binance::get_exchange_info")]
    async fn get_exchange_info(&self) -> Result<Vec<SymbolFilters>, ExchangeError> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let body = self
            .send(self.client.get(&url), "GET /api/v3/exchangeInfo")
            .await?;

        let symbols = body["symbols"].as_array().ok_or_else(|| {
            ExchangeError::NonRetryable("exchangeInfo response missing 'symbols'".into())
        })?;

        let mut out = Vec::with_capacity(symbols.len());
        for entry in symbols {
            let symbol = match entry["symbol"].as_str() {
                Some(s) => s.to_string(),
                None => continue,
            };

            let mut price_tick = Decimal::ZERO;
            let mut qty_step = Decimal::ZERO;
            let mut min_notional = Decimal::ZERO;

            for filter in entry["filters"].as_array().into_iter().flatten() {
                match filter["filterType"].as_str() {
                    Some("PRICE_FILTER") => {
                        price_tick = Self::parse_decimal(&filter["tickSize"], "tickSize")?;
                    }
                    Some("LOT_SIZE") => {
                        qty_step = Self::parse_decimal(&filter["stepSize"], "stepSize")?;
                    }
                    Some("MIN_NOTIONAL") | Some("NOTIONAL") => {
                        min_notional = Self::parse_decimal(&filter["minNotional"], "minNotional")?;
                    }
                    _ => {}
                }
            }

            out.push(SymbolFilters {
                symbol,
                price_tick,
                qty_step,
                min_notional,
                price_precision: entry["quoteAssetPrecision"].as_u64().unwrap_or(8) as u32,
                qty_precision: entry["baseAssetPrecision"].as_u64().unwrap_or(8) as u32,
            });
        }

        debug!(count = out.len(), "exchange info fetched");
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Account / balance
    // -------------------------------------------------------------------------

    /// GET /api/v3/account (signed) — non-zero balances.
    #[instrument(skip(self), name = "binance::get_account")]
    async fn get_account(&self) -> Result<Vec<BalanceInfo>, ExchangeError> {
        let qs = self.signed_query("");
        let url = format!("{}/api/v3/account?{}", self.base_url, qs);
        let body = self.send(self.client.get(&url), "GET /api/v3/account").await?;

        let balances = body["balances"].as_array().ok_or_else(|| {
            ExchangeError::NonRetryable("account response missing 'balances'".into())
        })?;

        let mut out = Vec::new();
        for b in balances {
            let asset = b["asset"].as_str().unwrap_or("").to_string();
            let free = Self::parse_decimal(&b["free"], "free")?;
            let locked = Self::parse_decimal(&b["locked"], "locked")?;
            if !free.is_zero() || !locked.is_zero() {
                out.push(BalanceInfo {
                    asset,
                    free,
                    locked,
                });
            }
        }

        debug!(count = out.len(), "account balances retrieved");
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// POST /api/v3/order (signed) — submit a new order with FULL response
    /// type so fills and commissions come back in the acknowledgement.
    #[instrument(skip(self, order), name = "binance::submit_order", fields(symbol = %order.symbol, side = %order.side))]
    async fn submit_order(&self, order: &NewOrder) -> Result<OrderAck, ExchangeError> {
        let mut params = format!(
            "symbol={}&side={}&type={}&quantity={}&newClientOrderId={}&newOrderRespType=FULL",
            order.symbol,
            order.side,
            order.order_type,
            Self::format_decimal(order.quantity),
            order.client_order_id,
        );

        if order.order_type == OrderType::Limit {
            let price = order.price.ok_or_else(|| {
                ExchangeError::NonRetryable("limit order submitted without a price".into())
            })?;
            params.push_str(&format!(
                "&price={}&timeInForce=GTC",
                Self::format_decimal(price)
            ));
        }

        let qs = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", self.base_url, qs);

        debug!(
            symbol = %order.symbol,
            side = %order.side,
            order_type = %order.order_type,
            quantity = %order.quantity,
            client_order_id = %order.client_order_id,
            "placing order"
        );

        let body = self.send(self.client.post(&url), "POST /api/v3/order").await?;

        let status = body["status"]
            .as_str()
            .and_then(OrderStatus::parse)
            .ok_or_else(|| {
                ExchangeError::NonRetryable(format!("order ack missing status: {body}"))
            })?;

        let mut fills = Vec::new();
        for fill in body["fills"].as_array().into_iter().flatten() {
            fills.push(Fill {
                price: Self::parse_decimal(&fill["price"], "fill price")?,
                qty: Self::parse_decimal(&fill["qty"], "fill qty")?,
                commission: Self::parse_decimal(&fill["commission"], "commission")?,
                commission_asset: fill["commissionAsset"].as_str().unwrap_or("").to_string(),
            });
        }

        Ok(OrderAck {
            order_id: body["orderId"].as_u64().unwrap_or(0),
            client_order_id: order.client_order_id.clone(),
            status,
            executed_qty: Self::parse_decimal(&body["executedQty"], "executedQty")?,
            cummulative_quote_qty: Self::parse_decimal(
                &body["cummulativeQuoteQty"],
                "cummulativeQuoteQty",
            )?,
            fills,
        })
    }

    /// GET /api/v3/order (signed) — poll an order's status.
    #[instrument(skip(self), name = "binance::get_order")]
    async fn get_order(&self, symbol: &str, order_id: u64) -> Result<OrderInfo, ExchangeError> {
        let params = format!("symbol={symbol}&orderId={order_id}");
        let qs = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", self.base_url, qs);
        let body = self.send(self.client.get(&url), "GET /api/v3/order").await?;

        let status = body["status"]
            .as_str()
            .and_then(OrderStatus::parse)
            .ok_or_else(|| {
                ExchangeError::NonRetryable(format!("order status missing: {body}"))
            })?;

        Ok(OrderInfo {
            status,
            executed_qty: Self::parse_decimal(&body["executedQty"], "executedQty")?,
            cummulative_quote_qty: Self::parse_decimal(
                &body["cummulativeQuoteQty"],
                "cummulativeQuoteQty",
            )?,
            update_time: body["updateTime"].as_i64().unwrap_or(0),
        })
    }

    /// DELETE /api/v3/order (signed) — cancel an existing order.
    #[instrument(skip(self), name = "binance::cancel_order")]
    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<(), ExchangeError> {
        let params = format!("symbol={symbol}&orderId={order_id}");
        let qs = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", self.base_url, qs);

        debug!(symbol, order_id, "cancelling order");
        self.send(self.client.delete(&url), "DELETE /api/v3/order")
            .await?;

        debug!(symbol, order_id, "order cancelled");
        Ok(())
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signature_is_deterministic_hex() {
        let client = BinanceClient::new("key", "secret");
        let sig1 = client.sign("symbol=BTCUSDT&side=BUY");
        let sig2 = client.sign("symbol=BTCUSDT&side=BUY");
        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), 64);
        assert!(sig1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parse_decimal_accepts_strings_and_numbers() {
        let s = serde_json::json!("50000.12345678");
        assert_eq!(
            BinanceClient::parse_decimal(&s, "x").unwrap(),
            dec!(50000.12345678)
        );
        let n = serde_json::json!(2.5);
        assert_eq!(BinanceClient::parse_decimal(&n, "x").unwrap(), dec!(2.5));
        let bad = serde_json::json!(null);
        assert!(BinanceClient::parse_decimal(&bad, "x").is_err());
    }

    #[test]
    fn format_decimal_trims_trailing_zeros() {
        assert_eq!(BinanceClient::format_decimal(dec!(0.10000000)), "0.1");
        assert_eq!(BinanceClient::format_decimal(dec!(50000)), "50000");
    }

    #[test]
    fn map_status_classifies_errors() {
        let body = serde_json::json!({"code": -2010, "msg": "Account has insufficient balance for requested action."});
        let err = BinanceClient::map_status(StatusCode::BAD_REQUEST, &body, "order");
        assert!(matches!(err, ExchangeError::InsufficientBalance(_)));

        let body = serde_json::json!({"code": -1121, "msg": "Invalid symbol."});
        let err = BinanceClient::map_status(StatusCode::BAD_REQUEST, &body, "order");
        assert!(matches!(err, ExchangeError::NonRetryable(_)));

        let body = serde_json::json!({});
        let err = BinanceClient::map_status(StatusCode::INTERNAL_SERVER_ERROR, &body, "order");
        assert!(err.is_transient());

        let err = BinanceClient::map_status(StatusCode::TOO_MANY_REQUESTS, &body, "order");
        assert!(err.is_transient());
    }
}
