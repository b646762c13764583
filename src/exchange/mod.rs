// =============================================================================
// Exchange abstraction — the REST surface the trading core consumes
// =============================================================================
//
// The engine talks to the exchange through this trait so the pipeline can run
// against the real Binance client in production and a scripted mock in tests.
// All prices and quantities cross this boundary as `Decimal`, parsed from the
// exchange's canonical decimal strings.
// =============================================================================

pub mod binance;
pub mod filters;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::Candle;
pub use crate::types::{BalanceInfo, OrderSide, OrderStatus, OrderType};

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Failure categories for exchange calls.
///
/// `Transient` failures are retried a bounded number of times within the same
/// call; everything else surfaces immediately.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    /// Network failures, 5xx responses, rate limiting.
    #[error("transient exchange error: {0}")]
    Transient(String),

    /// Rejected by the exchange (bad filter, invalid symbol). Do not retry.
    #[error("exchange rejected request: {0}")]
    NonRetryable(String),

    /// Account cannot fund the order. Do not retry; raise an alert.
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    /// The bounded call timeout elapsed.
    #[error("exchange call timed out: {0}")]
    Timeout(String),
}

impl ExchangeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Last price plus top-of-book quote and 24h quote volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last_price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub quote_volume_24h: Decimal,
}

impl Ticker {
    /// Bid/ask midpoint.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Spread in basis points relative to the midpoint.
    pub fn spread_bps(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        let mid = self.mid();
        if mid.is_zero() {
            return f64::MAX;
        }
        ((self.ask - self.bid) / mid * Decimal::from(10_000u32))
            .to_f64()
            .unwrap_or(f64::MAX)
    }
}

/// Order book levels as (price, quantity) pairs, best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

impl DepthSnapshot {
    /// USD notional resting at the best bid.
    pub fn bid_depth_usd(&self) -> Decimal {
        self.bids
            .first()
            .map(|(p, q)| *p * *q)
            .unwrap_or(Decimal::ZERO)
    }

    /// USD notional resting at the best ask.
    pub fn ask_depth_usd(&self) -> Decimal {
        self.asks
            .first()
            .map(|(p, q)| *p * *q)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Tick/step/notional constraints for one symbol, from exchangeInfo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub symbol: String,
    pub price_tick: Decimal,
    pub qty_step: Decimal,
    pub min_notional: Decimal,
    pub price_precision: u32,
    pub qty_precision: u32,
}

impl SymbolFilters {
    /// Snap a price down to the exchange tick grid.
    pub fn snap_price(&self, price: Decimal) -> Decimal {
        if self.price_tick.is_zero() {
            return price;
        }
        (price / self.price_tick).floor() * self.price_tick
    }

    /// Snap a quantity down to the exchange step grid.
    pub fn snap_qty(&self, qty: Decimal) -> Decimal {
        if self.qty_step.is_zero() {
            return qty;
        }
        (qty / self.qty_step).floor() * self.qty_step
    }

    /// Validate `(symbol, price, quantity)` against LOT_SIZE, PRICE_FILTER,
    /// and MIN_NOTIONAL. Returns the first violation as an error message.
    pub fn validate(&self, price: Decimal, quantity: Decimal) -> Result<(), String> {
        if quantity <= Decimal::ZERO {
            return Err(format!("quantity {quantity} is not positive"));
        }
        if !self.qty_step.is_zero() && !(quantity % self.qty_step).is_zero() {
            return Err(format!(
                "quantity {quantity} does not conform to step {}",
                self.qty_step
            ));
        }
        if !self.price_tick.is_zero() && !(price % self.price_tick).is_zero() {
            return Err(format!(
                "price {price} does not conform to tick {}",
                self.price_tick
            ));
        }
        let notional = price * quantity;
        if notional < self.min_notional {
            return Err(format!(
                "notional {notional} below minimum {}",
                self.min_notional
            ));
        }
        Ok(())
    }
}

/// A new order request. `client_order_id` is the deterministic idempotency
/// key; replays collapse to the first submission's outcome on the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub client_order_id: String,
}

/// A single fill inside an order acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
}

/// Submission acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: u64,
    pub client_order_id: String,
    pub status: OrderStatus,
    pub executed_qty: Decimal,
    /// Total quote currency exchanged so far.
    pub cummulative_quote_qty: Decimal,
    pub fills: Vec<Fill>,
}

/// Order status poll result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderInfo {
    pub status: OrderStatus,
    pub executed_qty: Decimal,
    pub cummulative_quote_qty: Decimal,
    pub update_time: i64,
}

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// The minimum exchange surface the core relies on.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn get_depth(&self, symbol: &str, levels: u32) -> Result<DepthSnapshot, ExchangeError>;

    async fn get_exchange_info(&self) -> Result<Vec<SymbolFilters>, ExchangeError>;

    async fn get_account(&self) -> Result<Vec<BalanceInfo>, ExchangeError>;

    async fn submit_order(&self, order: &NewOrder) -> Result<OrderAck, ExchangeError>;

    async fn get_order(&self, symbol: &str, order_id: u64) -> Result<OrderInfo, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<(), ExchangeError>;
}

// =============================================================================
// Scripted mock for pipeline tests
// =============================================================================
#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    use rust_decimal_macros::dec;

    /// In-memory exchange with scripted market data and instant fills.
    pub struct MockExchange {
        pub tickers: Mutex<HashMap<String, Ticker>>,
        pub klines: Mutex<HashMap<String, Vec<Candle>>>,
        pub depth: Mutex<HashMap<String, DepthSnapshot>>,
        pub filters: Mutex<Vec<SymbolFilters>>,
        pub balances: Mutex<Vec<BalanceInfo>>,
        /// Every order the engine submitted, in order.
        pub submitted: Mutex<Vec<NewOrder>>,
        /// Per-symbol fill price override (defaults to the ticker last price).
        pub fill_prices: Mutex<HashMap<String, Decimal>>,
        /// Scripted submit failures, consumed front-to-back.
        pub submit_failures: Mutex<Vec<ExchangeError>>,
        /// Commission charged per fill, as a fraction of notional.
        pub fee_rate: Mutex<Decimal>,
        orders: Mutex<HashMap<u64, OrderInfo>>,
        next_order_id: AtomicU64,
    }

    impl MockExchange {
        pub fn new() -> Self {
            Self {
                tickers: Mutex::new(HashMap::new()),
                klines: Mutex::new(HashMap::new()),
                depth: Mutex::new(HashMap::new()),
                filters: Mutex::new(Vec::new()),
                balances: Mutex::new(Vec::new()),
                submitted: Mutex::new(Vec::new()),
                fill_prices: Mutex::new(HashMap::new()),
                submit_failures: Mutex::new(Vec::new()),
                fee_rate: Mutex::new(Decimal::ZERO),
                orders: Mutex::new(HashMap::new()),
                next_order_id: AtomicU64::new(1),
            }
        }

        /// Wide-open filters so sizing tests aren't disturbed by snapping.
        pub fn permissive_filters(symbol: &str) -> SymbolFilters {
            SymbolFilters {
                symbol: symbol.to_string(),
                price_tick: dec!(0.01),
                qty_step: dec!(0.00001),
                min_notional: dec!(10),
                price_precision: 2,
                qty_precision: 5,
            }
        }

        pub fn set_ticker(&self, symbol: &str, last: Decimal, bid: Decimal, ask: Decimal, vol: Decimal) {
            self.tickers.lock().insert(
                symbol.to_string(),
                Ticker {
                    symbol: symbol.to_string(),
                    last_price: last,
                    bid,
                    ask,
                    quote_volume_24h: vol,
                },
            );
        }

        pub fn set_fill_price(&self, symbol: &str, price: Decimal) {
            self.fill_prices.lock().insert(symbol.to_string(), price);
        }

        pub fn submitted_orders(&self) -> Vec<NewOrder> {
            self.submitted.lock().clone()
        }
    }

    #[async_trait]
    impl Exchange for MockExchange {
        async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
            self.tickers
                .lock()
                .get(symbol)
                .cloned()
                .ok_or_else(|| ExchangeError::NonRetryable(format!("unknown symbol {symbol}")))
        }

        async fn get_klines(
            &self,
            symbol: &str,
            _interval: &str,
            limit: u32,
        ) -> Result<Vec<Candle>, ExchangeError> {
            let klines = self.klines.lock();
            let all = klines
                .get(symbol)
                .cloned()
                .ok_or_else(|| ExchangeError::NonRetryable(format!("unknown symbol {symbol}")))?;
            let start = all.len().saturating_sub(limit as usize);
            Ok(all[start..].to_vec())
        }

        async fn get_depth(&self, symbol: &str, _levels: u32) -> Result<DepthSnapshot, ExchangeError> {
            self.depth
                .lock()
                .get(symbol)
                .cloned()
                .ok_or_else(|| ExchangeError::NonRetryable(format!("unknown symbol {symbol}")))
        }

        async fn get_exchange_info(&self) -> Result<Vec<SymbolFilters>, ExchangeError> {
            Ok(self.filters.lock().clone())
        }

        async fn get_account(&self) -> Result<Vec<BalanceInfo>, ExchangeError> {
            Ok(self.balances.lock().clone())
        }

        async fn submit_order(&self, order: &NewOrder) -> Result<OrderAck, ExchangeError> {
            {
                let mut failures = self.submit_failures.lock();
                if !failures.is_empty() {
                    return Err(failures.remove(0));
                }
            }

            self.submitted.lock().push(order.clone());

            let fill_price = self
                .fill_prices
                .lock()
                .get(&order.symbol)
                .copied()
                .or(order.price)
                .or_else(|| self.tickers.lock().get(&order.symbol).map(|t| t.last_price))
                .ok_or_else(|| {
                    ExchangeError::NonRetryable(format!("no fill price for {}", order.symbol))
                })?;

            let quote = fill_price * order.quantity;
            let commission = quote * *self.fee_rate.lock();
            let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);

            self.orders.lock().insert(
                order_id,
                OrderInfo {
                    status: OrderStatus::Filled,
                    executed_qty: order.quantity,
                    cummulative_quote_qty: quote,
                    update_time: 0,
                },
            );

            Ok(OrderAck {
                order_id,
                client_order_id: order.client_order_id.clone(),
                status: OrderStatus::Filled,
                executed_qty: order.quantity,
                cummulative_quote_qty: quote,
                fills: vec![Fill {
                    price: fill_price,
                    qty: order.quantity,
                    commission,
                    commission_asset: "USDT".to_string(),
                }],
            })
        }

        async fn get_order(&self, _symbol: &str, order_id: u64) -> Result<OrderInfo, ExchangeError> {
            self.orders
                .lock()
                .get(&order_id)
                .cloned()
                .ok_or_else(|| ExchangeError::NonRetryable(format!("unknown order {order_id}")))
        }

        async fn cancel_order(&self, _symbol: &str, order_id: u64) -> Result<(), ExchangeError> {
            if let Some(info) = self.orders.lock().get_mut(&order_id) {
                if !info.status.is_terminal() {
                    info.status = OrderStatus::Canceled;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn filters() -> SymbolFilters {
        SymbolFilters {
            symbol: "BTCUSDT".to_string(),
            price_tick: dec!(0.01),
            qty_step: dec!(0.0001),
            min_notional: dec!(10),
            price_precision: 2,
            qty_precision: 4,
        }
    }

    #[test]
    fn snap_price_floors_to_tick() {
        let f = filters();
        assert_eq!(f.snap_price(dec!(50000.019)), dec!(50000.01));
        assert_eq!(f.snap_price(dec!(50000.01)), dec!(50000.01));
    }

    #[test]
    fn snap_qty_floors_to_step() {
        let f = filters();
        assert_eq!(f.snap_qty(dec!(0.10009)), dec!(0.1000));
        assert_eq!(f.snap_qty(dec!(0.1)), dec!(0.1000));
    }

    #[test]
    fn validate_rejects_misaligned_qty() {
        let f = filters();
        let err = f.validate(dec!(50000.00), dec!(0.00005)).unwrap_err();
        assert!(err.contains("step"));
    }

    #[test]
    fn validate_rejects_misaligned_price() {
        let f = filters();
        let err = f.validate(dec!(50000.005), dec!(0.1)).unwrap_err();
        assert!(err.contains("tick"));
    }

    #[test]
    fn validate_rejects_small_notional() {
        let f = filters();
        // 0.0001 * 50000 = 5 < 10 minimum.
        let err = f.validate(dec!(50000.00), dec!(0.0001)).unwrap_err();
        assert!(err.contains("notional"));
    }

    #[test]
    fn validate_accepts_conforming_order() {
        let f = filters();
        assert!(f.validate(dec!(50000.00), dec!(0.1)).is_ok());
    }

    #[test]
    fn ticker_spread_bps() {
        let t = Ticker {
            symbol: "BTCUSDT".into(),
            last_price: dec!(50000),
            bid: dec!(49995),
            ask: dec!(50005),
            quote_volume_24h: dec!(1000000),
        };
        // 10 / 50000 * 10000 = 2 bps
        assert!((t.spread_bps() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn depth_usd_uses_best_level() {
        let d = DepthSnapshot {
            bids: vec![(dec!(100), dec!(50)), (dec!(99), dec!(500))],
            asks: vec![(dec!(101), dec!(40))],
        };
        assert_eq!(d.bid_depth_usd(), dec!(5000));
        assert_eq!(d.ask_depth_usd(), dec!(4040));
    }
}
