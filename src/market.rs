// =============================================================================
// Market data primitives — candles and per-symbol scan snapshots
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV candle as returned by the exchange klines endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time (epoch milliseconds).
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Bar close time (epoch milliseconds).
    pub close_time: i64,
}

impl Candle {
    pub fn new(
        open_time: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        close_time: i64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time,
        }
    }
}

/// Everything the playbook evaluators need to know about one symbol,
/// assembled by the scanner after all quality gates pass.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    /// Last traded price.
    pub price: Decimal,
    /// ATR(14) on the analysis interval.
    pub atr: Decimal,
    /// Volume-weighted average price over the recent session window.
    pub vwap: Decimal,
    /// RSI(14) on closes.
    pub rsi: f64,
    /// Short moving averages on closes.
    pub ema_short: Decimal,
    pub ema_long: Decimal,
    /// Bollinger band width as a fraction of the middle band.
    pub bollinger_width: f64,
    /// Current bid/ask spread in basis points.
    pub spread_bps: f64,
    pub bid_depth_usd: Decimal,
    pub ask_depth_usd: Decimal,
    pub quote_volume_24h: Decimal,
    /// Set when a recent bar shows an event-grade volume burst.
    pub event: bool,
    /// Minutes since the burst bar closed, when `event` is set.
    pub event_age_min: Option<i64>,
    /// Closed candles on the analysis interval, oldest first.
    pub candles: Vec<Candle>,
    pub observed_at: DateTime<Utc>,
}
