// =============================================================================
// Market Scanner — watchlist quality gates and snapshot assembly
// =============================================================================
//
// For each watchlist symbol the scanner fetches the ticker, order book top,
// and analysis-interval candles, then applies the quality gates:
//
//   cooldown   — per-pair signal cooldown has not elapsed
//   min_volume — 24h quote volume below the floor
//   spread     — bid/ask spread too wide (event candidates get the wider cap)
//   depth      — top-of-book depth too thin on either side
//   history    — not enough closed candles for the indicators
//
// Symbols failing any gate are absent from the returned map; each failure
// emits one SKIPPED signal row carrying the gate name. Exchange errors on an
// individual symbol are isolated — log, record the skip, and move on. A
// global outage therefore yields an empty map and no candidates this tick.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::ScannerConfig;
use crate::exchange::Exchange;
use crate::indicators::{atr, bollinger, ema, rsi, vwap};
use crate::market::{Candle, MarketSnapshot};
use crate::state::BotState;
use crate::store::SignalRecord;

/// Depth levels requested from the order book.
const DEPTH_LEVELS: u32 = 5;

/// Bars of the analysis interval folded into the session VWAP.
const SESSION_VWAP_BARS: usize = 96;

/// Bars scanned backwards for an event-grade volume burst.
const EVENT_SCAN_BARS: usize = 12;

/// Bars averaged to establish the burst baseline.
const EVENT_BASELINE_BARS: usize = 20;

/// Result of one scan cycle.
pub struct ScanOutcome {
    pub snapshots: HashMap<String, MarketSnapshot>,
    /// One SKIPPED row per symbol that failed a gate.
    pub skips: Vec<SignalRecord>,
}

/// Scan the watchlist and assemble per-symbol snapshots.
pub async fn scan(
    user_id: &str,
    cfg: &ScannerConfig,
    state: &BotState,
    exchange: &dyn Exchange,
    now: DateTime<Utc>,
) -> ScanOutcome {
    let mut snapshots = HashMap::new();
    let mut skips = Vec::new();

    // ── Cooldown gate (cheapest, no I/O) ─────────────────────────────────
    let mut to_scan = Vec::new();
    for symbol in &cfg.watchlist {
        if state.cooldown_active(symbol, now, cfg.signal_cooldown_min) {
            debug!(symbol, "cooldown active — skipping");
            skips.push(SignalRecord::skipped(
                user_id,
                symbol,
                None,
                Some("cooldown"),
                format!("cooldown ({} min) not elapsed", cfg.signal_cooldown_min),
                now,
            ));
        } else {
            to_scan.push(symbol.clone());
        }
    }

    // ── Remaining symbols scan concurrently (read-only) ──────────────────
    let results = join_all(
        to_scan
            .iter()
            .map(|symbol| scan_symbol(cfg, exchange, symbol, now)),
    )
    .await;

    for (symbol, result) in to_scan.into_iter().zip(results) {
        match result {
            Ok(snapshot) => {
                snapshots.insert(symbol, snapshot);
            }
            Err(skip) => skips.push(SignalRecord::skipped(
                user_id,
                &symbol,
                None,
                Some(skip.gate),
                skip.reason,
                now,
            )),
        }
    }

    debug!(
        passed = snapshots.len(),
        skipped = skips.len(),
        "scan cycle complete"
    );

    ScanOutcome { snapshots, skips }
}

/// A gate failure with its journal annotation.
struct ScanSkip {
    gate: &'static str,
    reason: String,
}

impl ScanSkip {
    fn new(gate: &'static str, reason: impl Into<String>) -> Self {
        Self {
            gate,
            reason: reason.into(),
        }
    }
}

async fn scan_symbol(
    cfg: &ScannerConfig,
    exchange: &dyn Exchange,
    symbol: &str,
    now: DateTime<Utc>,
) -> Result<MarketSnapshot, ScanSkip> {
    // ── Ticker ───────────────────────────────────────────────────────────
    let ticker = exchange.get_ticker(symbol).await.map_err(|e| {
        warn!(symbol, error = %e, "ticker fetch failed — symbol isolated");
        ScanSkip::new("exchange_error", format!("ticker fetch failed: {e}"))
    })?;

    if ticker.quote_volume_24h < cfg.min_volume_usd_24h {
        return Err(ScanSkip::new(
            "min_volume",
            format!(
                "24h volume {} below floor {}",
                ticker.quote_volume_24h, cfg.min_volume_usd_24h
            ),
        ));
    }

    // ── Candles (needed before the spread gate for the event flag) ───────
    let candles = exchange
        .get_klines(symbol, &cfg.analysis_interval, cfg.min_candles.max(100) as u32)
        .await
        .map_err(|e| {
            warn!(symbol, error = %e, "klines fetch failed — symbol isolated");
            ScanSkip::new("exchange_error", format!("klines fetch failed: {e}"))
        })?;

    if candles.len() < cfg.min_candles {
        return Err(ScanSkip::new(
            "history",
            format!(
                "only {} candles on {} (need {})",
                candles.len(),
                cfg.analysis_interval,
                cfg.min_candles
            ),
        ));
    }

    let event_age_min = detect_event_burst(&candles, cfg.event_volume_mult, now);
    let event = event_age_min.is_some();

    // ── Spread gate (event candidates get the wider cap) ─────────────────
    let spread_bps = ticker.spread_bps();
    let spread_cap = if event {
        cfg.max_spread_bps_event
    } else {
        cfg.max_spread_bps
    };
    if spread_bps > spread_cap {
        return Err(ScanSkip::new(
            "spread",
            format!("spread {spread_bps:.1} bps above cap {spread_cap:.1} bps"),
        ));
    }

    // ── Depth gate ───────────────────────────────────────────────────────
    let depth = exchange.get_depth(symbol, DEPTH_LEVELS).await.map_err(|e| {
        warn!(symbol, error = %e, "depth fetch failed — symbol isolated");
        ScanSkip::new("exchange_error", format!("depth fetch failed: {e}"))
    })?;

    let bid_depth = depth.bid_depth_usd();
    let ask_depth = depth.ask_depth_usd();
    if bid_depth.min(ask_depth) < cfg.tob_min_depth_usd {
        return Err(ScanSkip::new(
            "depth",
            format!(
                "top-of-book depth {} below floor {}",
                bid_depth.min(ask_depth),
                cfg.tob_min_depth_usd
            ),
        ));
    }

    // ── Indicators ───────────────────────────────────────────────────────
    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();

    let Some(atr_value) = atr::calculate_atr(&candles, 14) else {
        return Err(ScanSkip::new("indicators", "ATR not computable"));
    };
    let Some(vwap_value) = vwap::calculate_vwap(&candles, SESSION_VWAP_BARS) else {
        return Err(ScanSkip::new("indicators", "VWAP not computable"));
    };
    let Some(rsi_value) = rsi::calculate_rsi(&closes, 14) else {
        return Err(ScanSkip::new("indicators", "RSI not computable"));
    };
    let Some(ema_short) = ema::calculate_ema(&closes, 9) else {
        return Err(ScanSkip::new("indicators", "EMA(9) not computable"));
    };
    let Some(ema_long) = ema::calculate_ema(&closes, 21) else {
        return Err(ScanSkip::new("indicators", "EMA(21) not computable"));
    };
    let bollinger_width = bollinger::calculate_bollinger(&closes, 20, Decimal::TWO)
        .map(|b| b.width)
        .unwrap_or(0.0);

    Ok(MarketSnapshot {
        symbol: symbol.to_string(),
        price: ticker.last_price,
        atr: atr_value,
        vwap: vwap_value,
        rsi: rsi_value,
        ema_short,
        ema_long,
        bollinger_width,
        spread_bps,
        bid_depth_usd: bid_depth,
        ask_depth_usd: ask_depth,
        quote_volume_24h: ticker.quote_volume_24h,
        event,
        event_age_min,
        candles,
        observed_at: now,
    })
}

/// Find the most recent bar whose volume is an event-grade multiple of the
/// trailing baseline. Returns the bar's age in minutes.
fn detect_event_burst(candles: &[Candle], mult: Decimal, now: DateTime<Utc>) -> Option<i64> {
    if candles.len() < EVENT_BASELINE_BARS + 1 {
        return None;
    }

    let newest = candles.len();
    let oldest_checked = newest.saturating_sub(EVENT_SCAN_BARS).max(EVENT_BASELINE_BARS);

    for i in (oldest_checked..newest).rev() {
        let baseline_window = &candles[i - EVENT_BASELINE_BARS..i];
        let baseline = baseline_window.iter().map(|c| c.volume).sum::<Decimal>()
            / Decimal::from(EVENT_BASELINE_BARS as u64);
        if baseline.is_zero() {
            continue;
        }
        if candles[i].volume >= mult * baseline {
            let closed_at = DateTime::from_timestamp_millis(candles[i].close_time)?;
            return Some(now.signed_duration_since(closed_at).num_minutes().max(0));
        }
    }
    None
}
