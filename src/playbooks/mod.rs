// =============================================================================
// Playbook Evaluators — strategy templates A/B/C/D
// =============================================================================
//
// Four independent pure functions from a market snapshot to an optional
// candidate signal:
//
//   A — breakout          (N-bar extreme + volume confirmation)
//   B — VWAP reversion    (deviation from session VWAP, session-capped)
//   C — event burst       (only inside an event window, two-stage scale plan)
//   D — dip               (price stretched below the short MA)
//
// Evaluation runs in the static priority order A > C > B > D; at most one
// candidate per symbol per tick proceeds. Disabled playbooks produce nothing.
// The engine is spot-only, so every candidate opens LONG.
// =============================================================================

pub mod breakout;
pub mod dip;
pub mod event_burst;
pub mod vwap_reversion;

use rust_decimal::Decimal;

use crate::config::BotConfig;
use crate::market::MarketSnapshot;
use crate::state::BotState;
use crate::types::{Playbook, Side};

/// A candidate entry produced by one playbook for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSignal {
    pub symbol: String,
    pub playbook: Playbook,
    pub side: Side,
    /// Entry reference price (the snapshot's last price).
    pub entry: Decimal,
    pub stop: Decimal,
    /// Hard target, for playbooks that take profit at a fixed R multiple.
    pub target: Option<Decimal>,
    /// Event-driven candidates get the relaxed spread/slippage caps.
    pub is_event: bool,
    /// One-line trigger description for the journal.
    pub trigger: String,
}

/// Convert an R multiple into a price distance against the stop distance.
pub(crate) fn r_multiple(stop_distance: Decimal, r: f64) -> Decimal {
    stop_distance * Decimal::from_f64_retain(r).unwrap_or_default()
}

/// Evaluate one playbook against a snapshot.
pub fn evaluate(
    playbook: Playbook,
    cfg: &BotConfig,
    state: &BotState,
    snapshot: &MarketSnapshot,
) -> Option<CandidateSignal> {
    match playbook {
        Playbook::Breakout => breakout::evaluate(cfg, snapshot),
        Playbook::EventBurst => event_burst::evaluate(cfg, snapshot),
        Playbook::VwapReversion => vwap_reversion::evaluate(cfg, state, snapshot),
        Playbook::Dip => dip::evaluate(cfg, snapshot),
    }
}

/// Evaluate all playbooks in priority order; the first to fire wins the
/// symbol for this tick.
pub fn evaluate_all(
    cfg: &BotConfig,
    state: &BotState,
    snapshot: &MarketSnapshot,
) -> Option<CandidateSignal> {
    Playbook::PRIORITY
        .iter()
        .find_map(|pb| evaluate(*pb, cfg, state, snapshot))
}

// =============================================================================
// Shared test fixtures
// =============================================================================
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::market::Candle;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    /// A quiet tape: 60 flat bars at 100 with volume 100.
    pub fn flat_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                Candle::new(
                    i as i64 * 300_000,
                    dec!(100),
                    dec!(101),
                    dec!(99),
                    dec!(100),
                    dec!(100),
                    i as i64 * 300_000 + 299_999,
                )
            })
            .collect()
    }

    pub fn snapshot(symbol: &str, candles: Vec<Candle>) -> MarketSnapshot {
        let price = candles.last().map(|c| c.close).unwrap_or(dec!(100));
        MarketSnapshot {
            symbol: symbol.to_string(),
            price,
            atr: dec!(2),
            vwap: dec!(100),
            rsi: 50.0,
            ema_short: dec!(100),
            ema_long: dec!(100),
            bollinger_width: 0.02,
            spread_bps: 2.0,
            bid_depth_usd: dec!(50000),
            ask_depth_usd: dec!(50000),
            quote_volume_24h: dec!(10000000),
            event: false,
            event_age_min: None,
            candles,
            observed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn state() -> BotState {
        BotState::new(
            dec!(10000),
            dec!(0.006),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
    }

    #[test]
    fn quiet_tape_produces_no_candidate() {
        let cfg = BotConfig::default();
        let snap = snapshot("BTCUSDT", flat_candles(60));
        assert_eq!(evaluate_all(&cfg, &state(), &snap), None);
    }

    #[test]
    fn priority_prefers_breakout_over_event_burst() {
        // Construct a tape that triggers both A (breakout + volume) and C
        // (event window active): A must win the symbol.
        let cfg = BotConfig::default();
        let mut candles = flat_candles(60);
        let last = candles.last_mut().unwrap();
        last.close = dec!(105);
        last.high = dec!(106);
        last.volume = dec!(500);

        let mut snap = snapshot("BTCUSDT", candles);
        snap.price = dec!(105);
        snap.event = true;
        snap.event_age_min = Some(5);

        let candidate = evaluate_all(&cfg, &state(), &snap).unwrap();
        assert_eq!(candidate.playbook, Playbook::Breakout);
    }

    #[test]
    fn disabled_playbooks_produce_nothing() {
        let mut cfg = BotConfig::default();
        cfg.playbook_a.enabled = false;
        cfg.playbook_b.enabled = false;
        cfg.playbook_c.enabled = false;
        cfg.playbook_d.enabled = false;

        let mut candles = flat_candles(60);
        let last = candles.last_mut().unwrap();
        last.close = dec!(105);
        last.volume = dec!(500);
        let mut snap = snapshot("BTCUSDT", candles);
        snap.price = dec!(105);
        snap.event = true;
        snap.event_age_min = Some(1);

        assert_eq!(evaluate_all(&cfg, &state(), &snap), None);
    }

    #[test]
    fn every_candidate_opens_long() {
        let cfg = BotConfig::default();
        let mut candles = flat_candles(60);
        let last = candles.last_mut().unwrap();
        last.close = dec!(105);
        last.volume = dec!(500);
        let mut snap = snapshot("BTCUSDT", candles);
        snap.price = dec!(105);

        let candidate = evaluate_all(&cfg, &state(), &snap).unwrap();
        assert_eq!(candidate.side, Side::Long);
        assert!(candidate.stop < candidate.entry);
    }
}
