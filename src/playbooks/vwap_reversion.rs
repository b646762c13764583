// =============================================================================
// Playbook B — VWAP Mean-Reversion
// =============================================================================
//
// Trigger: price stretched below the session VWAP by at least
// `deviation_atr_mult * ATR` (spot-only, so only the long side of the
// reversion is tradable).
//
// Stop: `stop_atr_mult * ATR` below entry. Target: `target_r` times the stop
// distance above entry. Attempts are capped at `max_trades_per_session` per
// symbol via the Playbook-B counter in BotState; the position manager
// enforces the `time_stop_min` exit.
// =============================================================================

use rust_decimal::Decimal;

use crate::config::BotConfig;
use crate::market::MarketSnapshot;
use crate::state::BotState;
use crate::types::{Playbook, Side};

use super::{r_multiple, CandidateSignal};

pub fn evaluate(
    cfg: &BotConfig,
    state: &BotState,
    snapshot: &MarketSnapshot,
) -> Option<CandidateSignal> {
    let pb = &cfg.playbook_b;
    if !pb.enabled {
        return None;
    }

    // Session cap per symbol.
    let attempts = state.playbook_b_count(&snapshot.symbol);
    if attempts >= pb.max_trades_per_session {
        return None;
    }

    if snapshot.atr <= Decimal::ZERO || snapshot.vwap <= Decimal::ZERO {
        return None;
    }

    let deviation = snapshot.vwap - snapshot.price;
    let required = pb.deviation_atr_mult * snapshot.atr;
    if deviation < required {
        return None;
    }

    let entry = snapshot.price;
    let stop = entry - pb.stop_atr_mult * snapshot.atr;
    let stop_distance = entry - stop;
    let target = entry + r_multiple(stop_distance, pb.target_r);

    Some(CandidateSignal {
        symbol: snapshot.symbol.clone(),
        playbook: Playbook::VwapReversion,
        side: Side::Long,
        entry,
        stop,
        target: Some(target),
        is_event: false,
        trigger: format!(
            "price {} stretched {} below VWAP {} (attempt {}/{})",
            entry,
            deviation,
            snapshot.vwap,
            attempts + 1,
            pb.max_trades_per_session
        ),
    })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
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

    fn stretched_snapshot() -> MarketSnapshot {
        let mut snap = snapshot("ETHUSDT", flat_candles(40));
        // VWAP 100, ATR 2, deviation mult 2.0 => trigger at price <= 96.
        snap.price = dec!(95);
        snap.vwap = dec!(100);
        snap.atr = dec!(2);
        snap
    }

    #[test]
    fn fires_when_stretched_below_vwap() {
        let cfg = BotConfig::default();
        let candidate = evaluate(&cfg, &state(), &stretched_snapshot()).unwrap();
        assert_eq!(candidate.playbook, Playbook::VwapReversion);
        // stop = 95 - 1.0 * 2 = 93; target = 95 + 1.5 * 2 = 98.
        assert_eq!(candidate.stop, dec!(93));
        assert_eq!(candidate.target, Some(dec!(98.0)));
    }

    #[test]
    fn quiet_deviation_does_not_fire() {
        let cfg = BotConfig::default();
        let mut snap = stretched_snapshot();
        snap.price = dec!(97); // only 3 below VWAP, need 4
        assert!(evaluate(&cfg, &state(), &snap).is_none());
    }

    #[test]
    fn session_cap_suppresses_attempts() {
        let cfg = BotConfig::default();
        let mut st = state();
        st.increment_playbook_b("ETHUSDT");
        st.increment_playbook_b("ETHUSDT"); // cap is 2 by default

        assert!(evaluate(&cfg, &st, &stretched_snapshot()).is_none());

        // A different symbol is unaffected.
        let mut other = stretched_snapshot();
        other.symbol = "SOLUSDT".to_string();
        assert!(evaluate(&cfg, &st, &other).is_some());
    }

    #[test]
    fn respects_enable_flag() {
        let mut cfg = BotConfig::default();
        cfg.playbook_b.enabled = false;
        assert!(evaluate(&cfg, &state(), &stretched_snapshot()).is_none());
    }

    #[test]
    fn price_above_vwap_never_fires() {
        // The stretch above VWAP would be a short — spot-only skips it.
        let cfg = BotConfig::default();
        let mut snap = stretched_snapshot();
        snap.price = dec!(105);
        assert!(evaluate(&cfg, &state(), &snap).is_none());
    }
}
