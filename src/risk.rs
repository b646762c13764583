// =============================================================================
// Risk Engine — R-denominated sizing, aggregate caps, and kill predicates
// =============================================================================
//
// Everything here is a pure function over the tick's snapshot of BotState and
// the open-position list: the per-user actor owns the state, so no interior
// locking is needed.
//
//   - R-sizing:       quantity = current_r / |entry - stop|
//   - Aggregate caps: open R, position count, exposure
//   - Correlation:    halve alt sizing while an open BTC position carries >= 1R
//   - Kill:           daily/weekly PnL in R at or below the stop (inclusive)
// =============================================================================

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::BotConfig;
use crate::position::Position;
use crate::state::{pnl_in_r, BotState};
use crate::types::HaltKind;

/// Quantity applied to correlated alt candidates while BTC risk is elevated.
const CORRELATION_SCALE: Decimal = dec!(0.5);

/// Open BTC risk (in R) at or above which the correlation guard engages.
const CORRELATION_BTC_RISK_R: f64 = 1.0;

/// A candidate sized and ready for the guardrail chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedOrder {
    pub quantity: Decimal,
    /// Notional at the entry price.
    pub notional: Decimal,
    /// Risk carried by this order, in R (after any correlation scaling).
    pub proposed_r: f64,
    /// 1 normally; 0.5 when the correlation guard engaged.
    pub scale_factor: Decimal,
}

// ---------------------------------------------------------------------------
// Sizing
// ---------------------------------------------------------------------------

/// Size an entry so that a stop-out loses exactly `proposed_r` R.
///
/// `|entry - stop| == 0` is a hard error: the position would be unsizable.
/// When the correlation guard is enabled and an open BTC position carries at
/// least 1R of risk, non-BTC candidates are halved rather than rejected.
pub fn size_entry(
    symbol: &str,
    entry: Decimal,
    stop: Decimal,
    state: &BotState,
    open_positions: &[Position],
    cfg: &BotConfig,
) -> Result<SizedOrder, String> {
    let stop_distance = (entry - stop).abs();
    if stop_distance.is_zero() {
        return Err("stop distance is zero; candidate is unsizable".to_string());
    }
    if state.current_r <= Decimal::ZERO {
        return Err(format!("current R is not positive: {}", state.current_r));
    }

    let mut quantity = state.current_r / stop_distance;
    let mut scale_factor = Decimal::ONE;

    if cfg.risk.correlation_guard && !symbol.starts_with("BTC") {
        let btc_risk: f64 = open_positions
            .iter()
            .filter(|p| p.is_open() && p.symbol.starts_with("BTC"))
            .map(|p| p.risk_in_r(state.current_r))
            .sum();
        if btc_risk >= CORRELATION_BTC_RISK_R {
            quantity *= CORRELATION_SCALE;
            scale_factor = CORRELATION_SCALE;
        }
    }

    let proposed_r = pnl_in_r(stop_distance * quantity, state.current_r);

    Ok(SizedOrder {
        quantity,
        notional: quantity * entry,
        proposed_r,
        scale_factor,
    })
}

// ---------------------------------------------------------------------------
// Aggregate checks
// ---------------------------------------------------------------------------

/// Sum of risk still carried by the user's open positions, in R.
pub fn open_risk_r(open_positions: &[Position], current_r: Decimal) -> f64 {
    open_positions
        .iter()
        .filter(|p| p.is_open())
        .map(|p| p.risk_in_r(current_r))
        .sum()
}

/// Sum of open-position notional at current marks.
pub fn open_notional(open_positions: &[Position]) -> Decimal {
    open_positions
        .iter()
        .filter(|p| p.is_open())
        .map(|p| p.notional())
        .sum()
}

/// Check the aggregate limits a new entry must fit inside.
pub fn aggregate_check(
    sized: &SizedOrder,
    state: &BotState,
    open_positions: &[Position],
    cfg: &BotConfig,
) -> Result<(), String> {
    let open_count = open_positions.iter().filter(|p| p.is_open()).count() as u32;
    if open_count >= cfg.risk.max_positions {
        return Err(format!(
            "position cap reached: {open_count} open (limit {})",
            cfg.risk.max_positions
        ));
    }

    let sum_open_r = open_risk_r(open_positions, state.current_r);
    if sum_open_r + sized.proposed_r > cfg.risk.max_open_r {
        return Err(format!(
            "aggregate open risk {:.2}R + proposed {:.2}R exceeds limit {:.2}R",
            sum_open_r, sized.proposed_r, cfg.risk.max_open_r
        ));
    }

    let exposure_cap = state.equity * cfg.risk.max_exposure_pct;
    let total_notional = open_notional(open_positions) + sized.notional;
    if total_notional > exposure_cap {
        return Err(format!(
            "exposure {total_notional} exceeds cap {exposure_cap} ({}% of equity)",
            cfg.risk.max_exposure_pct * Decimal::ONE_HUNDRED
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Kill predicates
// ---------------------------------------------------------------------------

/// Evaluate the daily/weekly loss stops against realized plus unrealized
/// PnL. Inclusive: landing exactly on the stop trips it. Daily is checked
/// first.
pub fn check_kill(
    state: &BotState,
    open_positions: &[Position],
    cfg: &BotConfig,
) -> Option<(HaltKind, String)> {
    let unrealized_r: f64 = open_positions
        .iter()
        .filter(|p| p.is_open())
        .map(|p| p.unrealized_r)
        .sum();

    let daily_r = state.daily_pnl_r + unrealized_r;
    if daily_r <= cfg.risk.daily_stop_r {
        return Some((
            HaltKind::Daily,
            format!(
                "Daily loss limit reached: {:.2}R (limit {:.2}R)",
                daily_r, cfg.risk.daily_stop_r
            ),
        ));
    }

    let weekly_r = state.weekly_pnl_r + unrealized_r;
    if weekly_r <= cfg.risk.weekly_stop_r {
        return Some((
            HaltKind::Weekly,
            format!(
                "Weekly loss limit reached: {:.2}R (limit {:.2}R)",
                weekly_r, cfg.risk.weekly_stop_r
            ),
        ));
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Playbook, Side};
    use chrono::{NaiveDate, Utc};

    fn state() -> BotState {
        // equity $10,000 at R_pct 0.006 => 1R = $60.
        BotState::new(
            dec!(10000),
            dec!(0.006),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
    }

    fn cfg() -> BotConfig {
        BotConfig::default()
    }

    fn open_position(symbol: &str, entry: Decimal, stop: Decimal, qty: Decimal) -> Position {
        let mut pos = Position::open(
            "u1",
            symbol,
            Side::Long,
            Playbook::Breakout,
            entry,
            qty,
            stop,
            None,
            Decimal::ZERO,
            Utc::now(),
        );
        pos.update_market(entry, dec!(60));
        pos
    }

    #[test]
    fn r_sizing_matches_walkthrough() {
        // entry 50_000, stop 49_400 => $600 stop distance, 1R = $60 => 0.1.
        let sized = size_entry(
            "BTCUSDT",
            dec!(50000),
            dec!(49400),
            &state(),
            &[],
            &cfg(),
        )
        .unwrap();
        assert_eq!(sized.quantity, dec!(0.1));
        assert_eq!(sized.notional, dec!(5000.0));
        assert!((sized.proposed_r - 1.0).abs() < 1e-9);
        assert_eq!(sized.scale_factor, Decimal::ONE);
    }

    #[test]
    fn zero_stop_distance_is_hard_error() {
        let err =
            size_entry("BTCUSDT", dec!(50000), dec!(50000), &state(), &[], &cfg()).unwrap_err();
        assert!(err.contains("zero"));
    }

    #[test]
    fn correlation_guard_halves_alt_sizing() {
        // Open BTC position carrying 1.1R: |50000-49340|*0.1 = $66 = 1.1R.
        let btc = open_position("BTCUSDT", dec!(50000), dec!(49340), dec!(0.1));

        let sized = size_entry(
            "ETHUSDT",
            dec!(2000),
            dec!(1970),
            &state(),
            &[btc],
            &cfg(),
        )
        .unwrap();
        // Unscaled: 60/30 = 2; halved to 1.
        assert_eq!(sized.quantity, dec!(1.0));
        assert_eq!(sized.scale_factor, dec!(0.5));
        assert!((sized.proposed_r - 0.5).abs() < 1e-9);
    }

    #[test]
    fn correlation_guard_skips_btc_candidates() {
        let btc = open_position("BTCUSDT", dec!(50000), dec!(49340), dec!(0.1));
        let sized = size_entry(
            "BTCUSDT",
            dec!(50000),
            dec!(49400),
            &state(),
            &[btc],
            &cfg(),
        )
        .unwrap();
        assert_eq!(sized.scale_factor, Decimal::ONE);
    }

    #[test]
    fn correlation_guard_respects_config_flag() {
        let btc = open_position("BTCUSDT", dec!(50000), dec!(49340), dec!(0.1));
        let mut cfg = cfg();
        cfg.risk.correlation_guard = false;
        let sized = size_entry("ETHUSDT", dec!(2000), dec!(1970), &state(), &[btc], &cfg).unwrap();
        assert_eq!(sized.scale_factor, Decimal::ONE);
    }

    #[test]
    fn aggregate_rejects_position_cap() {
        let mut cfg = cfg();
        cfg.risk.max_positions = 1;
        let open = vec![open_position("BTCUSDT", dec!(50000), dec!(49400), dec!(0.1))];
        let sized = size_entry("ETHUSDT", dec!(2000), dec!(1970), &state(), &open, &cfg).unwrap();
        let err = aggregate_check(&sized, &state(), &open, &cfg).unwrap_err();
        assert!(err.contains("position cap"));
    }

    #[test]
    fn aggregate_rejects_open_r_limit() {
        let mut cfg = cfg();
        cfg.risk.max_open_r = 1.5;
        // Open position carries 1R; proposed carries 1R => 2R > 1.5R.
        let open = vec![open_position("BTCUSDT", dec!(50000), dec!(49400), dec!(0.1))];
        let sized = SizedOrder {
            quantity: dec!(2),
            notional: dec!(100),
            proposed_r: 1.0,
            scale_factor: Decimal::ONE,
        };
        let err = aggregate_check(&sized, &state(), &open, &cfg).unwrap_err();
        assert!(err.contains("open risk"));
    }

    #[test]
    fn aggregate_rejects_exposure_cap() {
        let cfg = cfg();
        // Cap is 50% of $10,000 = $5,000; propose $5,001 of notional.
        let sized = SizedOrder {
            quantity: dec!(1),
            notional: dec!(5001),
            proposed_r: 0.5,
            scale_factor: Decimal::ONE,
        };
        let err = aggregate_check(&sized, &state(), &[], &cfg).unwrap_err();
        assert!(err.contains("exposure"));
    }

    #[test]
    fn aggregate_accepts_within_limits() {
        let cfg = cfg();
        let open = vec![open_position("BTCUSDT", dec!(50000), dec!(49400), dec!(0.01))];
        let sized = SizedOrder {
            quantity: dec!(0.5),
            notional: dec!(1000),
            proposed_r: 1.0,
            scale_factor: Decimal::ONE,
        };
        assert!(aggregate_check(&sized, &state(), &open, &cfg).is_ok());
    }

    #[test]
    fn kill_daily_is_inclusive() {
        let mut st = state();
        st.daily_pnl_r = -2.0; // exactly at the default stop
        let (kind, reason) = check_kill(&st, &[], &cfg()).unwrap();
        assert_eq!(kind, HaltKind::Daily);
        assert!(reason.contains("Daily loss limit"));
    }

    #[test]
    fn kill_counts_unrealized_losses() {
        // Realized -1.2R plus an open position marked at -0.85R => -2.05R.
        let mut st = state();
        st.daily_pnl_r = -1.2;
        let mut pos = open_position("BTCUSDT", dec!(50000), dec!(49400), dec!(0.1));
        pos.update_market(dec!(49490), dec!(60)); // -$51 = -0.85R
        let (kind, reason) = check_kill(&st, &[pos], &cfg()).unwrap();
        assert_eq!(kind, HaltKind::Daily);
        assert!(reason.contains("-2.05R"));
    }

    #[test]
    fn kill_weekly_triggers_when_daily_clear() {
        let mut st = state();
        st.daily_pnl_r = -1.0;
        st.weekly_pnl_r = -5.2;
        let (kind, _) = check_kill(&st, &[], &cfg()).unwrap();
        assert_eq!(kind, HaltKind::Weekly);
    }

    #[test]
    fn kill_clear_above_stops() {
        let mut st = state();
        st.daily_pnl_r = -1.99;
        st.weekly_pnl_r = -4.99;
        assert!(check_kill(&st, &[], &cfg()).is_none());
    }
}
