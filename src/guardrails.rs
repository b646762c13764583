// =============================================================================
// Policy Guardrails — the fixed, ordered pre-trade gate chain
// =============================================================================
//
// Every order passes through the same six gates, cheapest first:
//
//   1. spot_only         — no short opens, no naked sells
//   2. r_clamp           — per-trade risk cap in R
//   3. kill_switch       — halted bots stay halted (sticky)
//   4. exchange_filters  — LOT_SIZE / PRICE_FILTER / MIN_NOTIONAL
//   5. slippage_guard    — drift between signal price and current price
//   6. exposure_limits   — aggregate caps; skipped for closing orders
//
// The chain short-circuits on the first failure; the failing gate's name and
// reason are attached to the skipped Signal row. Exactly one gate may reject.
// =============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::BotConfig;
use crate::exchange::SymbolFilters;
use crate::position::Position;
use crate::risk::{self, SizedOrder};
use crate::state::BotState;
use crate::types::{OrderSide, Side};

/// Everything the gates need to judge one order.
pub struct GateContext<'a> {
    pub cfg: &'a BotConfig,
    pub state: &'a BotState,
    pub open_positions: &'a [Position],
    pub filters: &'a SymbolFilters,
    pub symbol: &'a str,
    pub order_side: OrderSide,
    pub position_side: Side,
    /// Current price at submission time (already snapped to tick).
    pub price: Decimal,
    /// Price when the signal was generated.
    pub signal_price: Decimal,
    /// Order quantity (already snapped to step).
    pub quantity: Decimal,
    pub sized: &'a SizedOrder,
    /// Closing orders reduce risk and bypass the exposure gate.
    pub is_closing: bool,
    /// Event-driven candidates get the relaxed slippage cap.
    pub is_event: bool,
}

/// A gate refusal: which gate fired and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRejection {
    pub gate: &'static str,
    pub reason: String,
}

type Gate = fn(&GateContext) -> Result<(), String>;

/// The chain, in its fixed evaluation order.
const GATES: &[(&str, Gate)] = &[
    ("spot_only", gate_spot_only),
    ("r_clamp", gate_r_clamp),
    ("kill_switch", gate_kill_switch),
    ("exchange_filters", gate_exchange_filters),
    ("slippage_guard", gate_slippage),
    ("exposure_limits", gate_exposure),
];

/// Run the full chain. Short-circuits on the first rejection.
pub fn evaluate(ctx: &GateContext) -> Result<(), GateRejection> {
    for (name, gate) in GATES {
        if let Err(reason) = gate(ctx) {
            return Err(GateRejection { gate: name, reason });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Gate 1 — spot only
// ---------------------------------------------------------------------------

fn gate_spot_only(ctx: &GateContext) -> Result<(), String> {
    if ctx.order_side == OrderSide::Buy && ctx.position_side == Side::Short {
        return Err("short opens are not supported on a spot account".to_string());
    }
    if ctx.order_side == OrderSide::Sell && !ctx.is_closing {
        return Err("SELL orders are only valid as position reductions".to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Gate 2 — per-trade R clamp
// ---------------------------------------------------------------------------

fn gate_r_clamp(ctx: &GateContext) -> Result<(), String> {
    let limit = ctx.cfg.risk.max_r_per_trade;
    if ctx.sized.proposed_r > limit {
        return Err(format!(
            "proposed risk {:.2}R exceeds per-trade clamp {:.2}R",
            ctx.sized.proposed_r, limit
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Gate 3 — kill-switch stickiness
// ---------------------------------------------------------------------------

fn gate_kill_switch(ctx: &GateContext) -> Result<(), String> {
    // Stickiness blocks NEW orders; reducing orders must still go through,
    // not least because the kill-switch flatten itself submits closes while
    // the loss predicate is firing.
    if ctx.is_closing {
        return Ok(());
    }
    if ctx.cfg.bot_status.is_halted() {
        return Err(format!("bot status is {}", ctx.cfg.bot_status));
    }
    // Re-evaluate the kill predicate so a loss that landed mid-tick blocks
    // the remaining signals of the same tick.
    if let Some((kind, reason)) = risk::check_kill(ctx.state, ctx.open_positions, ctx.cfg) {
        return Err(format!("kill-switch pending ({kind}): {reason}"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Gate 4 — exchange filters
// ---------------------------------------------------------------------------

fn gate_exchange_filters(ctx: &GateContext) -> Result<(), String> {
    ctx.filters.validate(ctx.price, ctx.quantity)
}

// ---------------------------------------------------------------------------
// Gate 5 — slippage guard
// ---------------------------------------------------------------------------

fn gate_slippage(ctx: &GateContext) -> Result<(), String> {
    if ctx.signal_price.is_zero() {
        return Err("signal price is zero; cannot compute slippage".to_string());
    }

    let bps = ((ctx.price - ctx.signal_price).abs() / ctx.signal_price
        * Decimal::from(10_000u32))
    .to_f64()
    .unwrap_or(f64::MAX);

    let limit = if ctx.is_event {
        ctx.cfg.risk.slippage_guard_bps_event
    } else {
        ctx.cfg.risk.slippage_guard_bps
    };

    if bps > limit {
        return Err(format!("slippage {bps:.1} bps exceeds {limit:.1} bps limit"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Gate 6 — exposure limits
// ---------------------------------------------------------------------------

fn gate_exposure(ctx: &GateContext) -> Result<(), String> {
    // Closing orders reduce risk and must never be blocked here.
    if ctx.is_closing {
        return Ok(());
    }
    risk::aggregate_check(ctx.sized, ctx.state, ctx.open_positions, ctx.cfg)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::MockExchange;
    use crate::types::BotStatus;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    struct Fixture {
        cfg: BotConfig,
        state: BotState,
        filters: SymbolFilters,
        sized: SizedOrder,
    }

    fn fixture() -> Fixture {
        Fixture {
            cfg: BotConfig::default(),
            state: BotState::new(
                dec!(10000),
                dec!(0.006),
                NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            ),
            filters: MockExchange::permissive_filters("BTCUSDT"),
            sized: SizedOrder {
                quantity: dec!(0.1),
                notional: dec!(5000),
                proposed_r: 1.0,
                scale_factor: Decimal::ONE,
            },
        }
    }

    fn ctx<'a>(f: &'a Fixture, open: &'a [Position]) -> GateContext<'a> {
        GateContext {
            cfg: &f.cfg,
            state: &f.state,
            open_positions: open,
            filters: &f.filters,
            symbol: "BTCUSDT",
            order_side: OrderSide::Buy,
            position_side: Side::Long,
            price: dec!(50000),
            signal_price: dec!(50000),
            quantity: dec!(0.1),
            sized: &f.sized,
            is_closing: false,
            is_event: false,
        }
    }

    #[test]
    fn clean_candidate_passes_all_gates() {
        let f = fixture();
        assert!(evaluate(&ctx(&f, &[])).is_ok());
    }

    #[test]
    fn spot_only_rejects_short_open() {
        let f = fixture();
        let mut c = ctx(&f, &[]);
        c.position_side = Side::Short;
        let rejection = evaluate(&c).unwrap_err();
        assert_eq!(rejection.gate, "spot_only");
    }

    #[test]
    fn spot_only_rejects_naked_sell() {
        let f = fixture();
        let mut c = ctx(&f, &[]);
        c.order_side = OrderSide::Sell;
        let rejection = evaluate(&c).unwrap_err();
        assert_eq!(rejection.gate, "spot_only");
    }

    #[test]
    fn spot_only_allows_closing_sell() {
        let f = fixture();
        let mut c = ctx(&f, &[]);
        c.order_side = OrderSide::Sell;
        c.is_closing = true;
        assert!(evaluate(&c).is_ok());
    }

    #[test]
    fn r_clamp_rejects_oversized_trade() {
        let mut f = fixture();
        f.sized.proposed_r = 1.2;
        let rejection = evaluate(&ctx(&f, &[])).unwrap_err();
        assert_eq!(rejection.gate, "r_clamp");
        assert!(rejection.reason.contains("1.20R"));
    }

    #[test]
    fn kill_switch_is_sticky() {
        let mut f = fixture();
        f.cfg.bot_status = BotStatus::HaltedDaily;
        let rejection = evaluate(&ctx(&f, &[])).unwrap_err();
        assert_eq!(rejection.gate, "kill_switch");
        assert!(rejection.reason.contains("HALTED_DAILY"));
    }

    #[test]
    fn kill_switch_reevaluates_predicate() {
        let mut f = fixture();
        f.state.daily_pnl_r = -2.5; // past the default -2R stop
        let rejection = evaluate(&ctx(&f, &[])).unwrap_err();
        assert_eq!(rejection.gate, "kill_switch");
    }

    #[test]
    fn kill_switch_lets_closing_orders_through() {
        // The flatten-all runs closes while the loss predicate is firing;
        // reducing orders must never be stuck behind the gate.
        let mut f = fixture();
        f.cfg.bot_status = BotStatus::HaltedDaily;
        f.state.daily_pnl_r = -2.5;
        let mut c = ctx(&f, &[]);
        c.order_side = OrderSide::Sell;
        c.is_closing = true;
        assert!(evaluate(&c).is_ok());
    }

    #[test]
    fn exchange_filters_reject_small_notional() {
        let f = fixture();
        let mut c = ctx(&f, &[]);
        // 0.0001 * 50000 = $5, below the $10 minimum.
        c.quantity = dec!(0.0001);
        let rejection = evaluate(&c).unwrap_err();
        assert_eq!(rejection.gate, "exchange_filters");
        assert!(rejection.reason.contains("notional"));
    }

    #[test]
    fn slippage_guard_rejects_drift() {
        // Scenario: signal at 50,000, execution mid at 50,520 with a 100 bps
        // cap => ~104 bps observed.
        let mut f = fixture();
        f.cfg.risk.slippage_guard_bps = 100.0;
        let mut c = ctx(&f, &[]);
        c.price = dec!(50520);
        let rejection = evaluate(&c).unwrap_err();
        assert_eq!(rejection.gate, "slippage_guard");
        assert!(rejection.reason.contains("104"), "reason: {}", rejection.reason);
    }

    #[test]
    fn slippage_guard_event_cap_is_wider() {
        let mut f = fixture();
        f.cfg.risk.slippage_guard_bps = 50.0;
        f.cfg.risk.slippage_guard_bps_event = 150.0;
        let mut c = ctx(&f, &[]);
        c.price = dec!(50520); // ~104 bps
        c.is_event = true;
        assert!(evaluate(&c).is_ok());
    }

    #[test]
    fn exposure_gate_rejects_but_skips_closes() {
        let mut f = fixture();
        f.sized.notional = dec!(6000); // above the 50% / $5,000 cap
        let rejection = evaluate(&ctx(&f, &[])).unwrap_err();
        assert_eq!(rejection.gate, "exposure_limits");

        let mut c = ctx(&f, &[]);
        c.is_closing = true;
        c.order_side = OrderSide::Sell;
        assert!(evaluate(&c).is_ok());
    }

    #[test]
    fn chain_reports_first_failure_only() {
        // Both spot-only and exposure would fail; the chain must report the
        // earlier gate.
        let mut f = fixture();
        f.sized.notional = dec!(60000);
        let mut c = ctx(&f, &[]);
        c.position_side = Side::Short;
        let rejection = evaluate(&c).unwrap_err();
        assert_eq!(rejection.gate, "spot_only");
    }
}
