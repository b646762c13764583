// =============================================================================
// Reserve Manager — available-capital gate and reserve floor
// =============================================================================
//
// A slice of equity is never deployed. Before any entry executes:
//
//   available = equity - Σ(open position notionals)
//   require     available >= proposed_notional + floor_pct * equity
//
// Rejections carry the shortfall so the skipped Signal row explains itself.
// =============================================================================

use rust_decimal::Decimal;

use crate::config::ReserveConfig;
use crate::position::Position;
use crate::risk::open_notional;

/// Capital not currently tied up in open positions.
pub fn available_capital(equity: Decimal, open_positions: &[Position]) -> Decimal {
    equity - open_notional(open_positions)
}

/// Check that the proposed entry leaves the reserve floor intact.
pub fn check(
    equity: Decimal,
    open_positions: &[Position],
    proposed_notional: Decimal,
    cfg: &ReserveConfig,
) -> Result<(), String> {
    let available = available_capital(equity, open_positions);
    let floor = cfg.floor_pct * equity;
    let required = proposed_notional + floor;

    if available < required {
        return Err(format!(
            "available capital {available} below required {required} \
             (proposed {proposed_notional} + reserve floor {floor})"
        ));
    }
    Ok(())
}
