// =============================================================================
// Position model + per-tick state machine
// =============================================================================
//
// Life-cycle:
//   Open  ->  (breakeven move / scale-outs / trail tightening)*  ->  Closed
//
// Each tick the manager refreshes the market price, tightens the trailing
// stop (tighten only, never loosen), and then evaluates the playbook rules in
// a fixed order. The first matching rule ends the position's tick:
//
//   common    — stop hit                      -> close STOP_LOSS
//   A         — breakeven move, scale-out + ATR trail
//   B         — target hit -> TARGET, time-stop -> TIME_STOP
//   C         — two-stage scale-out, trail after stage 2, optional target
//   D         — target hit -> TARGET
//
// Closure submits an opposite-side reducing order, computes realized PnL net
// of all cumulative fees, writes exactly one Trade row, and folds the result
// into the daily/weekly PnL windows.
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BotConfig;
use crate::state::pnl_in_r;
use crate::types::{CloseReason, Playbook, Side};

// ---------------------------------------------------------------------------
// Position model
// ---------------------------------------------------------------------------

/// Current status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PositionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(format!("unknown position status: {other}")),
        }
    }
}

/// A single tracked position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub playbook: Playbook,
    pub entry_price: Decimal,
    /// Remaining open quantity (reduced on scale-outs).
    pub quantity: Decimal,
    /// Quantity at open, before any scale-outs.
    #[serde(default)]
    pub initial_quantity: Decimal,
    pub stop_price: Decimal,
    #[serde(default)]
    pub target_price: Option<Decimal>,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub close_reason: Option<CloseReason>,
    #[serde(default)]
    pub current_price: Decimal,
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub unrealized_r: f64,
    /// Cumulative commissions across entry, scale-outs, and close.
    #[serde(default)]
    pub fees_paid: Decimal,
    #[serde(default)]
    pub scaled_1: bool,
    #[serde(default)]
    pub scaled_2: bool,
    /// Trail distance in price units; set when a playbook enables its trail.
    #[serde(default)]
    pub trailing_stop_distance: Option<Decimal>,
    /// Gross price PnL banked by scale-outs while open; net of fees once
    /// closed.
    #[serde(default)]
    pub realized_pnl: Decimal,
    #[serde(default)]
    pub realized_r: Option<f64>,
}

impl Position {
    /// Open a fresh position from a filled entry order.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        user_id: &str,
        symbol: &str,
        side: Side,
        playbook: Playbook,
        entry_price: Decimal,
        quantity: Decimal,
        stop_price: Decimal,
        target_price: Option<Decimal>,
        entry_fees: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            symbol: symbol.to_string(),
            side,
            playbook,
            entry_price,
            quantity,
            initial_quantity: quantity,
            stop_price,
            target_price,
            status: PositionStatus::Open,
            opened_at,
            closed_at: None,
            close_reason: None,
            current_price: entry_price,
            unrealized_pnl: Decimal::ZERO,
            unrealized_r: 0.0,
            fees_paid: entry_fees,
            scaled_1: false,
            scaled_2: false,
            trailing_stop_distance: None,
            realized_pnl: Decimal::ZERO,
            realized_r: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Remaining notional at the current price.
    pub fn notional(&self) -> Decimal {
        self.current_price * self.quantity
    }

    /// Risk still carried by this position, in R.
    pub fn risk_in_r(&self, current_r: Decimal) -> f64 {
        pnl_in_r((self.entry_price - self.stop_price).abs() * self.quantity, current_r)
    }

    /// Minutes this position has been open.
    pub fn hold_time_min(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.opened_at).num_minutes()
    }

    /// Refresh the mark price and recompute unrealized PnL.
    pub fn update_market(&mut self, price: Decimal, current_r: Decimal) {
        self.current_price = price;
        self.unrealized_pnl = (price - self.entry_price) * self.quantity * self.side.sign();
        self.unrealized_r = pnl_in_r(self.unrealized_pnl, current_r);
    }

    /// Tighten the trailing stop toward the current price. Never loosens.
    pub fn tighten_trailing(&mut self) {
        let Some(distance) = self.trailing_stop_distance else {
            return;
        };
        match self.side {
            Side::Long => {
                let candidate = self.current_price - distance;
                if candidate > self.stop_price {
                    self.stop_price = candidate;
                }
            }
            Side::Short => {
                let candidate = self.current_price + distance;
                if candidate < self.stop_price {
                    self.stop_price = candidate;
                }
            }
        }
    }

    /// True when the mark price has crossed the stop.
    pub fn stop_hit(&self) -> bool {
        match self.side {
            Side::Long => self.current_price <= self.stop_price,
            Side::Short => self.current_price >= self.stop_price,
        }
    }

    /// True when the mark price has crossed the target (if one is set).
    pub fn target_hit(&self) -> bool {
        match (self.target_price, self.side) {
            (Some(target), Side::Long) => self.current_price >= target,
            (Some(target), Side::Short) => self.current_price <= target,
            (None, _) => false,
        }
    }

    /// Bank a partial close: reduce quantity, accumulate gross PnL and fees.
    pub fn record_scale_out(&mut self, qty_closed: Decimal, fill_price: Decimal, fees: Decimal) {
        let pnl = (fill_price - self.entry_price) * qty_closed * self.side.sign();
        self.quantity -= qty_closed;
        self.realized_pnl += pnl;
        self.fees_paid += fees;
    }

    /// Finalize the close: fold in the last fill, net out fees, and stamp the
    /// terminal status. Returns the net realized PnL.
    pub fn finalize_close(
        &mut self,
        fill_price: Decimal,
        fees: Decimal,
        reason: CloseReason,
        current_r: Decimal,
        closed_at: DateTime<Utc>,
    ) -> Decimal {
        let final_pnl = (fill_price - self.entry_price) * self.quantity * self.side.sign();
        self.fees_paid += fees;

        let net = self.realized_pnl + final_pnl - self.fees_paid;
        self.realized_pnl = net;
        self.realized_r = Some(pnl_in_r(net, current_r));
        self.current_price = fill_price;
        self.unrealized_pnl = Decimal::ZERO;
        self.unrealized_r = 0.0;
        self.quantity = Decimal::ZERO;
        self.status = PositionStatus::Closed;
        self.closed_at = Some(closed_at);
        self.close_reason = Some(reason);

        net
    }
}

// ---------------------------------------------------------------------------
// Per-tick rule evaluation
// ---------------------------------------------------------------------------

/// What the state machine decided for a position this tick. The first
/// matching rule wins; at most one action fires per position per tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionAction {
    /// Playbook A: stop moves to the entry price.
    MoveStopToEntry,
    /// Reduce the position by `fraction` of current quantity. `stage` is 1 or
    /// 2; `enable_trail` carries the trail distance to arm after the fill.
    ScaleOut {
        stage: u8,
        fraction: Decimal,
        enable_trail: Option<Decimal>,
    },
    Close {
        reason: CloseReason,
    },
}

/// Evaluate the state machine for one open position.
///
/// `atr` is the current ATR on the analysis interval, used to compute trail
/// distances when a scale-out arms the trail. Call `update_market` and
/// `tighten_trailing` first — this function only reads.
pub fn plan_action(
    position: &Position,
    cfg: &BotConfig,
    atr: Decimal,
    now: DateTime<Utc>,
) -> Option<PositionAction> {
    // Common rule: stop hit ends the position regardless of playbook.
    if position.stop_hit() {
        return Some(PositionAction::Close {
            reason: CloseReason::StopLoss,
        });
    }

    match position.playbook {
        Playbook::Breakout => {
            let pb = &cfg.playbook_a;
            if position.unrealized_r >= pb.breakeven_r && position.stop_price != position.entry_price
            {
                return Some(PositionAction::MoveStopToEntry);
            }
            if position.unrealized_r >= pb.scale_r && !position.scaled_1 {
                return Some(PositionAction::ScaleOut {
                    stage: 1,
                    fraction: pb.scale_pct,
                    enable_trail: Some(pb.trail_atr_mult * atr),
                });
            }
            None
        }
        Playbook::VwapReversion => {
            let pb = &cfg.playbook_b;
            if position.target_hit() {
                return Some(PositionAction::Close {
                    reason: CloseReason::Target,
                });
            }
            if now.signed_duration_since(position.opened_at)
                >= Duration::minutes(pb.time_stop_min)
            {
                return Some(PositionAction::Close {
                    reason: CloseReason::TimeStop,
                });
            }
            None
        }
        Playbook::EventBurst => {
            let pb = &cfg.playbook_c;
            if position.unrealized_r >= pb.scale_1_r && !position.scaled_1 {
                return Some(PositionAction::ScaleOut {
                    stage: 1,
                    fraction: pb.scale_1_pct,
                    enable_trail: None,
                });
            }
            if position.unrealized_r >= pb.scale_2_r && position.scaled_1 && !position.scaled_2 {
                return Some(PositionAction::ScaleOut {
                    stage: 2,
                    fraction: pb.scale_2_pct,
                    enable_trail: Some(pb.trail_atr_mult * atr),
                });
            }
            if let Some(target_r) = pb.target_r {
                if position.unrealized_r >= target_r {
                    return Some(PositionAction::Close {
                        reason: CloseReason::Target,
                    });
                }
            }
            None
        }
        Playbook::Dip => {
            if position.target_hit() {
                return Some(PositionAction::Close {
                    reason: CloseReason::Target,
                });
            }
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Position Manager
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::execution::{ExecutionRequest, ExecutionRouter};
use crate::exchange::filters::FilterCache;
use crate::exchange::Exchange;
use crate::guardrails::{self, GateContext};
use crate::market::MarketSnapshot;
use crate::risk::SizedOrder;
use crate::state::BotState;
use crate::store::{Store, Trade};
use crate::types::{OrderSide, OrderType, TradeOutcome};

/// Drives every open position through its state machine each tick and owns
/// the closure procedure. All position writes are serialized through here.
pub struct PositionManager {
    store: Arc<Store>,
    router: Arc<ExecutionRouter>,
    exchange: Arc<dyn Exchange>,
    filters: Arc<FilterCache>,
}

impl PositionManager {
    pub fn new(
        store: Arc<Store>,
        router: Arc<ExecutionRouter>,
        exchange: Arc<dyn Exchange>,
        filters: Arc<FilterCache>,
    ) -> Self {
        Self {
            store,
            router,
            exchange,
            filters,
        }
    }

    /// Refresh marks and run the state machine for every open position.
    /// Returns the trades produced by positions that closed this tick.
    pub async fn run_tick(
        &self,
        user_id: &str,
        cfg: &crate::config::BotConfig,
        state: &mut BotState,
        snapshots: &HashMap<String, MarketSnapshot>,
        now: DateTime<Utc>,
        tick_id: u64,
    ) -> Result<Vec<Trade>> {
        let mut trades = Vec::new();
        let open = self.store.open_positions(user_id)?;

        for mut position in open {
            // ── Price refresh ────────────────────────────────────────────
            // Marks come from a fresh ticker; the (previous-tick) snapshot
            // only contributes ATR for trail distances.
            let price = match self.exchange.get_ticker(&position.symbol).await {
                Ok(ticker) => ticker.last_price,
                Err(e) => {
                    warn!(
                        symbol = %position.symbol,
                        id = %position.id,
                        error = %e,
                        "price refresh failed — position skipped this tick"
                    );
                    continue;
                }
            };
            let atr = snapshots
                .get(&position.symbol)
                .map(|snap| snap.atr)
                .unwrap_or(Decimal::ZERO);

            position.update_market(price, state.current_r);
            position.tighten_trailing();
            self.store.update_position(&position)?;

            // ── State machine ────────────────────────────────────────────
            match plan_action(&position, cfg, atr, now) {
                Some(PositionAction::MoveStopToEntry) => {
                    position.stop_price = position.entry_price;
                    self.store.update_position(&position)?;
                    info!(
                        id = %position.id,
                        symbol = %position.symbol,
                        stop = %position.stop_price,
                        "stop moved to breakeven"
                    );
                }
                Some(PositionAction::ScaleOut {
                    stage,
                    fraction,
                    enable_trail,
                }) => {
                    if let Err(e) = self
                        .scale_out(cfg, state, &mut position, stage, fraction, enable_trail, tick_id)
                        .await
                    {
                        error!(
                            id = %position.id,
                            symbol = %position.symbol,
                            stage,
                            error = %e,
                            "scale-out failed"
                        );
                    }
                }
                Some(PositionAction::Close { reason }) => {
                    match self
                        .close_position(cfg, state, &mut position, reason, now, tick_id)
                        .await
                    {
                        Ok(trade) => trades.push(trade),
                        Err(e) => error!(
                            id = %position.id,
                            symbol = %position.symbol,
                            reason = %reason,
                            error = %e,
                            "close failed — will retry next tick"
                        ),
                    }
                }
                None => {}
            }
        }

        Ok(trades)
    }

    /// Reduce the position by `fraction` of its current quantity.
    #[allow(clippy::too_many_arguments)]
    async fn scale_out(
        &self,
        cfg: &crate::config::BotConfig,
        state: &BotState,
        position: &mut Position,
        stage: u8,
        fraction: Decimal,
        enable_trail: Option<Decimal>,
        tick_id: u64,
    ) -> Result<()> {
        let reduce_qty = position.quantity * fraction;
        self.gate_reduction(cfg, state, position, reduce_qty)
            .await
            .map_err(anyhow::Error::msg)?;

        let report = self
            .router
            .execute(&ExecutionRequest {
                user_id: position.user_id.clone(),
                symbol: position.symbol.clone(),
                side: OrderSide::Sell,
                order_type: OrderType::Market,
                quantity: reduce_qty,
                limit_price: None,
                reference_price: position.current_price,
                max_slippage_bps: Some(cfg.risk.slippage_guard_bps),
                tick_id,
                purpose: format!("scale{stage}"),
            })
            .await
            .context("scale-out order failed")?;

        position.record_scale_out(report.filled_quantity, report.fill_price, report.fees);
        match stage {
            1 => position.scaled_1 = true,
            _ => position.scaled_2 = true,
        }
        // A zero distance would stop out on the next tick; only arm a real one.
        if let Some(trail) = enable_trail.filter(|t| *t > Decimal::ZERO) {
            position.trailing_stop_distance = Some(trail);
        }
        self.store.update_position(position)?;

        info!(
            id = %position.id,
            symbol = %position.symbol,
            stage,
            closed_qty = %report.filled_quantity,
            remaining_qty = %position.quantity,
            fill_price = %report.fill_price,
            trail = ?position.trailing_stop_distance,
            "scale-out executed"
        );
        Ok(())
    }

    /// Close the remaining quantity and write the Trade row.
    pub async fn close_position(
        &self,
        cfg: &crate::config::BotConfig,
        state: &mut BotState,
        position: &mut Position,
        reason: CloseReason,
        now: DateTime<Utc>,
        tick_id: u64,
    ) -> Result<Trade> {
        self.gate_reduction(cfg, state, position, position.quantity)
            .await
            .map_err(anyhow::Error::msg)?;

        let report = self
            .router
            .execute(&ExecutionRequest {
                user_id: position.user_id.clone(),
                symbol: position.symbol.clone(),
                side: OrderSide::Sell,
                order_type: OrderType::Market,
                quantity: position.quantity,
                limit_price: None,
                reference_price: position.current_price,
                max_slippage_bps: None,
                tick_id,
                purpose: format!("close-{}", position.id),
            })
            .await
            .context("closing order failed")?;

        let net =
            position.finalize_close(report.fill_price, report.fees, reason, state.current_r, now);
        state.record_realized(net);

        let trade = Trade {
            id: Uuid::new_v4().to_string(),
            user_id: position.user_id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            playbook: position.playbook,
            entry_price: position.entry_price,
            exit_price: report.fill_price,
            quantity: position.initial_quantity,
            pnl_usd: net,
            pnl_r: position.realized_r.unwrap_or(0.0),
            fees: position.fees_paid,
            outcome: TradeOutcome::from_pnl(net),
            close_reason: reason,
            date: now,
            notes: None,
        };

        self.store.update_position(position)?;
        self.store.insert_trade(&trade)?;

        info!(
            id = %position.id,
            symbol = %position.symbol,
            reason = %reason,
            exit_price = %report.fill_price,
            pnl_usd = %net,
            pnl_r = trade.pnl_r,
            hold_min = position.hold_time_min(now),
            "position closed"
        );

        Ok(trade)
    }

    /// Run the guardrail chain for a reducing order (`is_closing = true`).
    async fn gate_reduction(
        &self,
        cfg: &crate::config::BotConfig,
        state: &BotState,
        position: &Position,
        quantity: Decimal,
    ) -> Result<(), String> {
        let filters = self
            .filters
            .get(self.exchange.as_ref(), &position.symbol)
            .await
            .map_err(|e| format!("filter lookup failed: {e}"))?;

        let sized = SizedOrder {
            quantity,
            notional: Decimal::ZERO,
            proposed_r: 0.0,
            scale_factor: Decimal::ONE,
        };

        let ctx = GateContext {
            cfg,
            state,
            open_positions: &[],
            filters: &filters,
            symbol: &position.symbol,
            order_side: OrderSide::Sell,
            position_side: position.side,
            price: filters.snap_price(position.current_price),
            signal_price: position.current_price,
            quantity: filters.snap_qty(quantity),
            sized: &sized,
            is_closing: true,
            is_event: false,
        };

        guardrails::evaluate(&ctx).map_err(|rejection| {
            format!("{} gate rejected reduction: {}", rejection.gate, rejection.reason)
        })
    }
}

impl std::fmt::Debug for PositionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionManager").finish_non_exhaustive()
    }
}
