// =============================================================================
// Execution Router — submits approved orders and validates their fills
// =============================================================================
//
// Responsibilities:
//   1. Snap quantity/price onto the exchange grid via the filter cache.
//   2. Submit with a deterministic client order id bound to
//      (user, symbol, tick, purpose) so retries collapse to one order.
//   3. Await the fill; poll order status until terminal when the ack comes
//      back non-terminal.
//   4. Compute realized slippage against the reference price; cancel the
//      remainder of a partial fill that breaches the slippage limit.
//   5. Report fill price, filled quantity, and fees.
//
// Transient exchange errors are retried a bounded number of times inside the
// call; everything else surfaces immediately and the tick moves on.
// =============================================================================

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::exchange::filters::FilterCache;
use crate::exchange::{Exchange, ExchangeError, NewOrder, OrderAck, OrderStatus};
use crate::types::{OrderSide, OrderType};

/// Bounded retries for transient submission failures.
const MAX_SUBMIT_ATTEMPTS: u32 = 3;

/// Backoff between transient retries.
const RETRY_BACKOFF: Duration = Duration::from_millis(300);

/// Fill polling after a non-terminal acknowledgement.
const MAX_FILL_POLLS: u32 = 10;
const FILL_POLL_DELAY: Duration = Duration::from_millis(500);

/// Execution failure surfaced to the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The order reached a terminal state without filling anything.
    #[error("order not filled: {0}")]
    Unfilled(String),
}

/// One order to route.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub user_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Required for limit orders.
    pub limit_price: Option<Decimal>,
    /// Reference price for realized-slippage computation.
    pub reference_price: Decimal,
    /// Post-fill slippage bound; a breaching partial fill has its remainder
    /// cancelled.
    pub max_slippage_bps: Option<f64>,
    pub tick_id: u64,
    /// "entry", "scale1", "scale2", "close" — part of the idempotency key.
    pub purpose: String,
}

/// Successful execution report.
#[derive(Debug, Clone)]
pub struct FillReport {
    pub fill_price: Decimal,
    pub filled_quantity: Decimal,
    pub fees: Decimal,
    pub slippage_bps: f64,
    pub fully_filled: bool,
}

/// Routes orders through the exchange client with fill validation.
pub struct ExecutionRouter {
    exchange: Arc<dyn Exchange>,
    filters: Arc<FilterCache>,
}

impl ExecutionRouter {
    pub fn new(exchange: Arc<dyn Exchange>, filters: Arc<FilterCache>) -> Self {
        Self { exchange, filters }
    }

    /// Deterministic client order id for `(user, symbol, tick, purpose)`.
    ///
    /// Replays produced by retries carry the same id and collapse to the
    /// first submission's outcome on the exchange.
    pub fn client_order_id(user_id: &str, symbol: &str, tick_id: u64, purpose: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(b":");
        hasher.update(symbol.as_bytes());
        hasher.update(b":");
        hasher.update(tick_id.to_be_bytes());
        hasher.update(b":");
        hasher.update(purpose.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("bx{}", &digest[..30])
    }

    /// Execute one approved order and return the validated fill.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<FillReport, ExecutionError> {
        // ── 1. Snap onto the exchange grid ───────────────────────────────
        let filters = self.filters.get(self.exchange.as_ref(), &request.symbol).await?;
        let quantity = filters.snap_qty(request.quantity);
        let limit_price = request.limit_price.map(|p| filters.snap_price(p));

        if quantity.is_zero() {
            return Err(ExecutionError::Unfilled(format!(
                "quantity {} snapped to zero on step {}",
                request.quantity, filters.qty_step
            )));
        }

        let order = NewOrder {
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity,
            price: limit_price,
            client_order_id: Self::client_order_id(
                &request.user_id,
                &request.symbol,
                request.tick_id,
                &request.purpose,
            ),
        };

        // ── 2. Submit with bounded retry on transient failures ───────────
        let ack = self.submit_with_retry(&order).await?;
        let exchange_order_id = ack.order_id;

        // ── 3. Await a terminal state ────────────────────────────────────
        let (status, executed_qty, quote_qty, fees) = self.await_terminal(&order, ack).await?;

        if executed_qty.is_zero() {
            return Err(ExecutionError::Unfilled(format!(
                "order reached {status:?} with nothing filled"
            )));
        }

        let fill_price = quote_qty / executed_qty;

        // ── 4. Realized slippage ─────────────────────────────────────────
        let slippage_bps = if request.reference_price.is_zero() {
            0.0
        } else {
            ((fill_price - request.reference_price).abs() / request.reference_price
                * Decimal::from(10_000u32))
            .to_f64()
            .unwrap_or(f64::MAX)
        };

        let mut fully_filled = status == OrderStatus::Filled;

        if let Some(limit) = request.max_slippage_bps {
            if !fully_filled && slippage_bps > limit {
                warn!(
                    symbol = %request.symbol,
                    slippage_bps,
                    limit,
                    "partial fill breached slippage limit — cancelling remainder"
                );
                self.exchange
                    .cancel_order(&request.symbol, exchange_order_id)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "failed to cancel remainder after slippage breach")
                    });
                fully_filled = false;
            }
        }

        info!(
            symbol = %request.symbol,
            side = %request.side,
            purpose = %request.purpose,
            fill_price = %fill_price,
            filled_quantity = %executed_qty,
            fees = %fees,
            slippage_bps,
            "order executed"
        );

        Ok(FillReport {
            fill_price,
            filled_quantity: executed_qty,
            fees,
            slippage_bps,
            fully_filled,
        })
    }

    async fn submit_with_retry(&self, order: &NewOrder) -> Result<OrderAck, ExecutionError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.exchange.submit_order(order).await {
                Ok(ack) => return Ok(ack),
                Err(e) if e.is_transient() && attempt < MAX_SUBMIT_ATTEMPTS => {
                    warn!(
                        symbol = %order.symbol,
                        attempt,
                        error = %e,
                        "transient submit failure — retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Resolve the order to a terminal state, polling when the ack is still
    /// working. Returns (status, executed qty, cumulative quote qty, fees).
    async fn await_terminal(
        &self,
        order: &NewOrder,
        ack: OrderAck,
    ) -> Result<(OrderStatus, Decimal, Decimal, Decimal), ExecutionError> {
        let fees = fees_from_ack(&ack);

        if ack.status.is_terminal() {
            return Ok((ack.status, ack.executed_qty, ack.cummulative_quote_qty, fees));
        }

        debug!(
            symbol = %order.symbol,
            order_id = ack.order_id,
            status = ?ack.status,
            "ack not terminal — polling order status"
        );

        let mut polls = 0;
        loop {
            polls += 1;
            tokio::time::sleep(FILL_POLL_DELAY).await;

            let info = self.exchange.get_order(&order.symbol, ack.order_id).await?;
            if info.status.is_terminal() {
                return Ok((info.status, info.executed_qty, info.cummulative_quote_qty, fees));
            }
            if polls >= MAX_FILL_POLLS {
                // Give up on waiting; report what has filled so far.
                warn!(
                    symbol = %order.symbol,
                    order_id = ack.order_id,
                    status = ?info.status,
                    "order still working after poll budget"
                );
                return Ok((info.status, info.executed_qty, info.cummulative_quote_qty, fees));
            }
        }
    }
}

/// Total commission across an ack's fills, expressed in quote currency.
fn fees_from_ack(ack: &OrderAck) -> Decimal {
    ack.fills
        .iter()
        .map(|f| {
            if f.commission_asset.starts_with("USD") {
                f.commission
            } else {
                // Base-asset commission: convert at the fill price.
                f.commission * f.price
            }
        })
        .sum()
}

impl std::fmt::Debug for ExecutionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRouter").finish_non_exhaustive()
    }
}
