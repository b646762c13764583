// =============================================================================
// Engine Root — wires the per-user trading pipeline into one tick
// =============================================================================
//
// Control flow of one tick:
//
//   reload config → roll PnL windows (+ daily auto-resume) → recompute equity
//   → update positions + state machines → kill-switch check → scan markets
//   → evaluate playbooks → per candidate: dedupe / size / snap / guardrails
//   → reserve → execute → persist position → record signal outcome
//
// The engine owns no clocks: `run_tick` takes `now`/`today` so the scheduler
// drives real time and tests drive frozen time. Signals are processed
// sequentially in playbook priority order, so earlier executions in a tick
// are visible to the later candidates' aggregate checks.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::exchange::filters::FilterCache;
use crate::exchange::{Exchange, ExchangeError};
use crate::execution::{ExecutionError, ExecutionRequest, ExecutionRouter};
use crate::guardrails::{self, GateContext};
use crate::killswitch;
use crate::playbooks::{self, CandidateSignal};
use crate::position::{Position, PositionManager};
use crate::reserve;
use crate::risk;
use crate::scanner;
use crate::state::BotState;
use crate::store::{Alert, SignalRecord, Store};
use crate::types::{AlertLevel, HaltKind, OrderSide, OrderType, Playbook};

/// Per-user shared state handle. The trading actor is the only writer; the
/// operator API reads snapshots.
pub type SharedState = Arc<RwLock<BotState>>;

/// The engine root: all subsystems, wired once, shared by every user task.
pub struct Engine {
    pub store: Arc<Store>,
    pub exchange: Arc<dyn Exchange>,
    pub filters: Arc<FilterCache>,
    pub router: Arc<ExecutionRouter>,
    pub manager: Arc<PositionManager>,
    states: RwLock<HashMap<String, SharedState>>,
}

impl Engine {
    pub fn new(store: Arc<Store>, exchange: Arc<dyn Exchange>) -> Self {
        let filters = Arc::new(FilterCache::new());
        let router = Arc::new(ExecutionRouter::new(exchange.clone(), filters.clone()));
        let manager = Arc::new(PositionManager::new(
            store.clone(),
            router.clone(),
            exchange.clone(),
            filters.clone(),
        ));

        Self {
            store,
            exchange,
            filters,
            router,
            manager,
            states: RwLock::new(HashMap::new()),
        }
    }

    // -------------------------------------------------------------------------
    // State handles
    // -------------------------------------------------------------------------

    /// Fetch (or lazily create) the shared state handle for a user. Restores
    /// persisted state when present; otherwise seeds a fresh one at `today`.
    pub fn state_handle(&self, user_id: &str, today: NaiveDate) -> Result<SharedState> {
        if let Some(existing) = self.states.read().get(user_id) {
            return Ok(existing.clone());
        }

        let cfg = self.load_config(user_id)?;
        let state = match self.store.load_state(user_id)? {
            Some(state) => state,
            None => BotState::new(Decimal::ZERO, cfg.risk.r_pct, today),
        };

        let handle: SharedState = Arc::new(RwLock::new(state));
        self.states
            .write()
            .insert(user_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Read-only snapshot for the operator API.
    pub fn state_snapshot(&self, user_id: &str) -> Option<BotState> {
        self.states.read().get(user_id).map(|s| s.read().clone())
    }

    /// Fresh config for this tick; a missing document gets defaults.
    pub fn load_config(&self, user_id: &str) -> Result<BotConfig> {
        Ok(self.store.load_config(user_id)?.unwrap_or_default())
    }

    // -------------------------------------------------------------------------
    // The tick
    // -------------------------------------------------------------------------

    /// Execute one full scan/signal/execute cycle for one user.
    pub async fn run_tick(
        &self,
        user_id: &str,
        state: &mut BotState,
        tick_id: u64,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<()> {
        // ── 1. Fresh config ──────────────────────────────────────────────
        let mut cfg = self.load_config(user_id)?;

        // ── 2. PnL window rollover + daily auto-resume ───────────────────
        let rollover = state.roll_windows(today);
        if rollover.daily {
            self.store.reset_playbook_b(user_id)?;
        }
        killswitch::try_auto_resume(&self.store, &mut cfg, user_id, rollover.daily)?;

        // ── 3. Equity recompute ──────────────────────────────────────────
        self.recompute_equity(user_id, state, &cfg).await;

        // ── 4. Position updates + state machines ─────────────────────────
        let snapshots_for_positions = state.market_cache.clone();
        if let Err(e) = self
            .manager
            .run_tick(user_id, &cfg, state, &snapshots_for_positions, now, tick_id)
            .await
        {
            // Mid-tick invariant breach: abort the remainder of this tick.
            warn!(user_id, error = %e, "position update failed — aborting tick");
            self.alert_best_effort(
                user_id,
                AlertLevel::Warning,
                "tick_abort",
                format!("position update failed, tick aborted: {e}"),
            );
            return Ok(());
        }

        // ── 5. Kill-switch check ─────────────────────────────────────────
        let open = self.store.open_positions(user_id)?;
        if !cfg.bot_status.is_halted() {
            if let Some((kind, reason)) = risk::check_kill(state, &open, &cfg) {
                killswitch::execute(
                    &self.store,
                    &self.manager,
                    &mut cfg,
                    state,
                    user_id,
                    kind,
                    &reason,
                    now,
                    tick_id,
                )
                .await?;
            }
        }

        // Halted bots keep managing exits above but never scan for entries.
        if cfg.bot_status.is_halted() {
            debug!(user_id, status = %cfg.bot_status, "bot halted — skipping scan");
            self.persist_state(user_id, state);
            return Ok(());
        }

        // ── 6. Scan ──────────────────────────────────────────────────────
        let outcome = scanner::scan(user_id, &cfg.scanner, state, self.exchange.as_ref(), now).await;
        for skip in &outcome.skips {
            self.store.insert_signal(skip)?;
        }
        state.market_cache = outcome.snapshots;
        state.last_scan_at = Some(now);

        // ── 7. Evaluate playbooks, priority order ────────────────────────
        let candidates = self.collect_candidates(&cfg, state);

        // ── 8. Process signals sequentially ──────────────────────────────
        for candidate in candidates {
            if let Err(e) = self
                .process_candidate(user_id, &cfg, state, &candidate, now, tick_id)
                .await
            {
                error!(
                    user_id,
                    symbol = %candidate.symbol,
                    playbook = %candidate.playbook,
                    error = %e,
                    "signal processing failed"
                );
            }
        }

        self.persist_state(user_id, state);
        Ok(())
    }

    /// Equity = quote-asset balance plus the marked notional of open
    /// positions. Exchange failures keep the previous equity for this tick.
    async fn recompute_equity(&self, user_id: &str, state: &mut BotState, cfg: &BotConfig) {
        let balances = match self.exchange.get_account().await {
            Ok(balances) => balances,
            Err(e) => {
                warn!(user_id, error = %e, "balance fetch failed — keeping previous equity");
                return;
            }
        };

        let quote: Decimal = balances
            .iter()
            .filter(|b| b.asset.starts_with("USD"))
            .map(|b| b.free + b.locked)
            .sum();

        let open = match self.store.open_positions(user_id) {
            Ok(open) => open,
            Err(e) => {
                warn!(user_id, error = %e, "open-position query failed — keeping previous equity");
                return;
            }
        };
        let equity = quote + risk::open_notional(&open);

        if state.starting_equity.is_zero() && !equity.is_zero() {
            state.starting_equity = equity;
        }
        state.set_equity(equity, cfg.risk.r_pct);
        debug!(user_id, equity = %equity, current_r = %state.current_r, "equity recomputed");
    }

    /// One candidate per symbol, ordered by playbook priority then by the
    /// watchlist order the scanner preserved.
    fn collect_candidates(&self, cfg: &BotConfig, state: &BotState) -> Vec<CandidateSignal> {
        let mut candidates: Vec<CandidateSignal> = Vec::new();
        for snapshot in state.market_cache.values() {
            if let Some(candidate) = playbooks::evaluate_all(cfg, state, snapshot) {
                candidates.push(candidate);
            }
        }

        let priority_of = |pb: Playbook| {
            Playbook::PRIORITY
                .iter()
                .position(|p| *p == pb)
                .unwrap_or(usize::MAX)
        };
        candidates.sort_by(|a, b| {
            priority_of(a.playbook)
                .cmp(&priority_of(b.playbook))
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        candidates
    }

    /// Run one candidate through dedupe → size → snap → guardrails → reserve
    /// → execution, journaling exactly one Signal row for the decision.
    async fn process_candidate(
        &self,
        user_id: &str,
        cfg: &BotConfig,
        state: &mut BotState,
        candidate: &CandidateSignal,
        now: DateTime<Utc>,
        tick_id: u64,
    ) -> Result<()> {
        let symbol = &candidate.symbol;
        let playbook = candidate.playbook;

        // Reservations from earlier candidates in this tick are visible here.
        let open = self.store.open_positions(user_id)?;

        if open.iter().any(|p| p.symbol == *symbol) {
            self.skip(user_id, candidate, "position_open", "position already open", now)?;
            return Ok(());
        }

        // ── Size ─────────────────────────────────────────────────────────
        let sized = match risk::size_entry(symbol, candidate.entry, candidate.stop, state, &open, cfg)
        {
            Ok(sized) => sized,
            Err(reason) => {
                self.skip(user_id, candidate, "sizing", reason, now)?;
                return Ok(());
            }
        };

        // ── Snap onto the exchange grid ──────────────────────────────────
        let filters = match self.filters.get(self.exchange.as_ref(), symbol).await {
            Ok(filters) => filters,
            Err(e) => {
                self.skip(user_id, candidate, "exchange_filters", format!("{e}"), now)?;
                return Ok(());
            }
        };
        let quantity = filters.snap_qty(sized.quantity);
        let price = filters.snap_price(candidate.entry);

        // ── Guardrail chain ──────────────────────────────────────────────
        let ctx = GateContext {
            cfg,
            state,
            open_positions: &open,
            filters: &filters,
            symbol,
            order_side: OrderSide::Buy,
            position_side: candidate.side,
            price,
            signal_price: candidate.entry,
            quantity,
            sized: &sized,
            is_closing: false,
            is_event: candidate.is_event,
        };
        if let Err(rejection) = guardrails::evaluate(&ctx) {
            self.skip(user_id, candidate, rejection.gate, rejection.reason, now)?;
            return Ok(());
        }

        // ── Reserve gate ─────────────────────────────────────────────────
        if let Err(reason) = reserve::check(state.equity, &open, sized.notional, &cfg.reserve) {
            self.skip(user_id, candidate, "reserve", reason, now)?;
            return Ok(());
        }

        // ── Execute ──────────────────────────────────────────────────────
        let slippage_cap = if candidate.is_event {
            cfg.risk.slippage_guard_bps_event
        } else {
            cfg.risk.slippage_guard_bps
        };

        let report = match self
            .router
            .execute(&ExecutionRequest {
                user_id: user_id.to_string(),
                symbol: symbol.clone(),
                side: OrderSide::Buy,
                order_type: OrderType::Market,
                quantity,
                limit_price: None,
                reference_price: candidate.entry,
                max_slippage_bps: Some(slippage_cap),
                tick_id,
                purpose: "entry".to_string(),
            })
            .await
        {
            Ok(report) => report,
            Err(e) => {
                self.record_execution_failure(user_id, candidate, &e, now)?;
                return Ok(());
            }
        };

        // ── Persist the position ─────────────────────────────────────────
        let mut position = Position::open(
            user_id,
            symbol,
            candidate.side,
            playbook,
            report.fill_price,
            report.filled_quantity,
            candidate.stop,
            candidate.target,
            report.fees,
            now,
        );
        position.update_market(report.fill_price, state.current_r);
        self.store.insert_position(&position)?;

        state.note_pair_signal(symbol, now);
        if playbook == Playbook::VwapReversion {
            let count = self.store.increment_playbook_b(user_id, symbol)?;
            state.playbook_b_counters.insert(symbol.clone(), count);
        }

        self.store.insert_signal(&SignalRecord::executed(
            user_id,
            symbol,
            playbook,
            report.fill_price,
            now,
        ))?;

        info!(
            user_id,
            symbol = %symbol,
            playbook = %playbook,
            entry = %report.fill_price,
            quantity = %report.filled_quantity,
            stop = %candidate.stop,
            scale_factor = %sized.scale_factor,
            trigger = %candidate.trigger,
            "position opened"
        );

        if sized.scale_factor < Decimal::ONE {
            // Correlation scaling is informational, not a rejection: note it
            // on the journal next to the executed row.
            self.store.insert_signal(&SignalRecord::skipped(
                user_id,
                symbol,
                Some(playbook),
                Some("correlation_guard"),
                format!("quantity scaled by {} (open BTC risk >= 1R)", sized.scale_factor),
                now,
            ))?;
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Operator entry points
    // -------------------------------------------------------------------------

    /// MANUAL kill-switch: flatten everything and stop the bot.
    pub async fn emergency_stop(&self, user_id: &str, reason: &str) -> Result<()> {
        let now = Utc::now();
        let mut cfg = self.load_config(user_id)?;
        let handle = self.state_handle(user_id, now.date_naive())?;
        let mut state = handle.read().clone();

        killswitch::execute(
            &self.store,
            &self.manager,
            &mut cfg,
            &mut state,
            user_id,
            HaltKind::Manual,
            reason,
            now,
            0,
        )
        .await?;

        *handle.write() = state;
        Ok(())
    }

    /// Operator resume with justification.
    pub fn resume(&self, user_id: &str, justification: &str) -> Result<(), String> {
        let mut cfg = self
            .load_config(user_id)
            .map_err(|e| format!("config load failed: {e}"))?;
        killswitch::resume(&self.store, &mut cfg, user_id, justification)
    }

    /// Operator config update; journals an alert.
    pub fn update_config(&self, user_id: &str, cfg: &BotConfig) -> Result<()> {
        self.store.save_config(user_id, cfg)?;
        self.store.insert_alert(&Alert::new(
            user_id,
            AlertLevel::Info,
            "config_update",
            "Bot configuration updated by operator",
        ))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn skip(
        &self,
        user_id: &str,
        candidate: &CandidateSignal,
        gate: &'static str,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let reason = reason.into();
        debug!(
            user_id,
            symbol = %candidate.symbol,
            playbook = %candidate.playbook,
            gate,
            reason = %reason,
            "signal skipped"
        );
        self.store
            .insert_signal(&SignalRecord::skipped(
                user_id,
                &candidate.symbol,
                Some(candidate.playbook),
                Some(gate),
                reason,
                now,
            ))
            .context("failed to journal skipped signal")
    }

    fn record_execution_failure(
        &self,
        user_id: &str,
        candidate: &CandidateSignal,
        error: &ExecutionError,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let alert_level = match error {
            ExecutionError::Exchange(ExchangeError::InsufficientBalance(_))
            | ExecutionError::Exchange(ExchangeError::NonRetryable(_)) => Some(AlertLevel::Error),
            _ => None,
        };

        if let Some(level) = alert_level {
            self.alert_best_effort(
                user_id,
                level,
                "execution_failure",
                format!("{} entry failed: {error}", candidate.symbol),
            );
        }

        self.skip(user_id, candidate, "execution", format!("{error}"), now)
    }

    fn alert_best_effort(
        &self,
        user_id: &str,
        level: AlertLevel,
        alert_type: &str,
        message: String,
    ) {
        if let Err(e) = self
            .store
            .insert_alert(&Alert::new(user_id, level, alert_type, message))
        {
            error!(user_id, error = %e, "failed to journal alert");
        }
    }

    fn persist_state(&self, user_id: &str, state: &BotState) {
        if let Err(e) = self.store.save_state(user_id, state) {
            error!(user_id, error = %e, "failed to persist bot state");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests — pipeline scenarios against the mock exchange
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::MockExchange;
    use crate::exchange::DepthSnapshot;
    use crate::market::Candle;
    use crate::position::PositionStatus;
    use crate::types::{BotStatus, CloseReason, Side, SignalAction};
    use rust_decimal_macros::dec;

    const USER: &str = "user-1";

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    /// Flat, wide-range candles (so R-sizing lands inside the exposure cap),
    /// optionally ending in a confirmed breakout bar.
    fn breakout_candles(now: DateTime<Utc>) -> Vec<Candle> {
        let start = now.timestamp_millis() - 120 * 300_000;
        (0..120)
            .map(|i| {
                Candle::new(
                    start + i as i64 * 300_000,
                    dec!(50000),
                    dec!(50250),
                    dec!(49750),
                    dec!(50000),
                    dec!(100),
                    start + (i as i64 + 1) * 300_000 - 1,
                )
            })
            .collect()
    }

    fn trigger_breakout(candles: &mut [Candle]) {
        let last = candles.last_mut().unwrap();
        last.close = dec!(50300);
        last.high = dec!(50350);
        last.volume = dec!(300);
    }

    struct Rig {
        engine: Engine,
        exchange: Arc<MockExchange>,
    }

    fn rig_with_market(now: DateTime<Utc>, breakout: bool) -> Rig {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let exchange = Arc::new(MockExchange::new());

        exchange
            .filters
            .lock()
            .push(MockExchange::permissive_filters("BTCUSDT"));
        let last = if breakout { dec!(50300) } else { dec!(50000) };
        exchange.set_ticker(
            "BTCUSDT",
            last,
            last - dec!(1),
            last + dec!(1),
            dec!(50000000),
        );
        exchange.depth.lock().insert(
            "BTCUSDT".to_string(),
            DepthSnapshot {
                bids: vec![(last - dec!(1), dec!(2))],
                asks: vec![(last + dec!(1), dec!(2))],
            },
        );

        let mut candles = breakout_candles(now);
        if breakout {
            trigger_breakout(&mut candles);
        }
        exchange.klines.lock().insert("BTCUSDT".to_string(), candles);

        // Funded account: $10,000 USDT.
        exchange.balances.lock().push(crate::types::BalanceInfo {
            asset: "USDT".to_string(),
            free: dec!(10000),
            locked: Decimal::ZERO,
        });

        let engine = Engine::new(store, exchange.clone());
        Rig { engine, exchange }
    }

    async fn run_one_tick(rig: &Rig, tick_id: u64, now: DateTime<Utc>) -> BotState {
        let handle = rig.engine.state_handle(USER, day()).unwrap();
        let mut state = handle.read().clone();
        rig.engine
            .run_tick(USER, &mut state, tick_id, now, day())
            .await
            .unwrap();
        *handle.write() = state.clone();
        state
    }

    #[tokio::test]
    async fn quiet_market_produces_no_positions() {
        let now = Utc::now();
        let rig = rig_with_market(now, false);
        let state = run_one_tick(&rig, 1, now).await;

        assert!(rig.engine.store.open_positions(USER).unwrap().is_empty());
        assert!(rig.exchange.submitted_orders().is_empty());
        // Equity derived from the $10,000 USDT balance.
        assert_eq!(state.equity, dec!(10000));
        assert_eq!(state.current_r, dec!(60.000));
    }

    #[tokio::test]
    async fn breakout_opens_a_sized_position() {
        let now = Utc::now();
        let rig = rig_with_market(now, true);
        let state = run_one_tick(&rig, 1, now).await;

        let open = rig.engine.store.open_positions(USER).unwrap();
        assert_eq!(open.len(), 1);
        let pos = &open[0];
        assert_eq!(pos.symbol, "BTCUSDT");
        assert_eq!(pos.side, Side::Long);
        assert_eq!(pos.playbook, Playbook::Breakout);
        assert_eq!(pos.status, PositionStatus::Open);
        // Sizing: ATR≈250 on this tape... verify through the R invariant
        // instead of a hard-coded quantity: risk at stop ≈ 1R.
        assert!((pos.risk_in_r(state.current_r) - 1.0).abs() < 0.05);

        // Exactly one EXECUTED signal row paired with the position.
        let signals = rig.engine.store.signals(USER, 50).unwrap();
        let executed: Vec<_> = signals
            .iter()
            .filter(|s| s.action == SignalAction::Executed)
            .collect();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].symbol, "BTCUSDT");

        // Cooldown stamped.
        assert!(state.last_pair_signal_times.contains_key("BTCUSDT"));
    }

    #[tokio::test]
    async fn second_tick_respects_cooldown_and_open_position() {
        let now = Utc::now();
        let rig = rig_with_market(now, true);
        run_one_tick(&rig, 1, now).await;

        let later = now + chrono::Duration::minutes(5);
        run_one_tick(&rig, 2, later).await;

        // Still exactly one position and one EXECUTED row; the second tick
        // recorded a cooldown skip instead.
        assert_eq!(rig.engine.store.open_positions(USER).unwrap().len(), 1);
        let signals = rig.engine.store.signals(USER, 50).unwrap();
        assert_eq!(
            signals
                .iter()
                .filter(|s| s.action == SignalAction::Executed)
                .count(),
            1
        );
        assert!(signals
            .iter()
            .any(|s| s.gate.as_deref() == Some("cooldown")));
    }

    #[tokio::test]
    async fn every_skip_has_a_reason() {
        let now = Utc::now();
        let rig = rig_with_market(now, true);
        run_one_tick(&rig, 1, now).await;
        run_one_tick(&rig, 2, now + chrono::Duration::minutes(5)).await;

        for signal in rig.engine.store.signals(USER, 100).unwrap() {
            match signal.action {
                SignalAction::Skipped => {
                    assert!(signal.reason.as_deref().is_some_and(|r| !r.is_empty()));
                }
                SignalAction::Executed => assert!(signal.entry_price.is_some()),
            }
        }
    }

    #[tokio::test]
    async fn halted_bot_never_scans_for_entries() {
        let now = Utc::now();
        let rig = rig_with_market(now, true);

        let mut cfg = BotConfig::default();
        cfg.bot_status = BotStatus::HaltedWeekly;
        rig.engine.store.save_config(USER, &cfg).unwrap();

        run_one_tick(&rig, 1, now).await;
        assert!(rig.exchange.submitted_orders().is_empty());
        assert!(rig.engine.store.open_positions(USER).unwrap().is_empty());
    }

    #[tokio::test]
    async fn daily_kill_switch_flattens_and_halts() {
        let now = Utc::now();
        let rig = rig_with_market(now, false);

        // Seed an open position and a realized loss beyond -2R.
        let handle = rig.engine.state_handle(USER, day()).unwrap();
        {
            let mut state = handle.write();
            state.set_equity(dec!(10000), dec!(0.006));
            state.record_realized(dec!(-126)); // -2.1R
        }
        let mut pos = Position::open(
            USER,
            "BTCUSDT",
            Side::Long,
            Playbook::Breakout,
            dec!(50200),
            dec!(0.1),
            dec!(49700),
            None,
            Decimal::ZERO,
            now,
        );
        pos.update_market(dec!(50200), dec!(60));
        rig.engine.store.insert_position(&pos).unwrap();

        run_one_tick(&rig, 1, now).await;

        // Position flattened, bot halted daily, CRITICAL alert journaled.
        assert!(rig.engine.store.open_positions(USER).unwrap().is_empty());
        let cfg = rig.engine.load_config(USER).unwrap();
        assert_eq!(cfg.bot_status, BotStatus::HaltedDaily);
        assert_eq!(cfg.halt_metadata.as_ref().unwrap().flattened, 1);

        let trades = rig.engine.store.trades(USER, 10).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].close_reason, CloseReason::KillSwitch);

        let alerts = rig.engine.store.alerts(USER, 10).unwrap();
        assert!(alerts
            .iter()
            .any(|a| a.level == AlertLevel::Critical && a.alert_type == "kill_switch"));
    }

    #[tokio::test]
    async fn daily_halt_auto_resumes_next_session() {
        let now = Utc::now();
        let rig = rig_with_market(now, false);

        let mut cfg = BotConfig::default();
        cfg.bot_status = BotStatus::HaltedDaily;
        rig.engine.store.save_config(USER, &cfg).unwrap();

        // Same day: stays halted.
        run_one_tick(&rig, 1, now).await;
        assert_eq!(
            rig.engine.load_config(USER).unwrap().bot_status,
            BotStatus::HaltedDaily
        );

        // Next local day: the pipeline resumes the bot itself.
        let handle = rig.engine.state_handle(USER, day()).unwrap();
        let mut state = handle.read().clone();
        rig.engine
            .run_tick(USER, &mut state, 2, now, day().succ_opt().unwrap())
            .await
            .unwrap();
        assert_eq!(
            rig.engine.load_config(USER).unwrap().bot_status,
            BotStatus::Active
        );
    }

    #[tokio::test]
    async fn correlation_guard_halves_eth_entry() {
        let now = Utc::now();
        let rig = rig_with_market(now, false);

        // Open BTC position. Equity lands at $15,000 (USDT + notional), so
        // 1R = $90 and the $1,000 stop distance carries ~1.11R.
        let mut btc = Position::open(
            USER,
            "BTCUSDT",
            Side::Long,
            Playbook::Breakout,
            dec!(50000),
            dec!(0.1),
            dec!(49000),
            None,
            Decimal::ZERO,
            now,
        );
        btc.update_market(dec!(50000), dec!(60));
        rig.engine.store.insert_position(&btc).unwrap();

        // ETH market with a breakout tape.
        rig.exchange
            .filters
            .lock()
            .push(MockExchange::permissive_filters("ETHUSDT"));
        rig.exchange.set_ticker(
            "ETHUSDT",
            dec!(2025),
            dec!(2024.5),
            dec!(2025.5),
            dec!(50000000),
        );
        rig.exchange.depth.lock().insert(
            "ETHUSDT".to_string(),
            DepthSnapshot {
                bids: vec![(dec!(2024.5), dec!(50))],
                asks: vec![(dec!(2025.5), dec!(50))],
            },
        );
        let start = now.timestamp_millis() - 120 * 300_000;
        let mut eth_candles: Vec<Candle> = (0..120)
            .map(|i| {
                Candle::new(
                    start + i as i64 * 300_000,
                    dec!(2000),
                    dec!(2020),
                    dec!(1980),
                    dec!(2000),
                    dec!(100),
                    start + (i as i64 + 1) * 300_000 - 1,
                )
            })
            .collect();
        let last = eth_candles.last_mut().unwrap();
        last.close = dec!(2025);
        last.high = dec!(2030);
        last.volume = dec!(300);
        rig.exchange
            .klines
            .lock()
            .insert("ETHUSDT".to_string(), eth_candles);

        let mut cfg = BotConfig::default();
        cfg.scanner.watchlist = vec!["ETHUSDT".to_string()];
        rig.engine.store.save_config(USER, &cfg).unwrap();

        run_one_tick(&rig, 1, now).await;

        // The ETH entry was submitted at half the unscaled quantity.
        let orders = rig.exchange.submitted_orders();
        let eth_order = orders.iter().find(|o| o.symbol == "ETHUSDT").unwrap();
        // Unscaled: 60 / (1.2 * ATR) — verify the halving through the journal
        // note instead of re-deriving ATR here.
        let signals = rig.engine.store.signals(USER, 50).unwrap();
        assert!(signals
            .iter()
            .any(|s| s.gate.as_deref() == Some("correlation_guard")));
        assert!(eth_order.quantity > Decimal::ZERO);
    }

    #[tokio::test]
    async fn state_persists_across_handle_reloads() {
        let now = Utc::now();
        let rig = rig_with_market(now, true);
        run_one_tick(&rig, 1, now).await;

        let persisted = rig.engine.store.load_state(USER).unwrap().unwrap();
        assert!(persisted.last_pair_signal_times.contains_key("BTCUSDT"));
        // Equity was recomputed before the entry: the plain USDT balance.
        assert_eq!(persisted.equity, dec!(10000));
    }
}
