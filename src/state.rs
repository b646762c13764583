// =============================================================================
// Bot State — mutable per-tick state for one trading user
// =============================================================================
//
// Owned exclusively by the user's trading actor: all mutation happens inside
// the tick, other subsystems read snapshots. Holds the R bookkeeping, the
// daily/weekly PnL windows, per-pair cooldown stamps, and the Playbook-B
// session counters.
//
// Invariants:
//   - current_r == equity * risk.r_pct after every equity update.
//   - Crossing session_start_date zeroes the daily window and B counters.
//   - Crossing week_start_date zeroes the weekly window.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::market::MarketSnapshot;

/// Which PnL windows a rollover crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rollover {
    pub daily: bool,
    pub weekly: bool,
}

/// Mutable per-user trading state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub is_running: bool,

    /// Equity when the engine was first started for this user.
    pub starting_equity: Decimal,
    /// Latest equity: balances plus unrealized PnL.
    pub equity: Decimal,
    /// Currency value of 1R. Always `equity * r_pct`.
    pub current_r: Decimal,

    pub daily_pnl_usd: Decimal,
    pub daily_pnl_r: f64,
    pub weekly_pnl_usd: Decimal,
    pub weekly_pnl_r: f64,

    /// Local-midnight boundary of the current session.
    pub session_start_date: NaiveDate,
    /// Sunday-anchored local-midnight boundary of the current week.
    pub week_start_date: NaiveDate,

    #[serde(default)]
    pub last_scan_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_signal_at: Option<DateTime<Utc>>,

    /// Per-pair cooldown stamps.
    #[serde(default)]
    pub last_pair_signal_times: HashMap<String, DateTime<Utc>>,

    /// Playbook-B attempts this session, per symbol.
    #[serde(default)]
    pub playbook_b_counters: HashMap<String, u32>,

    /// Scan-cycle snapshot cache. Rebuilt every tick; never persisted.
    #[serde(skip)]
    pub market_cache: HashMap<String, MarketSnapshot>,
}

impl BotState {
    /// Fresh state anchored at `today`.
    pub fn new(starting_equity: Decimal, r_pct: Decimal, today: NaiveDate) -> Self {
        Self {
            is_running: false,
            starting_equity,
            equity: starting_equity,
            current_r: starting_equity * r_pct,
            daily_pnl_usd: Decimal::ZERO,
            daily_pnl_r: 0.0,
            weekly_pnl_usd: Decimal::ZERO,
            weekly_pnl_r: 0.0,
            session_start_date: today,
            week_start_date: week_start_for(today),
            last_scan_at: None,
            last_signal_at: None,
            last_pair_signal_times: HashMap::new(),
            playbook_b_counters: HashMap::new(),
            market_cache: HashMap::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Equity / R
    // -------------------------------------------------------------------------

    /// Update equity and re-derive `current_r` from the configured R fraction.
    pub fn set_equity(&mut self, equity: Decimal, r_pct: Decimal) {
        self.equity = equity;
        self.current_r = equity * r_pct;
    }

    // -------------------------------------------------------------------------
    // PnL windows
    // -------------------------------------------------------------------------

    /// Roll the daily/weekly windows if `today` has crossed a boundary.
    ///
    /// Crossing the session boundary zeroes the daily PnL fields and the
    /// Playbook-B counters; crossing the week boundary zeroes the weekly PnL.
    pub fn roll_windows(&mut self, today: NaiveDate) -> Rollover {
        let mut rolled = Rollover::default();

        if today > self.session_start_date {
            info!(
                old = %self.session_start_date,
                new = %today,
                "session boundary crossed — daily window reset"
            );
            self.daily_pnl_usd = Decimal::ZERO;
            self.daily_pnl_r = 0.0;
            self.playbook_b_counters.clear();
            self.session_start_date = today;
            rolled.daily = true;
        }

        let week_start = week_start_for(today);
        if week_start > self.week_start_date {
            info!(
                old = %self.week_start_date,
                new = %week_start,
                "week boundary crossed — weekly window reset"
            );
            self.weekly_pnl_usd = Decimal::ZERO;
            self.weekly_pnl_r = 0.0;
            self.week_start_date = week_start;
            rolled.weekly = true;
        }

        rolled
    }

    /// Fold a realized trade PnL into both windows.
    pub fn record_realized(&mut self, pnl_usd: Decimal) {
        self.daily_pnl_usd += pnl_usd;
        self.weekly_pnl_usd += pnl_usd;

        let r = pnl_in_r(pnl_usd, self.current_r);
        self.daily_pnl_r += r;
        self.weekly_pnl_r += r;
    }

    // -------------------------------------------------------------------------
    // Cooldowns
    // -------------------------------------------------------------------------

    /// True if the per-pair cooldown has not yet elapsed.
    pub fn cooldown_active(&self, symbol: &str, now: DateTime<Utc>, cooldown_min: i64) -> bool {
        match self.last_pair_signal_times.get(symbol) {
            Some(last) => now.signed_duration_since(*last) < Duration::minutes(cooldown_min),
            None => false,
        }
    }

    /// Stamp a signal for cooldown purposes.
    pub fn note_pair_signal(&mut self, symbol: &str, now: DateTime<Utc>) {
        self.last_pair_signal_times.insert(symbol.to_string(), now);
        self.last_signal_at = Some(now);
    }

    // -------------------------------------------------------------------------
    // Playbook-B session counters
    // -------------------------------------------------------------------------

    pub fn playbook_b_count(&self, symbol: &str) -> u32 {
        self.playbook_b_counters.get(symbol).copied().unwrap_or(0)
    }

    pub fn increment_playbook_b(&mut self, symbol: &str) -> u32 {
        let count = self.playbook_b_counters.entry(symbol.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

/// Express a USD PnL in R units against the given 1R value.
pub fn pnl_in_r(pnl_usd: Decimal, current_r: Decimal) -> f64 {
    if current_r.is_zero() {
        return 0.0;
    }
    (pnl_usd / current_r).to_f64().unwrap_or(0.0)
}

/// The Sunday on or before `date`.
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    let back = date.weekday().num_days_from_sunday() as i64;
    date - Duration::days(back)
}
