// =============================================================================
// Store — SQLite persistence for positions, trades, signals, and alerts
// =============================================================================
//
// WAL mode for concurrent reads during writes; all access goes through a
// `parking_lot::Mutex<Connection>` so statement execution is serialized.
// Single-statement writes are transactional by construction.
//
// Decimals are stored as TEXT to preserve exact precision; timestamps as
// RFC 3339 TEXT. The map-valued BotState fields (per-pair signal stamps,
// Playbook-B counters) live in their own tables with per-key UPSERTs so
// concurrent admin writes cannot lose counter increments.
// =============================================================================

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BotConfig;
use crate::position::{Position, PositionStatus};
use crate::state::BotState;
use crate::types::{AlertLevel, CloseReason, Playbook, Side, SignalAction, TradeOutcome};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Immutable append-only record of a closed position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub playbook: Playbook,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub pnl_usd: Decimal,
    pub pnl_r: f64,
    pub fees: Decimal,
    pub outcome: TradeOutcome,
    pub close_reason: CloseReason,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Record of one scan-cycle decision for a (symbol, playbook).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    #[serde(default)]
    pub playbook: Option<Playbook>,
    pub action: SignalAction,
    #[serde(default)]
    pub reason: Option<String>,
    /// Name of the guardrail gate that rejected the signal, if any.
    #[serde(default)]
    pub gate: Option<String>,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    pub at: DateTime<Utc>,
}

impl SignalRecord {
    pub fn executed(
        user_id: &str,
        symbol: &str,
        playbook: Playbook,
        entry_price: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            symbol: symbol.to_string(),
            playbook: Some(playbook),
            action: SignalAction::Executed,
            reason: None,
            gate: None,
            entry_price: Some(entry_price),
            at,
        }
    }

    pub fn skipped(
        user_id: &str,
        symbol: &str,
        playbook: Option<Playbook>,
        gate: Option<&str>,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            symbol: symbol.to_string(),
            playbook,
            action: SignalAction::Skipped,
            reason: Some(reason.into()),
            gate: gate.map(|g| g.to_string()),
            entry_price: None,
            at,
        }
    }
}

/// Notification journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub user_id: String,
    pub level: AlertLevel,
    pub alert_type: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        user_id: &str,
        level: AlertLevel,
        alert_type: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            level,
            alert_type: alert_type.to_string(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Trade-journal aggregate statistics.
#[derive(Debug, Clone, Serialize)]
pub struct JournalStats {
    pub total_trades: usize,
    pub win_rate: f64,
    pub total_net_pnl: Decimal,
    pub profit_factor: f64,
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS bot_configs (
    user_id TEXT PRIMARY KEY,
    document TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bot_states (
    user_id TEXT PRIMARY KEY,
    document TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pair_signal_times (
    user_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    signaled_at TEXT NOT NULL,
    PRIMARY KEY (user_id, symbol)
);

CREATE TABLE IF NOT EXISTS playbook_b_counters (
    user_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, symbol)
);

CREATE TABLE IF NOT EXISTS positions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    status TEXT NOT NULL,
    document TEXT NOT NULL,
    opened_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_positions_user_status_symbol
    ON positions(user_id, status, symbol);

CREATE TABLE IF NOT EXISTS trades (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    side TEXT NOT NULL,
    playbook TEXT NOT NULL,
    entry_price TEXT NOT NULL,
    exit_price TEXT NOT NULL,
    quantity TEXT NOT NULL,
    pnl_usd TEXT NOT NULL,
    pnl_r REAL NOT NULL,
    fees TEXT NOT NULL,
    outcome TEXT NOT NULL,
    close_reason TEXT NOT NULL,
    date TEXT NOT NULL,
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_trades_user_date ON trades(user_id, date DESC);

CREATE TABLE IF NOT EXISTS signals (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    playbook TEXT,
    action TEXT NOT NULL,
    reason TEXT,
    gate TEXT,
    entry_price TEXT,
    at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_signals_user_at ON signals(user_id, at DESC);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    level TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    message TEXT NOT NULL,
    at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alerts_user_at ON alerts(user_id, at DESC);
"#;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite-backed store for all engine records.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to apply database schema")?;
        info!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to apply database schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // -------------------------------------------------------------------------
    // Bot config / state documents
    // -------------------------------------------------------------------------

    pub fn save_config(&self, user_id: &str, config: &BotConfig) -> Result<()> {
        let doc = serde_json::to_string(config).context("failed to serialise bot config")?;
        self.conn.lock().execute(
            "INSERT INTO bot_configs (user_id, document, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET document = ?2, updated_at = ?3",
            params![user_id, doc, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn load_config(&self, user_id: &str) -> Result<Option<BotConfig>> {
        let conn = self.conn.lock();
        let doc: Option<String> = conn
            .query_row(
                "SELECT document FROM bot_configs WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        match doc {
            Some(doc) => Ok(Some(
                serde_json::from_str(&doc).context("failed to parse bot config document")?,
            )),
            None => Ok(None),
        }
    }

    /// Persist the scalar part of `BotState`. The map-valued fields are
    /// mirrored into their per-key tables so individual updates stay atomic.
    pub fn save_state(&self, user_id: &str, state: &BotState) -> Result<()> {
        let doc = serde_json::to_string(state).context("failed to serialise bot state")?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO bot_states (user_id, document, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET document = ?2, updated_at = ?3",
            params![user_id, doc, Utc::now().to_rfc3339()],
        )?;

        for (symbol, at) in &state.last_pair_signal_times {
            tx.execute(
                "INSERT INTO pair_signal_times (user_id, symbol, signaled_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, symbol) DO UPDATE SET signaled_at = ?3",
                params![user_id, symbol, at.to_rfc3339()],
            )?;
        }

        for (symbol, count) in &state.playbook_b_counters {
            tx.execute(
                "INSERT INTO playbook_b_counters (user_id, symbol, count) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, symbol) DO UPDATE SET count = ?3",
                params![user_id, symbol, count],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn load_state(&self, user_id: &str) -> Result<Option<BotState>> {
        let conn = self.conn.lock();
        let doc: Option<String> = conn
            .query_row(
                "SELECT document FROM bot_states WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(doc) = doc else {
            return Ok(None);
        };

        let mut state: BotState =
            serde_json::from_str(&doc).context("failed to parse bot state document")?;

        // Re-hydrate the map-valued fields from their authoritative tables.
        state.last_pair_signal_times.clear();
        let mut stmt =
            conn.prepare("SELECT symbol, signaled_at FROM pair_signal_times WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (symbol, at) = row?;
            let at = DateTime::parse_from_rfc3339(&at)
                .context("bad signaled_at timestamp")?
                .with_timezone(&Utc);
            state.last_pair_signal_times.insert(symbol, at);
        }

        state.playbook_b_counters.clear();
        let mut stmt =
            conn.prepare("SELECT symbol, count FROM playbook_b_counters WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        for row in rows {
            let (symbol, count) = row?;
            if count > 0 {
                state.playbook_b_counters.insert(symbol, count);
            }
        }

        Ok(Some(state))
    }

    /// Atomic per-key increment of a Playbook-B session counter.
    pub fn increment_playbook_b(&self, user_id: &str, symbol: &str) -> Result<u32> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO playbook_b_counters (user_id, symbol, count) VALUES (?1, ?2, 1)
             ON CONFLICT(user_id, symbol) DO UPDATE SET count = count + 1",
            params![user_id, symbol],
        )?;
        let count = conn.query_row(
            "SELECT count FROM playbook_b_counters WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Session rollover: zero every Playbook-B counter for the user.
    pub fn reset_playbook_b(&self, user_id: &str) -> Result<()> {
        self.conn.lock().execute(
            "DELETE FROM playbook_b_counters WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Positions
    // -------------------------------------------------------------------------

    pub fn insert_position(&self, position: &Position) -> Result<()> {
        let doc = serde_json::to_string(position).context("failed to serialise position")?;
        self.conn.lock().execute(
            "INSERT INTO positions (id, user_id, symbol, status, document, opened_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                position.id,
                position.user_id,
                position.symbol,
                position.status.as_str(),
                doc,
                position.opened_at.to_rfc3339()
            ],
        )?;
        debug!(id = %position.id, symbol = %position.symbol, "position inserted");
        Ok(())
    }

    pub fn update_position(&self, position: &Position) -> Result<()> {
        let doc = serde_json::to_string(position).context("failed to serialise position")?;
        let updated = self.conn.lock().execute(
            "UPDATE positions SET status = ?2, document = ?3 WHERE id = ?1",
            params![position.id, position.status.as_str(), doc],
        )?;
        anyhow::ensure!(updated == 1, "position {} not found for update", position.id);
        Ok(())
    }

    pub fn open_positions(&self, user_id: &str) -> Result<Vec<Position>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT document FROM positions WHERE user_id = ?1 AND status = ?2 ORDER BY opened_at",
        )?;
        let rows = stmt.query_map(params![user_id, PositionStatus::Open.as_str()], |row| {
            row.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for doc in rows {
            out.push(serde_json::from_str(&doc?).context("failed to parse position document")?);
        }
        Ok(out)
    }

    pub fn get_position(&self, id: &str) -> Result<Option<Position>> {
        let conn = self.conn.lock();
        let doc: Option<String> = conn
            .query_row(
                "SELECT document FROM positions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match doc {
            Some(doc) => Ok(Some(
                serde_json::from_str(&doc).context("failed to parse position document")?,
            )),
            None => Ok(None),
        }
    }

    // -------------------------------------------------------------------------
    // Trades
    // -------------------------------------------------------------------------

    pub fn insert_trade(&self, trade: &Trade) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO trades (id, user_id, symbol, side, playbook, entry_price, exit_price,
                                 quantity, pnl_usd, pnl_r, fees, outcome, close_reason, date, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                trade.id,
                trade.user_id,
                trade.symbol,
                trade.side.as_str(),
                trade.playbook.code(),
                trade.entry_price.to_string(),
                trade.exit_price.to_string(),
                trade.quantity.to_string(),
                trade.pnl_usd.to_string(),
                trade.pnl_r,
                trade.fees.to_string(),
                trade.outcome.as_str(),
                trade.close_reason.as_str(),
                trade.date.to_rfc3339(),
                trade.notes
            ],
        )?;
        Ok(())
    }

    pub fn trades(&self, user_id: &str, limit: usize) -> Result<Vec<Trade>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, symbol, side, playbook, entry_price, exit_price, quantity, pnl_usd,
                    pnl_r, fees, outcome, close_reason, date, notes
             FROM trades WHERE user_id = ?1 ORDER BY date DESC LIMIT ?2",
        )?;
        let limit: i64 = limit.try_into().unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, f64>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, String>(11)?,
                row.get::<_, String>(12)?,
                row.get::<_, Option<String>>(13)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (
                id,
                symbol,
                side,
                playbook,
                entry_price,
                exit_price,
                quantity,
                pnl_usd,
                pnl_r,
                fees,
                outcome,
                close_reason,
                date,
                notes,
            ) = row?;
            out.push(Trade {
                id,
                user_id: user_id.to_string(),
                symbol,
                side: side.parse().map_err(anyhow::Error::msg)?,
                playbook: Playbook::parse_code(&playbook)
                    .context("unknown playbook code in trade row")?,
                entry_price: parse_decimal(&entry_price)?,
                exit_price: parse_decimal(&exit_price)?,
                quantity: parse_decimal(&quantity)?,
                pnl_usd: parse_decimal(&pnl_usd)?,
                pnl_r,
                fees: parse_decimal(&fees)?,
                outcome: parse_outcome(&outcome)?,
                close_reason: close_reason.parse().map_err(anyhow::Error::msg)?,
                date: DateTime::parse_from_rfc3339(&date)
                    .context("bad trade date")?
                    .with_timezone(&Utc),
                notes,
            });
        }
        Ok(out)
    }

    /// Aggregate journal statistics over all of the user's trades.
    pub fn trade_stats(&self, user_id: &str) -> Result<Option<JournalStats>> {
        let trades = self.trades(user_id, usize::MAX)?;
        if trades.is_empty() {
            return Ok(None);
        }

        let total_trades = trades.len();
        let wins = trades
            .iter()
            .filter(|t| t.outcome == TradeOutcome::Win)
            .count();
        let total_net_pnl: Decimal = trades.iter().map(|t| t.pnl_usd).sum();
        let gross_profit: Decimal = trades
            .iter()
            .map(|t| t.pnl_usd)
            .filter(|p| *p > Decimal::ZERO)
            .sum();
        let gross_loss: Decimal = trades
            .iter()
            .map(|t| t.pnl_usd)
            .filter(|p| *p < Decimal::ZERO)
            .map(|p| p.abs())
            .sum();

        use rust_decimal::prelude::ToPrimitive;
        let profit_factor = if !gross_loss.is_zero() {
            (gross_profit / gross_loss).to_f64().unwrap_or(0.0)
        } else if !gross_profit.is_zero() {
            f64::INFINITY
        } else {
            0.0
        };

        Ok(Some(JournalStats {
            total_trades,
            win_rate: wins as f64 / total_trades as f64,
            total_net_pnl,
            profit_factor,
        }))
    }

    // -------------------------------------------------------------------------
    // Signals
    // -------------------------------------------------------------------------

    pub fn insert_signal(&self, signal: &SignalRecord) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO signals (id, user_id, symbol, playbook, action, reason, gate, entry_price, at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                signal.id,
                signal.user_id,
                signal.symbol,
                signal.playbook.map(|p| p.code()),
                signal.action.as_str(),
                signal.reason,
                signal.gate,
                signal.entry_price.map(|p| p.to_string()),
                signal.at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn signals(&self, user_id: &str, limit: usize) -> Result<Vec<SignalRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, symbol, playbook, action, reason, gate, entry_price, at
             FROM signals WHERE user_id = ?1 ORDER BY at DESC LIMIT ?2",
        )?;
        let limit: i64 = limit.try_into().unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, symbol, playbook, action, reason, gate, entry_price, at) = row?;
            out.push(SignalRecord {
                id,
                user_id: user_id.to_string(),
                symbol,
                playbook: playbook.as_deref().and_then(Playbook::parse_code),
                action: if action == "EXECUTED" {
                    SignalAction::Executed
                } else {
                    SignalAction::Skipped
                },
                reason,
                gate,
                entry_price: entry_price.as_deref().map(parse_decimal).transpose()?,
                at: DateTime::parse_from_rfc3339(&at)
                    .context("bad signal timestamp")?
                    .with_timezone(&Utc),
            });
        }
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Alerts
    // -------------------------------------------------------------------------

    pub fn insert_alert(&self, alert: &Alert) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO alerts (id, user_id, level, alert_type, message, at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                alert.id,
                alert.user_id,
                alert.level.as_str(),
                alert.alert_type,
                alert.message,
                alert.at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn alerts(&self, user_id: &str, limit: usize) -> Result<Vec<Alert>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, level, alert_type, message, at
             FROM alerts WHERE user_id = ?1 ORDER BY at DESC LIMIT ?2",
        )?;
        let limit: i64 = limit.try_into().unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, level, alert_type, message, at) = row?;
            out.push(Alert {
                id,
                user_id: user_id.to_string(),
                level: parse_alert_level(&level)?,
                alert_type,
                message,
                at: DateTime::parse_from_rfc3339(&at)
                    .context("bad alert timestamp")?
                    .with_timezone(&Utc),
            });
        }
        Ok(out)
    }
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("unparseable decimal in store: {s}"))
}

fn parse_outcome(s: &str) -> Result<TradeOutcome> {
    match s {
        "WIN" => Ok(TradeOutcome::Win),
        "LOSS" => Ok(TradeOutcome::Loss),
        "BREAKEVEN" => Ok(TradeOutcome::Breakeven),
        other => anyhow::bail!("unknown trade outcome: {other}"),
    }
}

fn parse_alert_level(s: &str) -> Result<AlertLevel> {
    match s {
        "INFO" => Ok(AlertLevel::Info),
        "WARNING" => Ok(AlertLevel::Warning),
        "ERROR" => Ok(AlertLevel::Error),
        "CRITICAL" => Ok(AlertLevel::Critical),
        other => anyhow::bail!("unknown alert level: {other}"),
    }
}
