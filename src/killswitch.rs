// =============================================================================
// Kill-Switch — flatten-all plus bot status transition
// =============================================================================
//
// execute(kind, reason):
//   1. Close every OPEN position through the Position Manager's closure
//      procedure (each close is atomic with respect to itself; failures are
//      logged and the remaining positions still flatten).
//   2. Move botStatus to the halt state for `kind`.
//   3. Record halt metadata (reason, timestamp, flattened count).
//   4. Emit a CRITICAL alert.
//
// Resume semantics differ by kind:
//   HALTED_DAILY  — auto-resumes at the next session boundary; the pipeline
//                   performs the transition itself on the rollover tick.
//   HALTED_WEEKLY — operator resume with recorded justification only.
//   STOPPED       — operator resume with recorded justification only.
// =============================================================================

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::{BotConfig, HaltMetadata};
use crate::position::PositionManager;
use crate::state::BotState;
use crate::store::{Alert, Store};
use crate::types::{AlertLevel, BotStatus, CloseReason, HaltKind};

/// Outcome of a kill-switch execution.
#[derive(Debug, Clone)]
pub struct KillSwitchOutcome {
    pub flattened: u32,
    pub status: BotStatus,
}

/// Flatten all open positions and halt the bot.
#[allow(clippy::too_many_arguments)]
pub async fn execute(
    store: &Store,
    manager: &PositionManager,
    cfg: &mut BotConfig,
    state: &mut BotState,
    user_id: &str,
    kind: HaltKind,
    reason: &str,
    now: DateTime<Utc>,
    tick_id: u64,
) -> Result<KillSwitchOutcome> {
    warn!(user_id, kind = %kind, reason, "KILL-SWITCH TRIGGERED — flattening all positions");

    // ── 1. Flatten ───────────────────────────────────────────────────────
    let mut flattened = 0u32;
    for mut position in store.open_positions(user_id)? {
        match manager
            .close_position(cfg, state, &mut position, CloseReason::KillSwitch, now, tick_id)
            .await
        {
            Ok(trade) => {
                flattened += 1;
                info!(
                    id = %position.id,
                    symbol = %position.symbol,
                    pnl_usd = %trade.pnl_usd,
                    "position flattened by kill-switch"
                );
            }
            Err(e) => {
                // Keep flattening the rest; the stuck position stays OPEN
                // and the next tick (or the operator) picks it up.
                error!(
                    id = %position.id,
                    symbol = %position.symbol,
                    error = %e,
                    "kill-switch failed to flatten position"
                );
            }
        }
    }

    // ── 2+3. Status transition and halt metadata ─────────────────────────
    let status = kind.target_status();
    cfg.bot_status = status;
    cfg.halt_metadata = Some(HaltMetadata {
        reason: reason.to_string(),
        at: now,
        justification: None,
        flattened,
    });
    store.save_config(user_id, cfg)?;
    state.is_running = status == BotStatus::Active;

    // ── 4. Alert ─────────────────────────────────────────────────────────
    store.insert_alert(&Alert::new(
        user_id,
        AlertLevel::Critical,
        "kill_switch",
        format!("{kind} kill-switch: {reason} ({flattened} positions flattened)"),
    ))?;

    info!(user_id, status = %status, flattened, "kill-switch complete");

    Ok(KillSwitchOutcome { flattened, status })
}

/// Daily auto-resume, performed by the pipeline on the tick that crosses the
/// session boundary. Returns true when the bot came back to ACTIVE.
pub fn try_auto_resume(
    store: &Store,
    cfg: &mut BotConfig,
    user_id: &str,
    daily_rolled: bool,
) -> Result<bool> {
    if cfg.bot_status != BotStatus::HaltedDaily || !daily_rolled {
        return Ok(false);
    }

    cfg.bot_status = BotStatus::Active;
    store.save_config(user_id, cfg)?;
    store.insert_alert(&Alert::new(
        user_id,
        AlertLevel::Info,
        "auto_resume",
        "Daily halt auto-resumed at session boundary",
    ))?;

    info!(user_id, "daily halt auto-resumed");
    Ok(true)
}

/// Operator resume. Weekly halts and manual stops never auto-resume and
/// require a recorded justification.
pub fn resume(
    store: &Store,
    cfg: &mut BotConfig,
    user_id: &str,
    justification: &str,
) -> Result<(), String> {
    if !cfg.bot_status.is_halted() {
        return Err(format!("bot is not halted (status {})", cfg.bot_status));
    }
    if justification.trim().is_empty() {
        return Err("resume requires a justification".to_string());
    }

    let previous = cfg.bot_status;
    cfg.bot_status = BotStatus::Active;
    if let Some(meta) = cfg.halt_metadata.as_mut() {
        meta.justification = Some(justification.to_string());
    }

    store
        .save_config(user_id, cfg)
        .map_err(|e| format!("failed to persist resume: {e}"))?;
    store
        .insert_alert(&Alert::new(
            user_id,
            AlertLevel::Warning,
            "resume",
            format!("Resumed from {previous} by operator: {justification}"),
        ))
        .map_err(|e| format!("failed to journal resume: {e}"))?;

    info!(user_id, from = %previous, "operator resume");
    Ok(())
}
