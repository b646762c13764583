// =============================================================================
// Bot Configuration — per-user engine settings with atomic save
// =============================================================================
//
// Immutable between ticks: the trading actor reads a fresh copy at the top of
// each tick, and operator updates land between ticks. Persistence uses an
// atomic tmp + rename pattern to prevent corruption on crash. All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config document.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::BotStatus;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_watchlist() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_refresh_ms() -> u64 {
    15_000
}

fn default_min_volume_usd_24h() -> Decimal {
    dec!(5000000)
}

fn default_max_spread_bps() -> f64 {
    10.0
}

fn default_max_spread_bps_event() -> f64 {
    25.0
}

fn default_tob_min_depth_usd() -> Decimal {
    dec!(25000)
}

fn default_signal_cooldown_min() -> i64 {
    15
}

fn default_analysis_interval() -> String {
    "5m".to_string()
}

fn default_min_candles() -> usize {
    100
}

fn default_event_volume_mult() -> Decimal {
    dec!(3.0)
}

fn default_r_pct() -> Decimal {
    dec!(0.006)
}

fn default_max_r_per_trade() -> f64 {
    1.0
}

fn default_daily_stop_r() -> f64 {
    -2.0
}

fn default_weekly_stop_r() -> f64 {
    -5.0
}

fn default_max_open_r() -> f64 {
    3.0
}

fn default_max_exposure_pct() -> Decimal {
    dec!(0.5)
}

fn default_max_positions() -> u32 {
    4
}

fn default_slippage_guard_bps() -> f64 {
    50.0
}

fn default_slippage_guard_bps_event() -> f64 {
    100.0
}

fn default_reserve_target_pct() -> Decimal {
    dec!(0.30)
}

fn default_reserve_floor_pct() -> Decimal {
    dec!(0.15)
}

fn default_reserve_refill_pct() -> Decimal {
    dec!(0.25)
}

// =============================================================================
// Scanner
// =============================================================================

/// Watchlist and market-quality gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Symbols the engine watches and trades.
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,

    /// Tick period for the per-user scheduler.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// Minimum 24h quote volume (USD) for a symbol to qualify.
    #[serde(default = "default_min_volume_usd_24h")]
    pub min_volume_usd_24h: Decimal,

    /// Maximum bid/ask spread in basis points.
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: f64,

    /// Relaxed spread cap applied to event-driven candidates.
    #[serde(default = "default_max_spread_bps_event")]
    pub max_spread_bps_event: f64,

    /// Minimum top-of-book depth (USD) on both sides.
    #[serde(default = "default_tob_min_depth_usd")]
    pub tob_min_depth_usd: Decimal,

    /// Per-pair signal cooldown in minutes.
    #[serde(default = "default_signal_cooldown_min")]
    pub signal_cooldown_min: i64,

    /// Kline interval used for analysis (e.g. "5m").
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval: String,

    /// Minimum closed candles required before a symbol is tradable.
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,

    /// Bar volume ≥ this multiple of the 20-bar average flags an event burst.
    #[serde(default = "default_event_volume_mult")]
    pub event_volume_mult: Decimal,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            watchlist: default_watchlist(),
            refresh_ms: default_refresh_ms(),
            min_volume_usd_24h: default_min_volume_usd_24h(),
            max_spread_bps: default_max_spread_bps(),
            max_spread_bps_event: default_max_spread_bps_event(),
            tob_min_depth_usd: default_tob_min_depth_usd(),
            signal_cooldown_min: default_signal_cooldown_min(),
            analysis_interval: default_analysis_interval(),
            min_candles: default_min_candles(),
            event_volume_mult: default_event_volume_mult(),
        }
    }
}

// =============================================================================
// Risk
// =============================================================================

/// R-denominated risk limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// One R as a fraction of equity (e.g. 0.006 = 0.6 %).
    #[serde(default = "default_r_pct")]
    pub r_pct: Decimal,

    /// Per-trade risk clamp in R.
    #[serde(default = "default_max_r_per_trade")]
    pub max_r_per_trade: f64,

    /// Daily stop in R (negative). Inclusive: hitting it exactly halts.
    #[serde(default = "default_daily_stop_r")]
    pub daily_stop_r: f64,

    /// Weekly stop in R (negative).
    #[serde(default = "default_weekly_stop_r")]
    pub weekly_stop_r: f64,

    /// Maximum aggregate open risk across positions, in R.
    #[serde(default = "default_max_open_r")]
    pub max_open_r: f64,

    /// Maximum aggregate notional as a fraction of equity.
    #[serde(default = "default_max_exposure_pct")]
    pub max_exposure_pct: Decimal,

    /// Maximum concurrent open positions.
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,

    /// Halve sizing on correlated alts while a BTC position carries >= 1R.
    #[serde(default = "default_true")]
    pub correlation_guard: bool,

    /// Maximum tolerated slippage in basis points.
    #[serde(default = "default_slippage_guard_bps")]
    pub slippage_guard_bps: f64,

    /// Relaxed slippage cap for event-driven candidates.
    #[serde(default = "default_slippage_guard_bps_event")]
    pub slippage_guard_bps_event: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            r_pct: default_r_pct(),
            max_r_per_trade: default_max_r_per_trade(),
            daily_stop_r: default_daily_stop_r(),
            weekly_stop_r: default_weekly_stop_r(),
            max_open_r: default_max_open_r(),
            max_exposure_pct: default_max_exposure_pct(),
            max_positions: default_max_positions(),
            correlation_guard: true,
            slippage_guard_bps: default_slippage_guard_bps(),
            slippage_guard_bps_event: default_slippage_guard_bps_event(),
        }
    }
}

// =============================================================================
// Reserve
// =============================================================================

/// Capital-reserve policy: a slice of equity the engine never deploys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveConfig {
    /// Target reserve as a fraction of equity.
    #[serde(default = "default_reserve_target_pct")]
    pub target_pct: Decimal,

    /// Hard floor: available capital may never drop below this fraction.
    #[serde(default = "default_reserve_floor_pct")]
    pub floor_pct: Decimal,

    /// Fraction of realized profits routed back into the reserve.
    #[serde(default = "default_reserve_refill_pct")]
    pub refill_pct: Decimal,
}

impl Default for ReserveConfig {
    fn default() -> Self {
        Self {
            target_pct: default_reserve_target_pct(),
            floor_pct: default_reserve_floor_pct(),
            refill_pct: default_reserve_refill_pct(),
        }
    }
}

// =============================================================================
// Playbooks
// =============================================================================

fn default_a_lookback() -> usize {
    20
}
fn default_a_volume_mult() -> Decimal {
    dec!(1.5)
}
fn default_a_stop_atr_mult() -> Decimal {
    dec!(1.2)
}
fn default_a_breakeven_r() -> f64 {
    1.0
}
fn default_a_scale_r() -> f64 {
    1.5
}
fn default_a_scale_pct() -> Decimal {
    dec!(0.5)
}
fn default_a_trail_atr_mult() -> Decimal {
    dec!(1.0)
}

/// Playbook A — N-bar breakout with volume confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookAConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bars defining the breakout extreme.
    #[serde(default = "default_a_lookback")]
    pub lookback: usize,
    /// Breakout bar volume must exceed this multiple of average volume.
    #[serde(default = "default_a_volume_mult")]
    pub volume_mult: Decimal,
    #[serde(default = "default_a_stop_atr_mult")]
    pub stop_atr_mult: Decimal,
    /// Move stop to entry at this unrealized R.
    #[serde(default = "default_a_breakeven_r")]
    pub breakeven_r: f64,
    /// Scale out at this unrealized R.
    #[serde(default = "default_a_scale_r")]
    pub scale_r: f64,
    /// Fraction of the current position reduced at the scale-out.
    #[serde(default = "default_a_scale_pct")]
    pub scale_pct: Decimal,
    /// ATR multiple for the trail enabled after the scale-out.
    #[serde(default = "default_a_trail_atr_mult")]
    pub trail_atr_mult: Decimal,
}

impl Default for PlaybookAConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback: default_a_lookback(),
            volume_mult: default_a_volume_mult(),
            stop_atr_mult: default_a_stop_atr_mult(),
            breakeven_r: default_a_breakeven_r(),
            scale_r: default_a_scale_r(),
            scale_pct: default_a_scale_pct(),
            trail_atr_mult: default_a_trail_atr_mult(),
        }
    }
}

fn default_b_deviation_atr_mult() -> Decimal {
    dec!(2.0)
}
fn default_b_stop_atr_mult() -> Decimal {
    dec!(1.0)
}
fn default_b_target_r() -> f64 {
    1.5
}
fn default_b_max_trades_per_session() -> u32 {
    2
}
fn default_b_time_stop_min() -> i64 {
    90
}

/// Playbook B — VWAP mean-reversion, session-capped per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookBConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Price must deviate from session VWAP by this many ATRs.
    #[serde(default = "default_b_deviation_atr_mult")]
    pub deviation_atr_mult: Decimal,
    #[serde(default = "default_b_stop_atr_mult")]
    pub stop_atr_mult: Decimal,
    #[serde(default = "default_b_target_r")]
    pub target_r: f64,
    /// Attempts allowed per symbol per session.
    #[serde(default = "default_b_max_trades_per_session")]
    pub max_trades_per_session: u32,
    /// Close the position after this many minutes regardless of PnL.
    #[serde(default = "default_b_time_stop_min")]
    pub time_stop_min: i64,
}

impl Default for PlaybookBConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            deviation_atr_mult: default_b_deviation_atr_mult(),
            stop_atr_mult: default_b_stop_atr_mult(),
            target_r: default_b_target_r(),
            max_trades_per_session: default_b_max_trades_per_session(),
            time_stop_min: default_b_time_stop_min(),
        }
    }
}

fn default_c_event_window_min() -> i64 {
    30
}
fn default_c_stop_atr_mult() -> Decimal {
    dec!(1.8)
}
fn default_c_scale_1_r() -> f64 {
    1.0
}
fn default_c_scale_1_pct() -> Decimal {
    dec!(0.33)
}
fn default_c_scale_2_r() -> f64 {
    2.0
}
fn default_c_scale_2_pct() -> Decimal {
    dec!(0.5)
}
fn default_c_trail_atr_mult() -> Decimal {
    dec!(1.2)
}

/// Playbook C — event burst with two-stage scale-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookCConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Only fires while the event burst is younger than this many minutes.
    #[serde(default = "default_c_event_window_min")]
    pub event_window_min: i64,
    /// Wider stop for event volatility.
    #[serde(default = "default_c_stop_atr_mult")]
    pub stop_atr_mult: Decimal,
    #[serde(default = "default_c_scale_1_r")]
    pub scale_1_r: f64,
    #[serde(default = "default_c_scale_1_pct")]
    pub scale_1_pct: Decimal,
    #[serde(default = "default_c_scale_2_r")]
    pub scale_2_r: f64,
    #[serde(default = "default_c_scale_2_pct")]
    pub scale_2_pct: Decimal,
    /// ATR trail enabled after the second scale-out.
    #[serde(default = "default_c_trail_atr_mult")]
    pub trail_atr_mult: Decimal,
    /// Optional hard target in R.
    #[serde(default)]
    pub target_r: Option<f64>,
}

impl Default for PlaybookCConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_window_min: default_c_event_window_min(),
            stop_atr_mult: default_c_stop_atr_mult(),
            scale_1_r: default_c_scale_1_r(),
            scale_1_pct: default_c_scale_1_pct(),
            scale_2_r: default_c_scale_2_r(),
            scale_2_pct: default_c_scale_2_pct(),
            trail_atr_mult: default_c_trail_atr_mult(),
            target_r: None,
        }
    }
}

fn default_d_dip_atr_mult() -> Decimal {
    dec!(2.5)
}
fn default_d_stop_atr_mult() -> Decimal {
    dec!(1.5)
}
fn default_d_target_r() -> f64 {
    2.0
}

/// Playbook D — dip buy below the short moving average.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookDConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entry requires price this many ATRs below the short MA.
    #[serde(default = "default_d_dip_atr_mult")]
    pub dip_atr_mult: Decimal,
    #[serde(default = "default_d_stop_atr_mult")]
    pub stop_atr_mult: Decimal,
    #[serde(default = "default_d_target_r")]
    pub target_r: f64,
}

impl Default for PlaybookDConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dip_atr_mult: default_d_dip_atr_mult(),
            stop_atr_mult: default_d_stop_atr_mult(),
            target_r: default_d_target_r(),
        }
    }
}

// =============================================================================
// Halt metadata
// =============================================================================

/// Recorded when the kill-switch fires or the operator halts the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaltMetadata {
    pub reason: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub justification: Option<String>,
    /// Positions flattened when the halt fired.
    #[serde(default)]
    pub flattened: u32,
}

// =============================================================================
// BotConfig
// =============================================================================

/// Top-level per-user configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotConfig {
    /// Mutated only by the kill-switch, auto-resume, or operator action.
    #[serde(default)]
    pub bot_status: BotStatus,

    #[serde(default)]
    pub halt_metadata: Option<HaltMetadata>,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub reserve: ReserveConfig,

    #[serde(default)]
    pub playbook_a: PlaybookAConfig,

    #[serde(default)]
    pub playbook_b: PlaybookBConfig,

    #[serde(default)]
    pub playbook_c: PlaybookCConfig,

    #[serde(default)]
    pub playbook_d: PlaybookDConfig,
}

impl BotConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bot config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse bot config from {}", path.display()))?;

        info!(
            path = %path.display(),
            watchlist = ?config.scanner.watchlist,
            bot_status = %config.bot_status,
            "bot config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write (write to
    /// `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise bot config")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "bot config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.bot_status, BotStatus::Active);
        assert!(cfg.halt_metadata.is_none());
        assert_eq!(cfg.scanner.watchlist.len(), 5);
        assert_eq!(cfg.scanner.watchlist[0], "BTCUSDT");
        assert_eq!(cfg.scanner.signal_cooldown_min, 15);
        assert_eq!(cfg.risk.r_pct, dec!(0.006));
        assert_eq!(cfg.risk.max_positions, 4);
        assert!(cfg.risk.correlation_guard);
        assert!((cfg.risk.daily_stop_r - -2.0).abs() < f64::EPSILON);
        assert_eq!(cfg.reserve.floor_pct, dec!(0.15));
        assert!(cfg.playbook_a.enabled);
        assert_eq!(cfg.playbook_a.scale_pct, dec!(0.5));
        assert_eq!(cfg.playbook_b.max_trades_per_session, 2);
        assert_eq!(cfg.playbook_c.scale_2_pct, dec!(0.5));
        assert!(cfg.playbook_c.target_r.is_none());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: BotConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.bot_status, BotStatus::Active);
        assert_eq!(cfg.scanner.min_candles, 100);
        assert_eq!(cfg.risk.r_pct, dec!(0.006));
        assert!(cfg.playbook_d.enabled);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "bot_status": "HaltedDaily",
            "scanner": { "watchlist": ["ETHUSDT"] },
            "risk": { "max_positions": 2 }
        }"#;
        let cfg: BotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.bot_status, BotStatus::HaltedDaily);
        assert_eq!(cfg.scanner.watchlist, vec!["ETHUSDT"]);
        assert_eq!(cfg.scanner.signal_cooldown_min, 15);
        assert_eq!(cfg.risk.max_positions, 2);
        assert_eq!(cfg.risk.r_pct, dec!(0.006));
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = BotConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: BotConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.scanner.watchlist, cfg2.scanner.watchlist);
        assert_eq!(cfg.risk.r_pct, cfg2.risk.r_pct);
        assert_eq!(cfg.playbook_c.scale_1_pct, cfg2.playbook_c.scale_1_pct);
        assert_eq!(cfg.bot_status, cfg2.bot_status);
    }

    #[test]
    fn atomic_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_config.json");

        let mut cfg = BotConfig::default();
        cfg.risk.max_positions = 7;
        cfg.save(&path).unwrap();

        let loaded = BotConfig::load(&path).unwrap();
        assert_eq!(loaded.risk.max_positions, 7);
        // tmp file must not linger
        assert!(!dir.path().join("bot_config.json.tmp").exists());
    }
}
