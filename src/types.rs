// =============================================================================
// Shared types used across the Borealis trading engine
// =============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance snapshot for a single asset from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub asset: String,
    #[serde(default)]
    pub free: Decimal,
    #[serde(default)]
    pub locked: Decimal,
}

/// Orientation of a position for PnL accounting.
///
/// `Short` never produces an exchange short — the engine is spot-only and the
/// tag only flips the sign of the PnL math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for longs, -1 for shorts.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LONG" => Ok(Self::Long),
            "SHORT" => Ok(Self::Short),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// Exchange order side. Opens are always BUY; closes are always SELL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange-reported order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Terminal statuses end the fill-polling loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected | Self::Expired)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(Self::New),
            "PARTIALLY_FILLED" => Some(Self::PartiallyFilled),
            "FILLED" => Some(Self::Filled),
            "CANCELED" => Some(Self::Canceled),
            "REJECTED" => Some(Self::Rejected),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Lifecycle status of the per-user bot.
///
/// Mutated only by the kill-switch, the daily auto-resume, or operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    Active,
    HaltedDaily,
    HaltedWeekly,
    Stopped,
}

impl BotStatus {
    /// Any non-Active status blocks new orders (kill-switch stickiness).
    pub fn is_halted(&self) -> bool {
        !matches!(self, Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::HaltedDaily => "HALTED_DAILY",
            Self::HaltedWeekly => "HALTED_WEEKLY",
            Self::Stopped => "STOPPED",
        }
    }
}

impl Default for BotStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BotStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "HALTED_DAILY" => Ok(Self::HaltedDaily),
            "HALTED_WEEKLY" => Ok(Self::HaltedWeekly),
            "STOPPED" => Ok(Self::Stopped),
            other => Err(format!("unknown bot status: {other}")),
        }
    }
}

/// What tripped the kill-switch. Determines the halt status and its resume
/// semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltKind {
    Daily,
    Weekly,
    CircuitBreaker,
    MaxDrawdown,
    Manual,
}

impl HaltKind {
    /// The bot status a halt of this kind transitions to.
    ///
    /// Daily halts auto-resume at the next session boundary; everything else
    /// requires explicit operator resume with justification.
    pub fn target_status(&self) -> BotStatus {
        match self {
            Self::Daily => BotStatus::HaltedDaily,
            Self::Weekly => BotStatus::HaltedWeekly,
            Self::CircuitBreaker | Self::MaxDrawdown | Self::Manual => BotStatus::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::CircuitBreaker => "CIRCUIT_BREAKER",
            Self::MaxDrawdown => "MAX_DRAWDOWN",
            Self::Manual => "MANUAL",
        }
    }
}

impl std::fmt::Display for HaltKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy template that produced a signal or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Playbook {
    Breakout,
    VwapReversion,
    EventBurst,
    Dip,
}

impl Playbook {
    /// Evaluation and signal-processing order. Earlier entries win symbol
    /// tie-breaks and see the tick's reservations first.
    pub const PRIORITY: [Playbook; 4] = [
        Playbook::Breakout,
        Playbook::EventBurst,
        Playbook::VwapReversion,
        Playbook::Dip,
    ];

    /// Single-letter code used in journals and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Breakout => "A",
            Self::VwapReversion => "B",
            Self::EventBurst => "C",
            Self::Dip => "D",
        }
    }

    pub fn parse_code(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Self::Breakout),
            "B" => Some(Self::VwapReversion),
            "C" => Some(Self::EventBurst),
            "D" => Some(Self::Dip),
            _ => None,
        }
    }
}

impl std::fmt::Display for Playbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    Target,
    TimeStop,
    Manual,
    KillSwitch,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "STOP_LOSS",
            Self::Target => "TARGET",
            Self::TimeStop => "TIME_STOP",
            Self::Manual => "MANUAL",
            Self::KillSwitch => "KILL_SWITCH",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CloseReason {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOP_LOSS" => Ok(Self::StopLoss),
            "TARGET" => Ok(Self::Target),
            "TIME_STOP" => Ok(Self::TimeStop),
            "MANUAL" => Ok(Self::Manual),
            "KILL_SWITCH" => Ok(Self::KillSwitch),
            other => Err(format!("unknown close reason: {other}")),
        }
    }
}

/// Outcome of a scan-cycle decision for one (symbol, playbook).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Executed,
    Skipped,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "EXECUTED",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a journaled alert. Kill-switch triggers are always Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Win/loss classification of a closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
    Breakeven,
}

impl TradeOutcome {
    /// Classify by realized PnL. Zero is breakeven.
    pub fn from_pnl(pnl: Decimal) -> Self {
        if pnl > Decimal::ZERO {
            Self::Win
        } else if pnl < Decimal::ZERO {
            Self::Loss
        } else {
            Self::Breakeven
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "WIN",
            Self::Loss => "LOSS",
            Self::Breakeven => "BREAKEVEN",
        }
    }
}

impl std::fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
