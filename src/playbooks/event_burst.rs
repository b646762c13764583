// =============================================================================
// Playbook C — Event Burst
// =============================================================================
//
// Active only while the scanner's event flag is fresh: a volume burst bar
// younger than `event_window_min` minutes. Entry is the current price with a
// wider stop (`stop_atr_mult * ATR`) to survive event volatility.
//
// Exits are managed by the position manager: scale out `scale_1_pct` at
// `scale_1_r`, then `scale_2_pct` at `scale_2_r`, then trail by
// `trail_atr_mult * ATR`; an optional hard target closes at `target_r`.
// =============================================================================

use rust_decimal::Decimal;

use crate::config::BotConfig;
use crate::market::MarketSnapshot;
use crate::types::{Playbook, Side};

use super::{r_multiple, CandidateSignal};

pub fn evaluate(cfg: &BotConfig, snapshot: &MarketSnapshot) -> Option<CandidateSignal> {
    let pb = &cfg.playbook_c;
    if !pb.enabled {
        return None;
    }

    if !snapshot.event {
        return None;
    }
    let age_min = snapshot.event_age_min?;
    if age_min > pb.event_window_min {
        return None;
    }

    if snapshot.atr <= Decimal::ZERO {
        return None;
    }

    let entry = snapshot.price;
    let stop = entry - pb.stop_atr_mult * snapshot.atr;
    let target = pb
        .target_r
        .map(|r| entry + r_multiple(entry - stop, r));

    Some(CandidateSignal {
        symbol: snapshot.symbol.clone(),
        playbook: Playbook::EventBurst,
        side: Side::Long,
        entry,
        stop,
        target,
        is_event: true,
        trigger: format!("event burst {age_min}min old (window {}min)", pb.event_window_min),
    })
}
