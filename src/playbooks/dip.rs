// =============================================================================
// Playbook D — Dip
// =============================================================================
//
// Buys a stretch below the short moving average: price at least
// `dip_atr_mult * ATR` under the short EMA. Stop `stop_atr_mult * ATR` below
// entry, hard target at `target_r` times the stop distance.
// =============================================================================

use rust_decimal::Decimal;

use crate::config::BotConfig;
use crate::market::MarketSnapshot;
use crate::types::{Playbook, Side};

use super::{r_multiple, CandidateSignal};

pub fn evaluate(cfg: &BotConfig, snapshot: &MarketSnapshot) -> Option<CandidateSignal> {
    let pb = &cfg.playbook_d;
    if !pb.enabled {
        return None;
    }

    if snapshot.atr <= Decimal::ZERO || snapshot.ema_short <= Decimal::ZERO {
        return None;
    }

    let stretch = snapshot.ema_short - snapshot.price;
    let required = pb.dip_atr_mult * snapshot.atr;
    if stretch < required {
        return None;
    }

    let entry = snapshot.price;
    let stop = entry - pb.stop_atr_mult * snapshot.atr;
    let target = entry + r_multiple(entry - stop, pb.target_r);

    Some(CandidateSignal {
        symbol: snapshot.symbol.clone(),
        playbook: Playbook::Dip,
        side: Side::Long,
        entry,
        stop,
        target: Some(target),
        is_event: false,
        trigger: format!(
            "price {} stretched {} below short MA {}",
            entry, stretch, snapshot.ema_short
        ),
    })
}
