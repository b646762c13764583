// =============================================================================
// Playbook A — Breakout
// =============================================================================
//
// Trigger: the latest close breaks the high of the previous `lookback` bars
// AND the breakout bar's volume is at least `volume_mult` times the average
// volume over that lookback.
//
// Stop: `stop_atr_mult * ATR` below entry. No hard target — the position
// manager moves the stop to breakeven at `breakeven_r`, scales out at
// `scale_r`, and then trails by `trail_atr_mult * ATR`.
// =============================================================================

use rust_decimal::Decimal;

use crate::config::BotConfig;
use crate::market::MarketSnapshot;
use crate::types::{Playbook, Side};

use super::CandidateSignal;

pub fn evaluate(cfg: &BotConfig, snapshot: &MarketSnapshot) -> Option<CandidateSignal> {
    let pb = &cfg.playbook_a;
    if !pb.enabled {
        return None;
    }

    let candles = &snapshot.candles;
    // The breakout bar plus a full lookback window behind it.
    if candles.len() < pb.lookback + 1 {
        return None;
    }

    let (window, latest) = {
        let split = candles.len() - 1;
        (&candles[split - pb.lookback..split], &candles[split])
    };

    let prior_high = window.iter().map(|c| c.high).max()?;
    if latest.close <= prior_high {
        return None;
    }

    let avg_volume = window.iter().map(|c| c.volume).sum::<Decimal>()
        / Decimal::from(pb.lookback as u64);
    if avg_volume.is_zero() || latest.volume < pb.volume_mult * avg_volume {
        return None;
    }

    if snapshot.atr <= Decimal::ZERO {
        return None;
    }

    let entry = snapshot.price;
    let stop = entry - pb.stop_atr_mult * snapshot.atr;

    Some(CandidateSignal {
        symbol: snapshot.symbol.clone(),
        playbook: Playbook::Breakout,
        side: Side::Long,
        entry,
        stop,
        target: None,
        is_event: false,
        trigger: format!(
            "close {} broke {}-bar high {} on {}x volume",
            latest.close, pb.lookback, prior_high, pb.volume_mult
        ),
    })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use rust_decimal_macros::dec;

    fn breakout_snapshot() -> MarketSnapshot {
        let mut candles = flat_candles(40);
        let last = candles.last_mut().unwrap();
        last.close = dec!(105);
        last.high = dec!(106);
        last.volume = dec!(200); // 2x the flat-volume average of 100
        let mut snap = snapshot("BTCUSDT", candles);
        snap.price = dec!(105);
        snap.atr = dec!(2);
        snap
    }

    #[test]
    fn fires_on_breakout_with_volume() {
        let cfg = BotConfig::default();
        let candidate = evaluate(&cfg, &breakout_snapshot()).unwrap();
        assert_eq!(candidate.playbook, Playbook::Breakout);
        assert_eq!(candidate.entry, dec!(105));
        // stop = 105 - 1.2 * 2 = 102.6
        assert_eq!(candidate.stop, dec!(102.6));
        assert_eq!(candidate.target, None);
    }

    #[test]
    fn requires_volume_confirmation() {
        let cfg = BotConfig::default();
        let mut snap = breakout_snapshot();
        snap.candles.last_mut().unwrap().volume = dec!(120); // below 1.5x avg
        assert!(evaluate(&cfg, &snap).is_none());
    }

    #[test]
    fn requires_close_beyond_prior_high() {
        let cfg = BotConfig::default();
        let mut snap = breakout_snapshot();
        snap.candles.last_mut().unwrap().close = dec!(101); // == prior high
        assert!(evaluate(&cfg, &snap).is_none());
    }

    #[test]
    fn respects_enable_flag() {
        let mut cfg = BotConfig::default();
        cfg.playbook_a.enabled = false;
        assert!(evaluate(&cfg, &breakout_snapshot()).is_none());
    }

    #[test]
    fn needs_full_lookback_history() {
        let cfg = BotConfig::default();
        let mut snap = breakout_snapshot();
        snap.candles.truncate(10); // fewer than lookback + 1
        assert!(evaluate(&cfg, &snap).is_none());
    }
}
