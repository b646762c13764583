// =============================================================================
// Volume-Weighted Average Price (VWAP)
// =============================================================================
//
// VWAP over a window of candles:
//   VWAP = Σ(typical_price_i * volume_i) / Σ(volume_i)
//   typical_price = (high + low + close) / 3
//
// The mean-reversion playbook measures deviation from the session VWAP, so
// the window is the trailing session slice of the analysis-interval candles.
// =============================================================================

use rust_decimal::Decimal;

use crate::market::Candle;

/// Compute VWAP over the trailing `bars` candles.
///
/// Returns `None` when there are no candles in the window or total volume is
/// zero.
pub fn calculate_vwap(candles: &[Candle], bars: usize) -> Option<Decimal> {
    if bars == 0 || candles.is_empty() {
        return None;
    }

    let start = candles.len().saturating_sub(bars);
    let window = &candles[start..];

    let three = Decimal::from(3u8);
    let mut pv_sum = Decimal::ZERO;
    let mut vol_sum = Decimal::ZERO;

    for c in window {
        let typical = (c.high + c.low + c.close) / three;
        pv_sum += typical * c.volume;
        vol_sum += c.volume;
    }

    if vol_sum.is_zero() {
        return None;
    }

    Some(pv_sum / vol_sum)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Candle {
        Candle::new(0, close, high, low, close, volume, 0)
    }

    #[test]
    fn vwap_empty_input() {
        assert!(calculate_vwap(&[], 10).is_none());
        assert!(calculate_vwap(&[candle(dec!(1), dec!(1), dec!(1), dec!(1))], 0).is_none());
    }

    #[test]
    fn vwap_zero_volume() {
        let candles = vec![candle(dec!(100), dec!(90), dec!(95), Decimal::ZERO); 5];
        assert!(calculate_vwap(&candles, 5).is_none());
    }

    #[test]
    fn vwap_single_price() {
        // All bars trade flat at 100: VWAP must be exactly 100.
        let candles = vec![candle(dec!(100), dec!(100), dec!(100), dec!(10)); 8];
        assert_eq!(calculate_vwap(&candles, 8).unwrap(), dec!(100));
    }

    #[test]
    fn vwap_weights_by_volume() {
        // One heavy bar at 200 against a light bar at 100 pulls VWAP up.
        let candles = vec![
            candle(dec!(100), dec!(100), dec!(100), dec!(1)),
            candle(dec!(200), dec!(200), dec!(200), dec!(9)),
        ];
        let vwap = calculate_vwap(&candles, 2).unwrap();
        assert_eq!(vwap, dec!(190));
    }

    #[test]
    fn vwap_uses_trailing_window_only() {
        let mut candles = vec![candle(dec!(50), dec!(50), dec!(50), dec!(100)); 10];
        candles.extend(vec![candle(dec!(100), dec!(100), dec!(100), dec!(10)); 5]);
        // Window of 5 sees only the 100s.
        assert_eq!(calculate_vwap(&candles, 5).unwrap(), dec!(100));
    }
}
