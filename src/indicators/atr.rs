// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// ATR measures market volatility by decomposing the entire range of a bar.
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is then the smoothed average of TR using Wilder's method:
//   ATR_0   = SMA of first `period` TR values
//   ATR_t   = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// Default period: 14
// =============================================================================

use rust_decimal::Decimal;

use crate::market::Candle;

/// Compute the most recent ATR value from a slice of OHLCV candles using
/// Wilder's smoothing method.
///
/// # Arguments
/// - `candles` — slice of OHLCV candles (oldest first).
/// - `period`  — look-back window for the ATR calculation.
///
/// # Returns
/// `None` when `period` is zero or there are fewer than `period + 1` candles
/// (each True Range needs a previous candle).
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    // --- Step 1: True Range for each consecutive pair ------------------------
    let mut tr_values: Vec<Decimal> = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        let hl = high - low;
        let hc = (high - prev_close).abs();
        let lc = (low - prev_close).abs();

        tr_values.push(hl.max(hc).max(lc));
    }

    if tr_values.len() < period {
        return None;
    }

    // --- Step 2: Seed ATR with SMA of first `period` TR values ---------------
    let period_d = Decimal::from(period as u64);
    let seed: Decimal = tr_values[..period].iter().copied().sum::<Decimal>() / period_d;

    // --- Step 3: Wilder's smoothing for remaining TR values ------------------
    let mut atr = seed;
    for &tr in &tr_values[period..] {
        atr = (atr * (period_d - Decimal::ONE) + tr) / period_d;
    }

    Some(atr)
}

/// Convenience function: compute ATR with the standard 14-period default.
pub fn calculate(candles: &[Candle]) -> Option<Decimal> {
    calculate_atr(candles, 14)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Build a test candle with the given OHLC values.
    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle::new(0, open, high, low, close, dec!(100), 0)
    }

    #[test]
    fn atr_period_zero() {
        let candles = vec![candle(dec!(100), dec!(105), dec!(95), dec!(102)); 20];
        assert!(calculate_atr(&candles, 0).is_none());
    }

    #[test]
    fn atr_insufficient_data() {
        // Need period + 1 = 15 candles for period=14, only have 10.
        let candles = vec![candle(dec!(100), dec!(105), dec!(95), dec!(102)); 10];
        assert!(calculate_atr(&candles, 14).is_none());
    }

    #[test]
    fn atr_exact_minimum_data() {
        // period=3, need 4 candles to get 3 TR values.
        let candles = vec![
            candle(dec!(100), dec!(102), dec!(98), dec!(101)),
            candle(dec!(101), dec!(104), dec!(99), dec!(103)),
            candle(dec!(103), dec!(106), dec!(100), dec!(105)),
            candle(dec!(105), dec!(108), dec!(102), dec!(107)),
        ];
        let atr = calculate_atr(&candles, 3).unwrap();
        assert!(atr > Decimal::ZERO);
    }

    #[test]
    fn atr_constant_range() {
        // All candles have the same range (H-L=10), close at midpoint.
        // TR is constant so ATR converges to exactly 10.
        let mut candles = Vec::new();
        for _ in 0..30 {
            candles.push(candle(dec!(100), dec!(105), dec!(95), dec!(100)));
        }
        let atr = calculate_atr(&candles, 14).unwrap();
        assert_eq!(atr, dec!(10));
    }

    #[test]
    fn atr_true_range_uses_prev_close() {
        // Gap scenario: |H - prevClose| > H - L.
        let candles = vec![
            candle(dec!(100), dec!(105), dec!(95), dec!(95)), // close at low
            candle(dec!(110), dec!(115), dec!(108), dec!(112)), // gap up: |115-95|=20 > 7
            candle(dec!(112), dec!(118), dec!(110), dec!(115)),
            candle(dec!(115), dec!(120), dec!(113), dec!(118)),
        ];
        let atr = calculate_atr(&candles, 3).unwrap();
        assert!(atr > dec!(7), "ATR should reflect the gap, got {atr}");
    }

    #[test]
    fn atr_convenience_function() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                let base = Decimal::from(100 + i);
                candle(base, base + dec!(3), base - dec!(3), base + dec!(1))
            })
            .collect();
        assert_eq!(calculate_atr(&candles, 14), calculate(&candles));
    }
}
