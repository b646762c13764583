// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Compute price changes (deltas) from consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3 — Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// Thresholds:  RSI > 70 => OVERBOUGHT,  RSI < 30 => OVERSOLD.
// =============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Compute the most recent RSI value for the given `closes` and `period`.
///
/// # Edge cases
/// - `period == 0` or `closes.len() < period + 1` => `None`.
/// - If average loss is zero (no down moves), RSI is clamped to 100.0.
pub fn calculate_rsi(closes: &[Decimal], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    // --- Price deltas --------------------------------------------------------
    let deltas: Vec<Decimal> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // --- Seed averages with SMA of first `period` deltas ---------------------
    let mut sum_gain = Decimal::ZERO;
    let mut sum_loss = Decimal::ZERO;
    for &d in &deltas[..period] {
        if d > Decimal::ZERO {
            sum_gain += d;
        } else {
            sum_loss += d.abs();
        }
    }

    let period_d = Decimal::from(period as u64);
    let mut avg_gain = sum_gain / period_d;
    let mut avg_loss = sum_loss / period_d;

    // --- Wilder's smoothing for subsequent deltas ----------------------------
    for &delta in &deltas[period..] {
        let gain = if delta > Decimal::ZERO { delta } else { Decimal::ZERO };
        let loss = if delta < Decimal::ZERO { delta.abs() } else { Decimal::ZERO };

        avg_gain = (avg_gain * (period_d - Decimal::ONE) + gain) / period_d;
        avg_loss = (avg_loss * (period_d - Decimal::ONE) + loss) / period_d;
    }

    if avg_loss.is_zero() {
        return Some(100.0);
    }

    let rs = (avg_gain / avg_loss).to_f64()?;
    Some(100.0 - 100.0 / (1.0 + rs))
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn closes(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|&v| Decimal::from(v)).collect()
    }

    #[test]
    fn rsi_period_zero() {
        assert!(calculate_rsi(&closes(&[100, 101, 102]), 0).is_none());
    }

    #[test]
    fn rsi_insufficient_data() {
        assert!(calculate_rsi(&closes(&[100, 101, 102]), 14).is_none());
    }

    #[test]
    fn rsi_all_gains_clamps_to_100() {
        let series: Vec<Decimal> = (0..20).map(|i| Decimal::from(100 + i)).collect();
        let rsi = calculate_rsi(&series, 14).unwrap();
        assert_eq!(rsi, 100.0);
    }

    #[test]
    fn rsi_all_losses_is_near_zero() {
        let series: Vec<Decimal> = (0..20).map(|i| Decimal::from(200 - i)).collect();
        let rsi = calculate_rsi(&series, 14).unwrap();
        assert!(rsi < 1.0, "expected RSI near 0, got {rsi}");
    }

    #[test]
    fn rsi_balanced_moves_near_50() {
        // Alternate +1 / -1 moves: gains and losses balance out.
        let mut series = vec![dec!(100)];
        for i in 0..30 {
            let last = *series.last().unwrap();
            series.push(if i % 2 == 0 { last + Decimal::ONE } else { last - Decimal::ONE });
        }
        let rsi = calculate_rsi(&series, 14).unwrap();
        assert!((rsi - 50.0).abs() < 10.0, "expected RSI near 50, got {rsi}");
    }

    #[test]
    fn rsi_bounded() {
        let series: Vec<Decimal> = (0..40)
            .map(|i| dec!(100) + Decimal::from(i % 7) - Decimal::from(i % 3))
            .collect();
        let rsi = calculate_rsi(&series, 14).unwrap();
        assert!((0.0..=100.0).contains(&rsi));
    }
}
