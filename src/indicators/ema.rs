// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period` closes.
// =============================================================================

use rust_decimal::Decimal;

/// Compute the most recent EMA value for the given `closes` and `period`.
///
/// Returns `None` when the input is too short or the period is zero.
pub fn calculate_ema(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let period_d = Decimal::from(period as u64);
    let multiplier = Decimal::TWO / (period_d + Decimal::ONE);

    // Seed: SMA of the first `period` values.
    let mut ema = closes[..period].iter().copied().sum::<Decimal>() / period_d;

    for &close in &closes[period..] {
        ema = close * multiplier + ema * (Decimal::ONE - multiplier);
    }

    Some(ema)
}

/// Simple moving average over the trailing `period` closes.
pub fn calculate_sma(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().copied().sum::<Decimal>() / Decimal::from(period as u64))
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[dec!(1), dec!(2)], 0).is_none());
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(calculate_ema(&[dec!(1), dec!(2)], 5).is_none());
    }

    #[test]
    fn ema_of_constant_series_is_constant() {
        let series = vec![dec!(50); 30];
        assert_eq!(calculate_ema(&series, 9).unwrap(), dec!(50));
    }

    #[test]
    fn ema_tracks_rising_series() {
        let series: Vec<Decimal> = (1..=30).map(Decimal::from).collect();
        let ema = calculate_ema(&series, 9).unwrap();
        let sma = calculate_sma(&series, 9).unwrap();
        // EMA weights recent prices more, so it sits above the trailing SMA's
        // midpoint but below the latest close.
        assert!(ema > dec!(20));
        assert!(ema < dec!(30));
        assert!(sma > dec!(20));
    }

    #[test]
    fn sma_exact_window() {
        let series = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        assert_eq!(calculate_sma(&series, 4).unwrap(), dec!(2.5));
        // Trailing window only.
        assert_eq!(calculate_sma(&series, 2).unwrap(), dec!(3.5));
    }
}
