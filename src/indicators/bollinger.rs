// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ). The Band Width is the normalised distance:
// BBW = (upper - lower) / middle.
// =============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Decimal,
    pub middle: Decimal,
    pub lower: Decimal,
    /// (upper - lower) / middle, as a dimensionless fraction.
    pub width: f64,
}

/// Calculate Bollinger Bands over the trailing `period` closes.
///
/// Returns `None` when there are fewer than `period` data points, the middle
/// band is zero, or the variance has no real square root.
pub fn calculate_bollinger(
    closes: &[Decimal],
    period: usize,
    num_std: Decimal,
) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let period_d = Decimal::from(period as u64);
    let middle = window.iter().copied().sum::<Decimal>() / period_d;

    if middle.is_zero() {
        return None;
    }

    let variance = window
        .iter()
        .map(|x| (*x - middle) * (*x - middle))
        .sum::<Decimal>()
        / period_d;
    let std_dev = variance.sqrt()?;

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let width = ((upper - lower) / middle).to_f64()?;

    Some(BollingerBands {
        upper,
        middle,
        lower,
        width,
    })
}
