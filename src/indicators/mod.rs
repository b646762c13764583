// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators the scanner feeds
// to the playbook evaluators. Every public function returns `Option<T>` so
// callers are forced to handle insufficient-data scenarios.
//
// Order-affecting outputs (ATR, VWAP, EMA) stay in `Decimal`; dimensionless
// ratios (RSI, Bollinger width) are `f64`.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod rsi;
pub mod vwap;
