//! Forecasting and risk rules for bedwatch.
//!
//! Everything here is pure: no I/O, no clocks. Callers pass `now`.

pub mod acquisition;
pub mod decision;
pub mod learning;
pub mod prediction;

pub use acquisition::{NormalizedHistory, normalize, normalize_history};
pub use decision::{CRITICAL_RATIO, WARNING_RATIO, classify_ratio, decide};
pub use learning::AccuracyTracker;
pub use prediction::{MODEL_VERSION, TrendPredictor};

#[cfg(test)]
mod learning_test;
#[cfg(test)]
mod prediction_test;
