//! Bounded trend extrapolation over recent occupancy.

use chrono::{DateTime, TimeDelta, Utc};

use bedwatch_domain::{Forecast, ForecastConfig, Observation};

pub const MODEL_VERSION: &str = "trend-v1";

/// Confidence used when only one observation is available.
const SINGLE_SAMPLE_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct TrendPredictor {
    config: ForecastConfig,
}

impl TrendPredictor {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast from a newest-first history. `None` if the history is empty.
    pub fn predict(&self, history: &[Observation], now: DateTime<Utc>) -> Option<Forecast> {
        self.predict_calibrated(history, now, None)
    }

    /// Like [`predict`](Self::predict), scaling the trend confidence by the
    /// department's running accuracy when one is known.
    pub fn predict_calibrated(
        &self,
        history: &[Observation],
        now: DateTime<Utc>,
        running_accuracy: Option<f64>,
    ) -> Option<Forecast> {
        let latest = history.first()?;
        let total = latest.total_beds();
        let last = f64::from(latest.occupied_beds());

        let (forecast, confidence) = if history.len() == 1 {
            (last, SINGLE_SAMPLE_CONFIDENCE)
        } else {
            let deltas = deltas(history);
            let cap = (self.config.max_step_fraction * f64::from(total)).max(0.0);
            let trend = weighted_trend(&deltas).clamp(-cap, cap);

            let mut confidence =
                self.config.baseline_confidence - variance(&deltas) / f64::from(total);
            if let Some(accuracy) = running_accuracy {
                confidence *= accuracy.clamp(0.0, 1.0);
            }
            (
                last + trend,
                confidence.max(self.config.min_confidence).clamp(0.0, 1.0),
            )
        };

        let forecasted_occupancy = forecast.round().clamp(0.0, f64::from(total)) as u32;
        let icu_beds = (f64::from(forecasted_occupancy) * self.config.icu_fraction).round() as u32;
        let target_for = TimeDelta::try_hours(self.config.horizon_hours)
            .and_then(|horizon| now.checked_add_signed(horizon))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Some(Forecast {
            id: bedwatch_domain::new_id(),
            department_id: latest.department_id().to_string(),
            forecasted_occupancy,
            total_beds: total,
            confidence,
            icu_beds,
            model_version: MODEL_VERSION.to_string(),
            generated_at: now,
            target_for,
        })
    }
}

/// Period-over-period deltas, oldest first.
fn deltas(history: &[Observation]) -> Vec<f64> {
    let chronological: Vec<f64> = history
        .iter()
        .rev()
        .map(|obs| f64::from(obs.occupied_beds()))
        .collect();
    chronological.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Linearly weighted mean; the newest delta has the largest weight.
pub(crate) fn weighted_trend(deltas: &[f64]) -> f64 {
    let (sum, weights) = deltas
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, weights), (i, delta)| {
            let w = (i + 1) as f64;
            (sum + w * delta, weights + w)
        });
    if weights == 0.0 { 0.0 } else { sum / weights }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}
