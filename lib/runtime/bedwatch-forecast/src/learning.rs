use chrono::{DateTime, Utc};

use bedwatch_domain::{AccuracyRecord, Forecast, LearningConfig, Observation, PipelineError};

/// Exponentially smoothed forecast accuracy.
#[derive(Debug, Clone)]
pub struct AccuracyTracker {
    smoothing: f64,
}

impl AccuracyTracker {
    pub fn new(config: &LearningConfig) -> Self {
        Self {
            smoothing: config.smoothing,
        }
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    /// Score a matured forecast. `previous` is the department's running
    /// accuracy; `None` seeds the series from this evaluation alone.
    pub fn evaluate(
        &self,
        forecast: &Forecast,
        actual: &Observation,
        previous: Option<f64>,
        evaluated_at: DateTime<Utc>,
    ) -> Result<AccuracyRecord, PipelineError> {
        if actual.department_id() != forecast.department_id {
            return Err(PipelineError::Mismatch {
                forecast_id: forecast.id.clone(),
                expected: forecast.department_id.clone(),
                actual: actual.department_id().to_string(),
            });
        }
        if actual.recorded_at() < forecast.target_for {
            return Err(PipelineError::PrematureEvaluation {
                forecast_id: forecast.id.clone(),
                target_for: forecast.target_for,
                recorded_at: actual.recorded_at(),
            });
        }

        let absolute_error = forecast.forecasted_occupancy.abs_diff(actual.occupied_beds());
        let score = 1.0 - f64::from(absolute_error) / f64::from(actual.total_beds());
        // Only the running value is bounded; a miss larger than capacity
        // still pulls it down.
        let running_accuracy = match previous {
            Some(prev) => prev * (1.0 - self.smoothing) + score * self.smoothing,
            None => score,
        }
        .clamp(0.0, 1.0);

        Ok(AccuracyRecord {
            forecast_id: forecast.id.clone(),
            department_id: forecast.department_id.clone(),
            actual_occupancy: actual.occupied_beds(),
            absolute_error,
            running_accuracy,
            evaluated_at,
        })
    }
}
