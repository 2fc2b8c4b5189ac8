use chrono::{DateTime, Utc};
use tracing::debug;

use bedwatch_domain::{Forecast, ForecastConfig, Observation, PipelineError};
use bedwatch_forecast::TrendPredictor;

#[derive(Debug, Clone)]
pub struct PredictionAgent {
    predictor: TrendPredictor,
    calibrate: bool,
}

impl PredictionAgent {
    pub fn new(config: ForecastConfig, calibrate: bool) -> Self {
        Self {
            predictor: TrendPredictor::new(config),
            calibrate,
        }
    }

    /// Whether running accuracy feeds into confidence.
    pub fn calibrates(&self) -> bool {
        self.calibrate
    }

    pub fn predict(
        &self,
        department_id: &str,
        history: &[Observation],
        now: DateTime<Utc>,
        running_accuracy: Option<f64>,
    ) -> Result<Forecast, PipelineError> {
        let accuracy = running_accuracy.filter(|_| self.calibrate);
        let forecast = self
            .predictor
            .predict_calibrated(history, now, accuracy)
            .ok_or_else(|| PipelineError::NoData(department_id.to_string()))?;
        debug!(
            department = department_id,
            forecast_id = %forecast.id,
            forecasted = forecast.forecasted_occupancy,
            confidence = forecast.confidence,
            "Forecast generated"
        );
        Ok(forecast)
    }
}
