use std::sync::Arc;
use tracing::debug;

use bedwatch_domain::{Observation, PipelineError};
use bedwatch_forecast::{NormalizedHistory, normalize, normalize_history};
use bedwatch_ports::TelemetryStore;

/// Reads raw samples and turns them into validated observations.
#[derive(Clone)]
pub struct DataAcquisitionAgent {
    store: Arc<dyn TelemetryStore>,
}

impl DataAcquisitionAgent {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// Most recent sample only. No retries.
    pub async fn acquire(&self, department_id: &str) -> Result<Observation, PipelineError> {
        let samples = self
            .store
            .get_latest_samples(department_id, 1)
            .await
            .map_err(PipelineError::from_read)?;
        let sample = samples
            .first()
            .ok_or_else(|| PipelineError::NoData(department_id.to_string()))?;
        normalize(sample)
    }

    /// Up to `window` samples, newest first.
    pub async fn acquire_history(
        &self,
        department_id: &str,
        window: usize,
    ) -> Result<NormalizedHistory, PipelineError> {
        let samples = self
            .store
            .get_latest_samples(department_id, window.max(1))
            .await
            .map_err(PipelineError::from_read)?;
        let history = normalize_history(department_id, &samples)?;
        debug!(
            department = department_id,
            observations = history.observations.len(),
            rejected = history.rejected.len(),
            "Telemetry acquired"
        );
        Ok(history)
    }
}
