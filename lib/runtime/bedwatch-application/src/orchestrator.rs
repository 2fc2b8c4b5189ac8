//! Sequences the pipeline stages for one department run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};

use bedwatch_domain::{
    AgentKind, Alert, BedwatchConfig, Department, DepartmentId, Forecast, LogEntry, PipelineError,
    RiskAssessment,
};
use bedwatch_ports::{NotificationPort, TelemetryStore};

use crate::agents::{
    CommunicationAgent, DataAcquisitionAgent, DecisionAgent, LearningAgent, LearningReport,
    PredictionAgent,
};
use crate::bounded_store::BoundedStore;
use crate::run_state::RunTracker;
use crate::shutdown::ShutdownSignal;

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub department_id: DepartmentId,
    pub forecast: Forecast,
    pub assessment: RiskAssessment,
    pub alert: Option<Alert>,
    /// Older samples dropped from the history as invalid.
    pub rejected_samples: usize,
    pub latest_sample_at: DateTime<Utc>,
}

pub struct Orchestrator {
    store: Arc<dyn TelemetryStore>,
    acquisition: DataAcquisitionAgent,
    prediction: PredictionAgent,
    decision: DecisionAgent,
    communication: CommunicationAgent,
    learning: LearningAgent,
    tracker: RunTracker,
    shutdown: ShutdownSignal,
    history_window: usize,
}

impl Orchestrator {
    /// Every store call made through the orchestrator is bounded by
    /// `config.store.timeout()`.
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        notifier: Arc<dyn NotificationPort>,
        config: &BedwatchConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        let store: Arc<dyn TelemetryStore> =
            Arc::new(BoundedStore::new(store, config.store.timeout()));
        Self {
            acquisition: DataAcquisitionAgent::new(store.clone()),
            prediction: PredictionAgent::new(
                config.forecast.clone(),
                config.learning.calibrate_confidence,
            ),
            decision: DecisionAgent,
            communication: CommunicationAgent::new(store.clone(), notifier),
            learning: LearningAgent::new(store.clone(), &config.learning),
            tracker: RunTracker::new(),
            shutdown,
            history_window: config.forecast.history_window,
            store,
        }
    }

    /// The time-bounded store.
    pub fn store(&self) -> &Arc<dyn TelemetryStore> {
        &self.store
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    pub async fn departments(&self) -> Result<Vec<Department>, PipelineError> {
        self.store
            .list_departments()
            .await
            .map_err(PipelineError::from_read)
    }

    /// Timestamp of the newest raw sample, valid or not.
    pub async fn latest_sample_at(
        &self,
        department_id: &str,
    ) -> Result<Option<DateTime<Utc>>, PipelineError> {
        let samples = self
            .store
            .get_latest_samples(department_id, 1)
            .await
            .map_err(PipelineError::from_read)?;
        Ok(samples.first().map(|s| s.recorded_at))
    }

    /// Run the pipeline once for a department. Rejected with
    /// `RunInProgress` while another run for it is active.
    pub async fn trigger(&self, department_id: &str) -> Result<RunReport, PipelineError> {
        let guard = self.tracker.try_begin(department_id)?;
        let started = Instant::now();
        let span = info_span!("pipeline_run", department = department_id);

        match self.execute(department_id).instrument(span).await {
            Ok(report) => {
                guard.succeed();
                info!(
                    department = department_id,
                    forecast_id = %report.forecast.id,
                    forecasted = report.forecast.forecasted_occupancy,
                    severity = %report.assessment.severity,
                    alert = report.alert.is_some(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Pipeline run succeeded"
                );
                Ok(report)
            }
            Err(err) => {
                let consecutive_failures = guard.fail(&err);
                warn!(
                    department = department_id,
                    kind = err.kind(),
                    error = %err,
                    consecutive_failures,
                    "Pipeline run failed"
                );
                Err(err)
            }
        }
    }

    /// One learning pass. Does not take any department's run slot.
    pub async fn evaluate_matured(
        &self,
        now: DateTime<Utc>,
    ) -> Result<LearningReport, PipelineError> {
        self.learning.evaluate_matured(now).await
    }

    fn ensure_running(&self, department_id: &str) -> Result<(), PipelineError> {
        if self.shutdown.is_triggered() {
            return Err(PipelineError::Cancelled(department_id.to_string()));
        }
        Ok(())
    }

    async fn execute(&self, department_id: &str) -> Result<RunReport, PipelineError> {
        let department = self
            .store
            .get_department(department_id)
            .await
            .map_err(PipelineError::from_read)?
            .ok_or_else(|| PipelineError::UnknownDepartment(department_id.to_string()))?;

        let history = self
            .acquisition
            .acquire_history(department_id, self.history_window)
            .await?;
        let latest = history.latest().clone();
        let mut log_entries = vec![
            LogEntry::new(AgentKind::Acquisition, "telemetry_acquired")
                .with("department_id", department_id)
                .with("observations", history.observations.len())
                .with("rejected", history.rejected.len())
                .with("occupied_beds", latest.occupied_beds())
                .with("total_beds", latest.total_beds())
                .with("recorded_at", latest.recorded_at().to_rfc3339()),
        ];
        self.ensure_running(department_id)?;

        let running_accuracy = if self.prediction.calibrates() {
            self.store
                .latest_accuracy(department_id)
                .await
                .map_err(PipelineError::from_read)?
        } else {
            None
        };
        let forecast = self.prediction.predict(
            department_id,
            &history.observations,
            Utc::now(),
            running_accuracy,
        )?;
        log_entries.push(
            LogEntry::new(AgentKind::Prediction, "forecast_generated")
                .with("forecast_id", forecast.id.clone())
                .with("forecasted_occupancy", forecast.forecasted_occupancy)
                .with("confidence", forecast.confidence)
                .with("icu_beds", forecast.icu_beds)
                .with("model_version", forecast.model_version.clone())
                .with("target_for", forecast.target_for.to_rfc3339()),
        );
        self.ensure_running(department_id)?;

        let assessment = self.decision.decide(&forecast, latest.total_beds());
        log_entries.push(
            LogEntry::new(AgentKind::Decision, "risk_evaluated")
                .with("forecast_id", forecast.id.clone())
                .with("ratio", assessment.ratio)
                .with("severity", assessment.severity.as_str()),
        );
        self.ensure_running(department_id)?;

        let alert = self
            .communication
            .publish(&forecast, &assessment, &department, log_entries)
            .await?;

        Ok(RunReport {
            department_id: department_id.to_string(),
            forecast,
            assessment,
            alert,
            rejected_samples: history.rejected.len(),
            latest_sample_at: latest.recorded_at(),
        })
    }
}
