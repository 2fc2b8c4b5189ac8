use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use bedwatch_domain::{
    AccuracyRecord, AgentKind, DepartmentId, Forecast, LearningConfig, LogEntry, Observation,
    PipelineError,
};
use bedwatch_forecast::{AccuracyTracker, normalize};
use bedwatch_ports::TelemetryStore;

/// Outcome of one pass over matured forecasts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LearningReport {
    pub evaluated: usize,
    /// Matured, but no actual sample recorded at or after the target yet.
    pub pending: usize,
    pub failed: usize,
}

impl LearningReport {
    fn merge(&mut self, other: LearningReport) {
        self.evaluated += other.evaluated;
        self.pending += other.pending;
        self.failed += other.failed;
    }
}

/// Scores matured forecasts against what actually happened.
#[derive(Clone)]
pub struct LearningAgent {
    store: Arc<dyn TelemetryStore>,
    tracker: AccuracyTracker,
}

impl LearningAgent {
    pub fn new(store: Arc<dyn TelemetryStore>, config: &LearningConfig) -> Self {
        Self {
            store,
            tracker: AccuracyTracker::new(config),
        }
    }

    /// Score a single forecast against its actual observation.
    pub fn evaluate(
        &self,
        forecast: &Forecast,
        actual: &Observation,
        previous: Option<f64>,
        evaluated_at: DateTime<Utc>,
    ) -> Result<AccuracyRecord, PipelineError> {
        self.tracker.evaluate(forecast, actual, previous, evaluated_at)
    }

    /// Evaluate every matured forecast that has an actual. Departments run
    /// in parallel; within a department forecasts are taken in target order
    /// because each record chains on the previous running accuracy.
    pub async fn evaluate_matured(
        &self,
        now: DateTime<Utc>,
    ) -> Result<LearningReport, PipelineError> {
        let matured = self
            .store
            .get_matured_forecasts_pending_evaluation(now)
            .await
            .map_err(PipelineError::from_read)?;

        let mut by_department: BTreeMap<DepartmentId, Vec<Forecast>> = BTreeMap::new();
        for forecast in matured {
            by_department
                .entry(forecast.department_id.clone())
                .or_default()
                .push(forecast);
        }

        let mut tasks = JoinSet::new();
        for (department_id, mut forecasts) in by_department {
            forecasts.sort_by_key(|f| f.target_for);
            let agent = self.clone();
            tasks.spawn(async move {
                agent
                    .evaluate_department(&department_id, forecasts, now)
                    .await
            });
        }

        let mut report = LearningReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(department_report) => report.merge(department_report),
                Err(err) => warn!(error = %err, "Learning task aborted"),
            }
        }

        if report.evaluated > 0 || report.failed > 0 {
            info!(
                evaluated = report.evaluated,
                pending = report.pending,
                failed = report.failed,
                "Learning pass finished"
            );
        }
        Ok(report)
    }

    async fn evaluate_department(
        &self,
        department_id: &str,
        forecasts: Vec<Forecast>,
        now: DateTime<Utc>,
    ) -> LearningReport {
        let mut report = LearningReport::default();
        let mut previous = match self.store.latest_accuracy(department_id).await {
            Ok(previous) => previous,
            Err(err) => {
                warn!(department = department_id, error = %err, "Cannot read running accuracy");
                report.failed = forecasts.len();
                return report;
            }
        };

        for (index, forecast) in forecasts.iter().enumerate() {
            match self.evaluate_one(forecast, previous, now).await {
                Ok(Some(record)) => {
                    previous = Some(record.running_accuracy);
                    report.evaluated += 1;
                }
                Ok(None) => report.pending += 1,
                Err(err @ (PipelineError::InvalidSample { .. } | PipelineError::Mismatch { .. })) => {
                    warn!(
                        department = department_id,
                        forecast_id = %forecast.id,
                        error = %err,
                        "Skipping forecast evaluation"
                    );
                    report.failed += 1;
                }
                Err(err) => {
                    // Later records would chain on a stale accuracy.
                    warn!(
                        department = department_id,
                        forecast_id = %forecast.id,
                        error = %err,
                        "Learning stopped for department"
                    );
                    report.failed += forecasts.len() - index;
                    break;
                }
            }
        }
        report
    }

    async fn evaluate_one(
        &self,
        forecast: &Forecast,
        previous: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Option<AccuracyRecord>, PipelineError> {
        let Some(sample) = self
            .store
            .sample_at_or_after(&forecast.department_id, forecast.target_for)
            .await
            .map_err(PipelineError::from_read)?
        else {
            debug!(forecast_id = %forecast.id, "No actual yet");
            return Ok(None);
        };

        let actual = normalize(&sample)?;
        let record = self.evaluate(forecast, &actual, previous, now)?;
        self.store
            .append_accuracy_record(record.clone())
            .await
            .map_err(PipelineError::from_write)?;

        let entry = LogEntry::new(AgentKind::Learning, "forecast_evaluated")
            .with("forecast_id", record.forecast_id.clone())
            .with("department_id", record.department_id.clone())
            .with("forecasted_occupancy", forecast.forecasted_occupancy)
            .with("actual_occupancy", record.actual_occupancy)
            .with("absolute_error", record.absolute_error)
            .with("running_accuracy", record.running_accuracy)
            .at(now);
        if let Err(err) = self.store.append_log_entry(entry).await {
            warn!(forecast_id = %record.forecast_id, error = %err, "Accuracy log entry not written");
        }

        debug!(
            department = %record.department_id,
            forecast_id = %record.forecast_id,
            absolute_error = record.absolute_error,
            running_accuracy = record.running_accuracy,
            "Forecast evaluated"
        );
        Ok(Some(record))
    }
}
