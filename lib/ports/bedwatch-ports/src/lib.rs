//! Ports consumed by the pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bedwatch_domain::{
    AccuracyRecord, Alert, AlertFilter, Department, Forecast, LogEntry, RawSample, RunCommit,
    StoreError,
};

pub type StoreResult<T> = Result<T, StoreError>;

/// Telemetry store. Everything is append-only except
/// `Alert::acknowledged`.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Newest first, at most `limit` samples.
    async fn get_latest_samples(&self, department_id: &str, limit: usize)
    -> StoreResult<Vec<RawSample>>;

    /// Oldest sample recorded at or after `at`.
    async fn sample_at_or_after(
        &self,
        department_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RawSample>>;

    async fn append_sample(&self, sample: RawSample) -> StoreResult<()>;

    async fn get_department(&self, department_id: &str) -> StoreResult<Option<Department>>;

    async fn list_departments(&self) -> StoreResult<Vec<Department>>;

    async fn upsert_department(&self, department: Department) -> StoreResult<()>;

    async fn append_forecast(&self, forecast: Forecast) -> StoreResult<()>;

    async fn append_alert(&self, alert: Alert) -> StoreResult<()>;

    async fn append_accuracy_record(&self, record: AccuracyRecord) -> StoreResult<()>;

    async fn append_log_entry(&self, entry: LogEntry) -> StoreResult<()>;

    /// Forecasts with `target_for <= now` and no accuracy record yet,
    /// ordered by `target_for`.
    async fn get_matured_forecasts_pending_evaluation(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Forecast>>;

    /// Running accuracy of the department's most recent evaluation.
    async fn latest_accuracy(&self, department_id: &str) -> StoreResult<Option<f64>>;

    /// Idempotent: acknowledging twice succeeds and changes nothing.
    /// `NotFound` if the alert does not exist.
    async fn acknowledge_alert(&self, alert_id: &str) -> StoreResult<()>;

    async fn list_alerts(&self, filter: AlertFilter) -> StoreResult<Vec<Alert>>;

    /// Newest first.
    async fn recent_log_entries(&self, limit: usize) -> StoreResult<Vec<LogEntry>>;

    /// Persist a finished run. Adapters that support transactions override
    /// this so the forecast, alert and log entries land together.
    async fn commit_run(&self, commit: RunCommit) -> StoreResult<()> {
        self.append_forecast(commit.forecast).await?;
        if let Some(alert) = commit.alert {
            self.append_alert(alert).await?;
        }
        for entry in commit.log_entries {
            self.append_log_entry(entry).await?;
        }
        Ok(())
    }

    /// Store name for logging.
    fn name(&self) -> &str;
}

/// Outbound delivery of alerts to operators.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn send_alert(&self, alert: &Alert, department: &Department) -> anyhow::Result<()>;
}

/// Notifier that drops everything.
#[derive(Debug, Clone, Default)]
pub struct NullNotifier;

#[async_trait]
impl NotificationPort for NullNotifier {
    async fn send_alert(&self, _alert: &Alert, _department: &Department) -> anyhow::Result<()> {
        Ok(())
    }
}
