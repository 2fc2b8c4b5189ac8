//! Time-bounded view of a telemetry store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bedwatch_domain::{
    AccuracyRecord, Alert, AlertFilter, Department, Forecast, LogEntry, RawSample, RunCommit,
    StoreError,
};
use bedwatch_ports::{StoreResult, TelemetryStore};

/// Wraps every call of the inner store in a fixed timeout. An elapsed
/// bound becomes `StoreError::Timeout`.
#[derive(Clone)]
pub struct BoundedStore {
    inner: Arc<dyn TelemetryStore>,
    timeout: Duration,
}

impl BoundedStore {
    pub fn new(inner: Arc<dyn TelemetryStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                elapsed: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl TelemetryStore for BoundedStore {
    async fn get_latest_samples(
        &self,
        department_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<RawSample>> {
        self.bounded(
            "get_latest_samples",
            self.inner.get_latest_samples(department_id, limit),
        )
        .await
    }

    async fn sample_at_or_after(
        &self,
        department_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RawSample>> {
        self.bounded(
            "sample_at_or_after",
            self.inner.sample_at_or_after(department_id, at),
        )
        .await
    }

    async fn append_sample(&self, sample: RawSample) -> StoreResult<()> {
        self.bounded("append_sample", self.inner.append_sample(sample))
            .await
    }

    async fn get_department(&self, department_id: &str) -> StoreResult<Option<Department>> {
        self.bounded("get_department", self.inner.get_department(department_id))
            .await
    }

    async fn list_departments(&self) -> StoreResult<Vec<Department>> {
        self.bounded("list_departments", self.inner.list_departments())
            .await
    }

    async fn upsert_department(&self, department: Department) -> StoreResult<()> {
        self.bounded("upsert_department", self.inner.upsert_department(department))
            .await
    }

    async fn append_forecast(&self, forecast: Forecast) -> StoreResult<()> {
        self.bounded("append_forecast", self.inner.append_forecast(forecast))
            .await
    }

    async fn append_alert(&self, alert: Alert) -> StoreResult<()> {
        self.bounded("append_alert", self.inner.append_alert(alert))
            .await
    }

    async fn append_accuracy_record(&self, record: AccuracyRecord) -> StoreResult<()> {
        self.bounded(
            "append_accuracy_record",
            self.inner.append_accuracy_record(record),
        )
        .await
    }

    async fn append_log_entry(&self, entry: LogEntry) -> StoreResult<()> {
        self.bounded("append_log_entry", self.inner.append_log_entry(entry))
            .await
    }

    async fn get_matured_forecasts_pending_evaluation(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Forecast>> {
        self.bounded(
            "get_matured_forecasts_pending_evaluation",
            self.inner.get_matured_forecasts_pending_evaluation(now),
        )
        .await
    }

    async fn latest_accuracy(&self, department_id: &str) -> StoreResult<Option<f64>> {
        self.bounded("latest_accuracy", self.inner.latest_accuracy(department_id))
            .await
    }

    async fn acknowledge_alert(&self, alert_id: &str) -> StoreResult<()> {
        self.bounded("acknowledge_alert", self.inner.acknowledge_alert(alert_id))
            .await
    }

    async fn list_alerts(&self, filter: AlertFilter) -> StoreResult<Vec<Alert>> {
        self.bounded("list_alerts", self.inner.list_alerts(filter))
            .await
    }

    async fn recent_log_entries(&self, limit: usize) -> StoreResult<Vec<LogEntry>> {
        self.bounded("recent_log_entries", self.inner.recent_log_entries(limit))
            .await
    }

    async fn commit_run(&self, commit: RunCommit) -> StoreResult<()> {
        self.bounded("commit_run", self.inner.commit_run(commit))
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
