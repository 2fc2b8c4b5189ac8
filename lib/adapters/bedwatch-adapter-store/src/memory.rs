//! In-memory telemetry store for tests, demos and the `memory` backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use bedwatch_domain::{
    AccuracyRecord, Alert, AlertFilter, Department, Forecast, LogEntry, RawSample, RunCommit,
    StoreError,
};
use bedwatch_ports::{StoreResult, TelemetryStore};

#[derive(Debug, Default)]
struct Tables {
    departments: HashMap<String, Department>,
    samples: Vec<RawSample>,
    forecasts: Vec<Forecast>,
    alerts: Vec<Alert>,
    accuracy: Vec<AccuracyRecord>,
    log: Vec<LogEntry>,
}

/// All tables sit behind one lock, so `commit_run` is atomic.
#[derive(Debug, Default)]
pub struct InMemoryTelemetryStore {
    tables: RwLock<Tables>,
}

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn forecasts(&self) -> Vec<Forecast> {
        self.tables.read().await.forecasts.clone()
    }

    pub async fn accuracy_records(&self) -> Vec<AccuracyRecord> {
        self.tables.read().await.accuracy.clone()
    }

    pub async fn log_entries(&self) -> Vec<LogEntry> {
        self.tables.read().await.log.clone()
    }
}

#[async_trait]
impl TelemetryStore for InMemoryTelemetryStore {
    async fn get_latest_samples(
        &self,
        department_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<RawSample>> {
        let tables = self.tables.read().await;
        let mut samples: Vec<RawSample> = tables
            .samples
            .iter()
            .filter(|s| s.department_id == department_id)
            .cloned()
            .collect();
        samples.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        samples.truncate(limit);
        Ok(samples)
    }

    async fn sample_at_or_after(
        &self,
        department_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RawSample>> {
        let tables = self.tables.read().await;
        Ok(tables
            .samples
            .iter()
            .filter(|s| s.department_id == department_id && s.recorded_at >= at)
            .min_by_key(|s| s.recorded_at)
            .cloned())
    }

    async fn append_sample(&self, sample: RawSample) -> StoreResult<()> {
        self.tables.write().await.samples.push(sample);
        Ok(())
    }

    async fn get_department(&self, department_id: &str) -> StoreResult<Option<Department>> {
        Ok(self
            .tables
            .read()
            .await
            .departments
            .get(department_id)
            .cloned())
    }

    async fn list_departments(&self) -> StoreResult<Vec<Department>> {
        let tables = self.tables.read().await;
        let mut departments: Vec<Department> = tables.departments.values().cloned().collect();
        departments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(departments)
    }

    async fn upsert_department(&self, department: Department) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .departments
            .insert(department.id.clone(), department);
        Ok(())
    }

    async fn append_forecast(&self, forecast: Forecast) -> StoreResult<()> {
        self.tables.write().await.forecasts.push(forecast);
        Ok(())
    }

    async fn append_alert(&self, alert: Alert) -> StoreResult<()> {
        self.tables.write().await.alerts.push(alert);
        Ok(())
    }

    async fn append_accuracy_record(&self, record: AccuracyRecord) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .accuracy
            .iter()
            .any(|existing| existing.forecast_id == record.forecast_id)
        {
            return Err(StoreError::Unavailable(format!(
                "forecast {} already evaluated",
                record.forecast_id
            )));
        }
        tables.accuracy.push(record);
        Ok(())
    }

    async fn append_log_entry(&self, entry: LogEntry) -> StoreResult<()> {
        self.tables.write().await.log.push(entry);
        Ok(())
    }

    async fn get_matured_forecasts_pending_evaluation(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Forecast>> {
        let tables = self.tables.read().await;
        let evaluated: HashSet<&str> = tables
            .accuracy
            .iter()
            .map(|r| r.forecast_id.as_str())
            .collect();
        let mut matured: Vec<Forecast> = tables
            .forecasts
            .iter()
            .filter(|f| f.is_matured(now) && !evaluated.contains(f.id.as_str()))
            .cloned()
            .collect();
        matured.sort_by(|a, b| a.target_for.cmp(&b.target_for));
        Ok(matured)
    }

    async fn latest_accuracy(&self, department_id: &str) -> StoreResult<Option<f64>> {
        let tables = self.tables.read().await;
        Ok(tables
            .accuracy
            .iter()
            .rev()
            .find(|r| r.department_id == department_id)
            .map(|r| r.running_accuracy))
    }

    async fn acknowledge_alert(&self, alert_id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let alert = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {alert_id}")))?;
        alert.acknowledged = true;
        Ok(())
    }

    async fn list_alerts(&self, filter: AlertFilter) -> StoreResult<Vec<Alert>> {
        let tables = self.tables.read().await;
        let mut alerts: Vec<Alert> = tables
            .alerts
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            alerts.truncate(limit);
        }
        Ok(alerts)
    }

    async fn recent_log_entries(&self, limit: usize) -> StoreResult<Vec<LogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.log.iter().rev().take(limit).cloned().collect())
    }

    async fn commit_run(&self, commit: RunCommit) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.forecasts.push(commit.forecast);
        if let Some(alert) = commit.alert {
            tables.alerts.push(alert);
        }
        tables.log.extend(commit.log_entries);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
