use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use bedwatch_adapter_store::InMemoryTelemetryStore;
use bedwatch_domain::{
    AccuracyRecord, Alert, AlertFilter, BedwatchConfig, Department, Forecast, LogEntry, RawSample,
    RunCommit, StoreError,
};
use bedwatch_ports::{NotificationPort, StoreResult, TelemetryStore};

use crate::orchestrator::Orchestrator;
use crate::shutdown::ShutdownSignal;

/// In-memory store with switchable faults.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryTelemetryStore,
    fail_commits: AtomicBool,
    fail_sample_reads: AtomicBool,
    fail_accuracy_writes_for: Mutex<Option<String>>,
    sample_read_delay_ms: AtomicU64,
    sample_read_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FlakyStore {
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sample_reads(&self, fail: bool) {
        self.fail_sample_reads.store(fail, Ordering::SeqCst);
    }

    /// Accuracy records for `department_id` are refused.
    pub fn fail_accuracy_writes_for(&self, department_id: &str) {
        *self.fail_accuracy_writes_for.lock().unwrap() = Some(department_id.to_string());
    }

    pub fn delay_sample_reads(&self, delay: std::time::Duration) {
        self.sample_read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sample reads block until the returned semaphore gets a permit.
    pub fn gate_sample_reads(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.sample_read_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    async fn before_sample_read(&self) -> StoreResult<()> {
        if self.fail_sample_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("connection reset"));
        }
        let gate = self.sample_read_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }
        let delay = self.sample_read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for FlakyStore {
    async fn get_latest_samples(
        &self,
        department_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<RawSample>> {
        self.before_sample_read().await?;
        self.inner.get_latest_samples(department_id, limit).await
    }

    async fn sample_at_or_after(
        &self,
        department_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RawSample>> {
        self.inner.sample_at_or_after(department_id, at).await
    }

    async fn append_sample(&self, sample: RawSample) -> StoreResult<()> {
        self.inner.append_sample(sample).await
    }

    async fn get_department(&self, department_id: &str) -> StoreResult<Option<Department>> {
        self.inner.get_department(department_id).await
    }

    async fn list_departments(&self) -> StoreResult<Vec<Department>> {
        self.inner.list_departments().await
    }

    async fn upsert_department(&self, department: Department) -> StoreResult<()> {
        self.inner.upsert_department(department).await
    }

    async fn append_forecast(&self, forecast: Forecast) -> StoreResult<()> {
        self.inner.append_forecast(forecast).await
    }

    async fn append_alert(&self, alert: Alert) -> StoreResult<()> {
        self.inner.append_alert(alert).await
    }

    async fn append_accuracy_record(&self, record: AccuracyRecord) -> StoreResult<()> {
        let refused = self.fail_accuracy_writes_for.lock().unwrap().clone();
        if refused.as_deref() == Some(record.department_id.as_str()) {
            return Err(StoreError::unavailable("read-only replica"));
        }
        self.inner.append_accuracy_record(record).await
    }

    async fn append_log_entry(&self, entry: LogEntry) -> StoreResult<()> {
        self.inner.append_log_entry(entry).await
    }

    async fn get_matured_forecasts_pending_evaluation(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Forecast>> {
        self.inner.get_matured_forecasts_pending_evaluation(now).await
    }

    async fn latest_accuracy(&self, department_id: &str) -> StoreResult<Option<f64>> {
        self.inner.latest_accuracy(department_id).await
    }

    async fn acknowledge_alert(&self, alert_id: &str) -> StoreResult<()> {
        self.inner.acknowledge_alert(alert_id).await
    }

    async fn list_alerts(&self, filter: AlertFilter) -> StoreResult<Vec<Alert>> {
        self.inner.list_alerts(filter).await
    }

    async fn recent_log_entries(&self, limit: usize) -> StoreResult<Vec<LogEntry>> {
        self.inner.recent_log_entries(limit).await
    }

    async fn commit_run(&self, commit: RunCommit) -> StoreResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("disk full"));
        }
        self.inner.commit_run(commit).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Alert>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Alert> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn send_alert(&self, alert: &Alert, _department: &Department) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("pager offline");
        }
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn harness(shutdown: ShutdownSignal) -> Harness {
    harness_with(BedwatchConfig::default(), shutdown)
}

pub fn harness_with(config: BedwatchConfig, shutdown: ShutdownSignal) -> Harness {
    let store = Arc::new(FlakyStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        notifier.clone(),
        &config,
        shutdown,
    ));
    Harness {
        store,
        notifier,
        orchestrator,
    }
}

/// Register a department and record hourly samples ending an hour ago.
pub async fn seed(
    store: &FlakyStore,
    department_id: &str,
    total: i64,
    occupied_oldest_first: &[i64],
) {
    store
        .upsert_department(Department::new(
            department_id,
            department_id.to_uppercase(),
            total as u32,
        ))
        .await
        .unwrap();
    let now = Utc::now();
    let count = occupied_oldest_first.len() as i64;
    for (i, occupied) in occupied_oldest_first.iter().enumerate() {
        let at = now - Duration::hours(count - i as i64);
        store
            .append_sample(RawSample::new(department_id, *occupied, total, at))
            .await
            .unwrap();
    }
}
