//! SQLite telemetry store over an r2d2 connection pool.
//!
//! Calls run on the blocking pool. Timestamps are stored as epoch millis.
//!
//! Writes run in a transaction that rolls back instead of committing once the
//! write deadline has passed. A blocking call keeps running after its async
//! caller has given up on it.

mod rows;
mod schema;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

use bedwatch_domain::{
    AccuracyRecord, Alert, AlertFilter, Department, Forecast, LogEntry, RawSample, RunCommit,
    StoreError,
};
use bedwatch_ports::{StoreResult, TelemetryStore};

use rows::{
    alert_from_row, department_from_row, forecast_from_row, insert_accuracy_record, insert_alert,
    insert_forecast, insert_log_entry, log_entry_from_row, sample_from_row,
};

#[derive(Clone)]
pub struct SqliteTelemetryStore {
    pool: Pool<SqliteConnectionManager>,
    write_deadline: Duration,
}

impl SqliteTelemetryStore {
    /// `write_deadline` bounds every write from the moment it is issued.
    /// Lock waits give up at half of it.
    pub fn open(path: impl AsRef<Path>, pool_size: u32, write_deadline: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let busy_timeout = write_deadline / 2;
        let manager = SqliteConnectionManager::file(path)
            .with_init(move |conn| conn.busy_timeout(busy_timeout));
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .context("failed to build sqlite pool")?;

        let conn = pool.get().context("failed to get sqlite connection")?;
        schema::migrate(&conn).context("failed to migrate sqlite schema")?;

        info!(path = %path.display(), "SQLite telemetry store opened");
        Ok(Self {
            pool,
            write_deadline,
        })
    }

    pub fn write_deadline(&self) -> Duration {
        self.write_deadline
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().context("failed to get sqlite connection")?;
            f(&mut *conn)
        })
        .await
        .map_err(StoreError::unavailable)?;

        joined.map_err(|err| match err.downcast::<StoreError>() {
            Ok(store_err) => store_err,
            Err(other) => StoreError::from(other),
        })
    }

    /// Run `f` in a transaction that commits only if the write deadline has
    /// not passed.
    pub(crate) async fn with_tx<T, F>(&self, operation: &'static str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    {
        let budget = self.write_deadline;
        let deadline = Instant::now() + budget;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            commit_before(tx, deadline, operation, budget)?;
            Ok(value)
        })
        .await
    }
}

/// Dropping an uncommitted transaction rolls it back.
fn commit_before(
    tx: Transaction<'_>,
    deadline: Instant,
    operation: &'static str,
    budget: Duration,
) -> Result<()> {
    if Instant::now() >= deadline {
        return Err(StoreError::Timeout {
            operation,
            elapsed: budget,
        }
        .into());
    }
    tx.commit()?;
    Ok(())
}

#[async_trait]
impl TelemetryStore for SqliteTelemetryStore {
    async fn get_latest_samples(
        &self,
        department_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<RawSample>> {
        let department_id = department_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, department_id, occupied_beds, total_beds, recorded_at, admissions, discharges
                 FROM bed_status WHERE department_id = ?1
                 ORDER BY recorded_at DESC LIMIT ?2",
            )?;
            let samples = stmt
                .query_map(params![department_id, limit as i64], sample_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(samples)
        })
        .await
    }

    async fn sample_at_or_after(
        &self,
        department_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RawSample>> {
        let department_id = department_id.to_string();
        self.with_conn(move |conn| {
            let sample = conn
                .query_row(
                    "SELECT id, department_id, occupied_beds, total_beds, recorded_at, admissions, discharges
                     FROM bed_status WHERE department_id = ?1 AND recorded_at >= ?2
                     ORDER BY recorded_at ASC LIMIT 1",
                    params![department_id, at.timestamp_millis()],
                    sample_from_row,
                )
                .optional()?;
            Ok(sample)
        })
        .await
    }

    async fn append_sample(&self, sample: RawSample) -> StoreResult<()> {
        self.with_tx("append_sample", move |tx| {
            tx.execute(
                "INSERT INTO bed_status (id, department_id, occupied_beds, total_beds, recorded_at, admissions, discharges)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    sample.id,
                    sample.department_id,
                    sample.occupied_beds,
                    sample.total_beds,
                    sample.recorded_at.timestamp_millis(),
                    sample.admissions,
                    sample.discharges,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_department(&self, department_id: &str) -> StoreResult<Option<Department>> {
        let department_id = department_id.to_string();
        self.with_conn(move |conn| {
            let department = conn
                .query_row(
                    "SELECT id, name, total_beds FROM departments WHERE id = ?1",
                    params![department_id],
                    department_from_row,
                )
                .optional()?;
            Ok(department)
        })
        .await
    }

    async fn list_departments(&self) -> StoreResult<Vec<Department>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, total_beds FROM departments ORDER BY id")?;
            let departments = stmt
                .query_map([], department_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(departments)
        })
        .await
    }

    async fn upsert_department(&self, department: Department) -> StoreResult<()> {
        self.with_tx("upsert_department", move |tx| {
            tx.execute(
                "INSERT INTO departments (id, name, total_beds) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, total_beds = excluded.total_beds",
                params![department.id, department.name, department.total_beds],
            )?;
            Ok(())
        })
        .await
    }

    async fn append_forecast(&self, forecast: Forecast) -> StoreResult<()> {
        self.with_tx("append_forecast", move |tx| insert_forecast(tx, &forecast))
            .await
    }

    async fn append_alert(&self, alert: Alert) -> StoreResult<()> {
        self.with_tx("append_alert", move |tx| insert_alert(tx, &alert))
            .await
    }

    async fn append_accuracy_record(&self, record: AccuracyRecord) -> StoreResult<()> {
        self.with_tx("append_accuracy_record", move |tx| {
            insert_accuracy_record(tx, &record)
        })
        .await
    }

    async fn append_log_entry(&self, entry: LogEntry) -> StoreResult<()> {
        self.with_tx("append_log_entry", move |tx| insert_log_entry(tx, &entry))
            .await
    }

    async fn get_matured_forecasts_pending_evaluation(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Forecast>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.department_id, f.forecasted_occupancy, f.total_beds, f.confidence,
                        f.icu_beds, f.model_version, f.generated_at, f.target_for
                 FROM forecasts f
                 LEFT JOIN accuracy_records a ON a.forecast_id = f.id
                 WHERE f.target_for <= ?1 AND a.forecast_id IS NULL
                 ORDER BY f.target_for ASC",
            )?;
            let forecasts = stmt
                .query_map(params![now.timestamp_millis()], forecast_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(forecasts)
        })
        .await
    }

    async fn latest_accuracy(&self, department_id: &str) -> StoreResult<Option<f64>> {
        let department_id = department_id.to_string();
        self.with_conn(move |conn| {
            let accuracy = conn
                .query_row(
                    "SELECT running_accuracy FROM accuracy_records WHERE department_id = ?1
                     ORDER BY evaluated_at DESC, rowid DESC LIMIT 1",
                    params![department_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(accuracy)
        })
        .await
    }

    async fn acknowledge_alert(&self, alert_id: &str) -> StoreResult<()> {
        let alert_id = alert_id.to_string();
        self.with_tx("acknowledge_alert", move |tx| {
            let exists: Option<bool> = tx
                .query_row(
                    "SELECT acknowledged FROM alerts WHERE id = ?1",
                    params![alert_id],
                    |row| row.get(0),
                )
                .optional()?;
            match exists {
                None => Err(StoreError::NotFound(format!("alert {alert_id}")).into()),
                Some(true) => Ok(()),
                Some(false) => {
                    tx.execute(
                        "UPDATE alerts SET acknowledged = 1 WHERE id = ?1",
                        params![alert_id],
                    )?;
                    Ok(())
                }
            }
        })
        .await
    }

    async fn list_alerts(&self, filter: AlertFilter) -> StoreResult<Vec<Alert>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, department_id, forecast_id, severity, message, acknowledged, created_at
                 FROM alerts
                 WHERE (?1 IS NULL OR department_id = ?1) AND (?2 = 0 OR acknowledged = 0)
                 ORDER BY created_at DESC LIMIT ?3",
            )?;
            let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
            let alerts = stmt
                .query_map(
                    params![filter.department_id, filter.unacknowledged_only, limit],
                    alert_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(alerts)
        })
        .await
    }

    async fn recent_log_entries(&self, limit: usize) -> StoreResult<Vec<LogEntry>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT agent, action, metadata, timestamp FROM agent_logs ORDER BY seq DESC LIMIT ?1",
            )?;
            let entries = stmt
                .query_map(params![limit as i64], log_entry_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }

    async fn commit_run(&self, commit: RunCommit) -> StoreResult<()> {
        self.with_tx("commit_run", move |tx| {
            insert_forecast(tx, &commit.forecast)?;
            if let Some(alert) = &commit.alert {
                insert_alert(tx, alert)?;
            }
            for entry in &commit.log_entries {
                insert_log_entry(tx, entry)?;
            }
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
