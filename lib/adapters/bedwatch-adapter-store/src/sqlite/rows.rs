use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use serde_json::{Map, Value};

use bedwatch_domain::{
    AccuracyRecord, AgentKind, Alert, Department, Forecast, LogEntry, RawSample, Severity,
};

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

pub fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<RawSample> {
    Ok(RawSample {
        id: row.get(0)?,
        department_id: row.get(1)?,
        occupied_beds: row.get(2)?,
        total_beds: row.get(3)?,
        recorded_at: timestamp(row, 4)?,
        admissions: row.get(5)?,
        discharges: row.get(6)?,
    })
}

pub fn department_from_row(row: &Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: row.get(0)?,
        name: row.get(1)?,
        total_beds: row.get(2)?,
    })
}

pub fn forecast_from_row(row: &Row<'_>) -> rusqlite::Result<Forecast> {
    Ok(Forecast {
        id: row.get(0)?,
        department_id: row.get(1)?,
        forecasted_occupancy: row.get(2)?,
        total_beds: row.get(3)?,
        confidence: row.get(4)?,
        icu_beds: row.get(5)?,
        model_version: row.get(6)?,
        generated_at: timestamp(row, 7)?,
        target_for: timestamp(row, 8)?,
    })
}

pub fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let severity: String = row.get(3)?;
    Ok(Alert {
        id: row.get(0)?,
        department_id: row.get(1)?,
        forecast_id: row.get(2)?,
        severity: severity
            .parse::<Severity>()
            .map_err(|e| conversion_error(3, e))?,
        message: row.get(4)?,
        acknowledged: row.get(5)?,
        created_at: timestamp(row, 6)?,
    })
}

pub fn log_entry_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    let agent: String = row.get(0)?;
    let metadata: String = row.get(2)?;
    let metadata: Map<String, Value> =
        serde_json::from_str(&metadata).map_err(|e| conversion_error(2, e.to_string()))?;
    Ok(LogEntry {
        agent: agent
            .parse::<AgentKind>()
            .map_err(|e| conversion_error(0, e))?,
        action: row.get(1)?,
        metadata,
        timestamp: timestamp(row, 3)?,
    })
}

pub fn insert_forecast(conn: &Connection, forecast: &Forecast) -> Result<()> {
    conn.execute(
        "INSERT INTO forecasts (id, department_id, forecasted_occupancy, total_beds, confidence,
                                icu_beds, model_version, generated_at, target_for)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            forecast.id,
            forecast.department_id,
            forecast.forecasted_occupancy,
            forecast.total_beds,
            forecast.confidence,
            forecast.icu_beds,
            forecast.model_version,
            forecast.generated_at.timestamp_millis(),
            forecast.target_for.timestamp_millis(),
        ],
    )
    .with_context(|| format!("failed to insert forecast {}", forecast.id))?;
    Ok(())
}

pub fn insert_alert(conn: &Connection, alert: &Alert) -> Result<()> {
    conn.execute(
        "INSERT INTO alerts (id, department_id, forecast_id, severity, message, acknowledged, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            alert.id,
            alert.department_id,
            alert.forecast_id,
            alert.severity.as_str(),
            alert.message,
            alert.acknowledged,
            alert.created_at.timestamp_millis(),
        ],
    )
    .with_context(|| format!("failed to insert alert {}", alert.id))?;
    Ok(())
}

pub fn insert_accuracy_record(conn: &Connection, record: &AccuracyRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO accuracy_records (forecast_id, department_id, actual_occupancy,
                                       absolute_error, running_accuracy, evaluated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.forecast_id,
            record.department_id,
            record.actual_occupancy,
            record.absolute_error,
            record.running_accuracy,
            record.evaluated_at.timestamp_millis(),
        ],
    )
    .with_context(|| format!("failed to record accuracy for {}", record.forecast_id))?;
    Ok(())
}

pub fn insert_log_entry(conn: &Connection, entry: &LogEntry) -> Result<()> {
    let metadata = serde_json::to_string(&entry.metadata)?;
    conn.execute(
        "INSERT INTO agent_logs (agent, action, metadata, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.agent.as_str(),
            entry.action,
            metadata,
            entry.timestamp.timestamp_millis(),
        ],
    )
    .context("failed to insert log entry")?;
    Ok(())
}
