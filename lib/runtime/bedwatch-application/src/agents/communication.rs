use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use bedwatch_domain::{
    AgentKind, Alert, Department, Forecast, LogEntry, PipelineError, RiskAssessment, RunCommit,
};
use bedwatch_ports::{NotificationPort, TelemetryStore};

/// Alert for an assessment that needs one, `None` for `Normal`.
pub fn build_alert(
    forecast: &Forecast,
    assessment: &RiskAssessment,
    created_at: DateTime<Utc>,
) -> Option<Alert> {
    if !assessment.severity.requires_alert() {
        return None;
    }
    let message = assessment
        .alert_message
        .clone()
        .unwrap_or_else(|| format!("{} capacity risk", assessment.severity));
    Some(Alert {
        id: bedwatch_domain::new_id(),
        department_id: forecast.department_id.clone(),
        forecast_id: forecast.id.clone(),
        severity: assessment.severity,
        message,
        acknowledged: false,
        created_at,
    })
}

/// Persists the outcome of a run and fans alerts out to operators.
#[derive(Clone)]
pub struct CommunicationAgent {
    store: Arc<dyn TelemetryStore>,
    notifier: Arc<dyn NotificationPort>,
}

impl CommunicationAgent {
    pub fn new(store: Arc<dyn TelemetryStore>, notifier: Arc<dyn NotificationPort>) -> Self {
        Self { store, notifier }
    }

    /// Write the forecast, the alert (if any) and the run's log entries in
    /// one commit, then notify. Notification failures never fail the run.
    pub async fn publish(
        &self,
        forecast: &Forecast,
        assessment: &RiskAssessment,
        department: &Department,
        mut log_entries: Vec<LogEntry>,
    ) -> Result<Option<Alert>, PipelineError> {
        let now = Utc::now();
        let alert = build_alert(forecast, assessment, now);

        if let Some(alert) = &alert {
            log_entries.push(
                LogEntry::new(AgentKind::Communication, "alert_published")
                    .with("alert_id", alert.id.clone())
                    .with("forecast_id", forecast.id.clone())
                    .with("department_id", department.id.clone())
                    .with("severity", alert.severity.as_str())
                    .with("ratio", assessment.ratio)
                    .with("message", alert.message.clone())
                    .at(now),
            );
        }

        self.store
            .commit_run(RunCommit {
                forecast: forecast.clone(),
                alert: alert.clone(),
                log_entries,
            })
            .await
            .map_err(PipelineError::from_write)?;

        let Some(alert) = alert else {
            debug!(department = %department.id, "Normal risk, nothing to publish");
            return Ok(None);
        };

        if let Err(err) = self.notifier.send_alert(&alert, department).await {
            warn!(
                department = %department.id,
                alert_id = %alert.id,
                error = %format!("{err:#}"),
                "Alert persisted but notification failed"
            );
        }
        Ok(Some(alert))
    }
}
