use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::department::DepartmentId;
use crate::forecast::ForecastId;
use crate::risk::Severity;

pub type AlertId = String;

/// Operator-facing alert. `acknowledged` is the only mutable field and is
/// flipped by `TelemetryStore::acknowledge_alert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub department_id: DepartmentId,
    pub forecast_id: ForecastId,
    pub severity: Severity,
    pub message: String,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFilter {
    pub department_id: Option<DepartmentId>,
    pub unacknowledged_only: bool,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        if let Some(dept) = &self.department_id {
            if &alert.department_id != dept {
                return false;
            }
        }
        !(self.unacknowledged_only && alert.acknowledged)
    }
}
