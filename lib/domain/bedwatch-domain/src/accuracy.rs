use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::department::DepartmentId;
use crate::forecast::ForecastId;

/// Outcome of comparing a matured forecast to the actual occupancy.
/// Written once per forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRecord {
    pub forecast_id: ForecastId,
    pub department_id: DepartmentId,
    pub actual_occupancy: u32,
    pub absolute_error: u32,
    pub running_accuracy: f64,
    pub evaluated_at: DateTime<Utc>,
}
