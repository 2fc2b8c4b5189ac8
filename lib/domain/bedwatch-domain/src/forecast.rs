use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::department::DepartmentId;

pub type ForecastId = String;

/// Predicted occupancy for a department at `target_for`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub id: ForecastId,
    pub department_id: DepartmentId,
    pub forecasted_occupancy: u32,
    /// Capacity the forecast was clamped against.
    pub total_beds: u32,
    /// Within `[0, 1]`.
    pub confidence: f64,
    /// Projected ICU demand derived from the forecast.
    pub icu_beds: u32,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
    pub target_for: DateTime<Utc>,
}

impl Forecast {
    pub fn is_matured(&self, now: DateTime<Utc>) -> bool {
        self.target_for <= now
    }
}
