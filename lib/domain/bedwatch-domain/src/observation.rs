use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::department::DepartmentId;
use crate::errors::PipelineError;

pub type SampleId = String;

/// Unvalidated occupancy row as written by upstream collaborators.
///
/// Counts are signed on purpose: the store keeps whatever was uploaded and
/// acquisition decides whether it is usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub id: SampleId,
    pub department_id: DepartmentId,
    pub occupied_beds: i64,
    pub total_beds: i64,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub admissions: Option<i64>,
    #[serde(default)]
    pub discharges: Option<i64>,
}

impl RawSample {
    pub fn new(
        department_id: impl Into<DepartmentId>,
        occupied_beds: i64,
        total_beds: i64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: crate::new_id(),
            department_id: department_id.into(),
            occupied_beds,
            total_beds,
            recorded_at,
            admissions: None,
            discharges: None,
        }
    }
}

/// One validated occupancy sample for a department.
///
/// Always satisfies `0 <= occupied_beds <= total_beds` and `total_beds > 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ObservationRepr", into = "ObservationRepr")]
pub struct Observation {
    department_id: DepartmentId,
    occupied_beds: u32,
    total_beds: u32,
    recorded_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(
        department_id: impl Into<DepartmentId>,
        occupied_beds: i64,
        total_beds: i64,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, PipelineError> {
        let department_id = department_id.into();
        let invalid = |reason: &str| PipelineError::InvalidSample {
            department_id: department_id.clone(),
            reason: format!("{reason} (occupied={occupied_beds}, total={total_beds})"),
        };

        if total_beds <= 0 {
            return Err(invalid("total beds must be positive"));
        }
        if occupied_beds < 0 {
            return Err(invalid("occupied beds is negative"));
        }
        if occupied_beds > total_beds {
            return Err(invalid("occupied beds exceeds capacity"));
        }
        let total = u32::try_from(total_beds).map_err(|_| invalid("total beds out of range"))?;
        let occupied =
            u32::try_from(occupied_beds).map_err(|_| invalid("occupied beds out of range"))?;

        Ok(Self {
            department_id,
            occupied_beds: occupied,
            total_beds: total,
            recorded_at,
        })
    }

    pub fn department_id(&self) -> &str {
        &self.department_id
    }

    pub fn occupied_beds(&self) -> u32 {
        self.occupied_beds
    }

    pub fn total_beds(&self) -> u32 {
        self.total_beds
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn occupancy_ratio(&self) -> f64 {
        f64::from(self.occupied_beds) / f64::from(self.total_beds)
    }
}

impl TryFrom<&RawSample> for Observation {
    type Error = PipelineError;

    fn try_from(sample: &RawSample) -> Result<Self, Self::Error> {
        Observation::new(
            sample.department_id.clone(),
            sample.occupied_beds,
            sample.total_beds,
            sample.recorded_at,
        )
    }
}

#[derive(Serialize, Deserialize)]
struct ObservationRepr {
    department_id: DepartmentId,
    occupied_beds: i64,
    total_beds: i64,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<ObservationRepr> for Observation {
    type Error = PipelineError;

    fn try_from(repr: ObservationRepr) -> Result<Self, Self::Error> {
        Observation::new(
            repr.department_id,
            repr.occupied_beds,
            repr.total_beds,
            repr.recorded_at,
        )
    }
}

impl From<Observation> for ObservationRepr {
    fn from(obs: Observation) -> Self {
        Self {
            department_id: obs.department_id,
            occupied_beds: i64::from(obs.occupied_beds),
            total_beds: i64::from(obs.total_beds),
            recorded_at: obs.recorded_at,
        }
    }
}
