//! Error taxonomy for the pipeline.
//!
//! - **PipelineError**: every way a run or an evaluation can fail
//! - **StoreError**: failures reported by telemetry store adapters

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::department::DepartmentId;
use crate::forecast::ForecastId;

/// Failures reported by a telemetry store adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable or the operation failed inside it
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured bound
    #[error("store call `{operation}` timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// A referenced record does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unavailable(format!("{err:#}"))
    }
}

/// Failures of a pipeline run or a learning evaluation. None is fatal to
/// the process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No sample has been recorded for the department
    #[error("no telemetry for department {0}")]
    NoData(DepartmentId),

    /// Sample violates `0 <= occupied <= total`, `total > 0`
    #[error("invalid sample for department {department_id}: {reason}")]
    InvalidSample {
        department_id: DepartmentId,
        reason: String,
    },

    /// Department is not known to the store
    #[error("unknown department {0}")]
    UnknownDepartment(DepartmentId),

    /// Actual observation predates the forecast target
    #[error("forecast {forecast_id} targets {target_for}, actual recorded at {recorded_at}")]
    PrematureEvaluation {
        forecast_id: ForecastId,
        target_for: DateTime<Utc>,
        recorded_at: DateTime<Utc>,
    },

    /// Actual observation belongs to another department
    #[error("forecast {forecast_id} is for {expected}, actual is for {actual}")]
    Mismatch {
        forecast_id: ForecastId,
        expected: DepartmentId,
        actual: DepartmentId,
    },

    /// Store read failed
    #[error("store read failed: {0}")]
    StoreRead(String),

    /// Store write failed
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Store call exceeded its bound
    #[error("store call `{operation}` timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// A run for the department is already active
    #[error("run already in progress for department {0}")]
    RunInProgress(DepartmentId),

    /// Shutdown requested between stages
    #[error("run for department {0} cancelled by shutdown")]
    Cancelled(DepartmentId),
}

impl PipelineError {
    /// Map a store error raised while reading.
    pub fn from_read(err: StoreError) -> Self {
        match err {
            StoreError::Timeout { operation, elapsed } => Self::Timeout { operation, elapsed },
            other => Self::StoreRead(other.to_string()),
        }
    }

    /// Map a store error raised while writing.
    pub fn from_write(err: StoreError) -> Self {
        match err {
            StoreError::Timeout { operation, elapsed } => Self::Timeout { operation, elapsed },
            other => Self::Delivery(other.to_string()),
        }
    }

    /// Short machine-readable name, used in logs and run snapshots.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoData(_) => "no_data",
            Self::InvalidSample { .. } => "invalid_sample",
            Self::UnknownDepartment(_) => "unknown_department",
            Self::PrematureEvaluation { .. } => "premature_evaluation",
            Self::Mismatch { .. } => "mismatch",
            Self::StoreRead(_) => "store_read",
            Self::Delivery(_) => "delivery",
            Self::Timeout { .. } => "timeout",
            Self::RunInProgress(_) => "run_in_progress",
            Self::Cancelled(_) => "cancelled",
        }
    }
}
