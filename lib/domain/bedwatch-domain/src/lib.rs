//! Domain models and invariants.

pub mod accuracy;
pub mod activity;
pub mod alert;
pub mod config;
pub mod department;
pub mod errors;
pub mod forecast;
pub mod observation;
pub mod risk;

pub use accuracy::AccuracyRecord;
pub use activity::{AgentKind, LogEntry, RunCommit};
pub use alert::{Alert, AlertFilter, AlertId};
pub use config::{
    BedwatchConfig, DepartmentConfig, ForecastConfig, LearningConfig, NotificationChannelConfig,
    NotificationsConfig, ScheduleConfig, StoreBackend, StoreConfig, TriggerPolicy,
};
pub use department::{Department, DepartmentId};
pub use errors::{PipelineError, StoreError};
pub use forecast::{Forecast, ForecastId};
pub use observation::{Observation, RawSample, SampleId};
pub use risk::{RiskAssessment, Severity};

/// Fresh identifier for forecasts, alerts and samples.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
