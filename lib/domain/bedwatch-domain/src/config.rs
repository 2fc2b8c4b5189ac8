//! YAML configuration for the service and the CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BedwatchConfig {
    pub store: StoreConfig,
    pub schedule: ScheduleConfig,
    pub forecast: ForecastConfig,
    pub learning: LearningConfig,
    pub notifications: NotificationsConfig,
    /// Reference data upserted into the store at startup.
    pub departments: Vec<DepartmentConfig>,
}

impl BedwatchConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config at {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule.interval_secs == 0 {
            anyhow::bail!("schedule.interval_secs must be positive");
        }
        if self.schedule.learning_interval_secs == 0 {
            anyhow::bail!("schedule.learning_interval_secs must be positive");
        }
        if self.store.timeout_ms == 0 {
            anyhow::bail!("store.timeout_ms must be positive");
        }
        self.forecast.validate()?;
        if !(0.0..=1.0).contains(&self.learning.smoothing) || self.learning.smoothing == 0.0 {
            anyhow::bail!("learning.smoothing must be in (0, 1]");
        }
        for dept in &self.departments {
            if dept.total_beds == 0 {
                anyhow::bail!("department {} has zero beds", dept.id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub sqlite_path: PathBuf,
    pub pool_size: u32,
    /// Bound applied to every store call.
    pub timeout_ms: u64,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Writes must commit within four fifths of `timeout`, so a commit never
    /// lands after the bounded call has been reported as timed out.
    pub fn write_deadline(&self) -> Duration {
        self.timeout() * 4 / 5
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: PathBuf::from("bedwatch.db"),
            pool_size: 4,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum TriggerPolicy {
    /// Run every department on every tick.
    #[default]
    Interval,
    /// Run only when the newest sample changed, or the heartbeat elapsed.
    OnNewData {
        #[serde(default = "default_heartbeat_secs")]
        heartbeat_secs: u64,
    },
}

fn default_heartbeat_secs() -> u64 {
    4 * 60 * 60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    pub learning_interval_secs: u64,
    pub trigger: TriggerPolicy,
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn learning_interval(&self) -> Duration {
        Duration::from_secs(self.learning_interval_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            learning_interval_secs: 600,
            trigger: TriggerPolicy::Interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Samples read per run.
    pub history_window: usize,
    pub horizon_hours: i64,
    pub baseline_confidence: f64,
    pub min_confidence: f64,
    /// Largest trend step as a fraction of capacity.
    pub max_step_fraction: f64,
    /// Share of forecasted occupancy expected to need ICU beds.
    pub icu_fraction: f64,
}

/// Longest forecast horizon accepted: one year.
pub const MAX_HORIZON_HOURS: i64 = 24 * 365;

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_window == 0 {
            anyhow::bail!("forecast.history_window must be at least 1");
        }
        if !(1..=MAX_HORIZON_HOURS).contains(&self.horizon_hours) {
            anyhow::bail!("forecast.horizon_hours must be in [1, {MAX_HORIZON_HOURS}]");
        }
        if !(self.max_step_fraction > 0.0 && self.max_step_fraction <= 1.0) {
            anyhow::bail!("forecast.max_step_fraction must be in (0, 1]");
        }
        if !(0.0..=1.0).contains(&self.baseline_confidence) {
            anyhow::bail!("forecast.baseline_confidence must be in [0, 1]");
        }
        if !(0.0..=self.baseline_confidence).contains(&self.min_confidence) {
            anyhow::bail!("forecast.min_confidence must be in [0, baseline_confidence]");
        }
        if !(0.0..=1.0).contains(&self.icu_fraction) {
            anyhow::bail!("forecast.icu_fraction must be in [0, 1]");
        }
        Ok(())
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            history_window: 14,
            horizon_hours: 24,
            baseline_confidence: 0.92,
            min_confidence: 0.5,
            max_step_fraction: 0.15,
            icu_fraction: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Exponential smoothing factor for running accuracy.
    pub smoothing: f64,
    /// Feed running accuracy back into forecast confidence.
    pub calibrate_confidence: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.2,
            calibrate_confidence: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub channels: Vec<NotificationChannelConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum NotificationChannelConfig {
    Log,
    Ntfy { url: String, topic: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentConfig {
    pub id: String,
    pub name: String,
    pub total_beds: u32,
}
