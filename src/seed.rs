//! Synthetic telemetry for demos and local testing.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::info;

use bedwatch_domain::{Department, RawSample};
use bedwatch_ports::TelemetryStore;

const BASE_OCCUPANCY: f64 = 140.0;
const NOISE_BEDS: i64 = 5;

#[derive(Debug, Clone)]
pub struct SeedPlan {
    pub department_id: String,
    pub name: String,
    pub total_beds: u32,
    pub days: u32,
}

impl SeedPlan {
    pub fn new(department_id: impl Into<String>) -> Self {
        let department_id = department_id.into();
        Self {
            name: department_id.clone(),
            department_id,
            total_beds: 200,
            days: 7,
        }
    }
}

/// Hourly samples ending at `end`, oldest first: base load, a slight upward
/// trend and a few beds of noise, clamped to capacity.
pub fn synthetic_series(
    plan: &SeedPlan,
    end: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Vec<RawSample> {
    let hours = i64::from(plan.days) * 24;
    let total = i64::from(plan.total_beds);
    (0..hours)
        .rev()
        .map(|hours_ago| {
            let trend = (hours - hours_ago) as f64 / 10.0;
            let noise = rng.gen_range(-NOISE_BEDS..=NOISE_BEDS) as f64;
            let occupied = ((BASE_OCCUPANCY + trend + noise).trunc() as i64).clamp(0, total);
            RawSample::new(
                plan.department_id.clone(),
                occupied,
                total,
                end - Duration::hours(hours_ago),
            )
        })
        .collect()
}

/// Create the department if it is missing and append the series.
pub async fn seed_department(
    store: &dyn TelemetryStore,
    plan: &SeedPlan,
    rng: &mut impl Rng,
) -> Result<usize> {
    let existing = store
        .get_department(&plan.department_id)
        .await
        .context("failed to look up department")?;
    if existing.is_none() {
        store
            .upsert_department(Department::new(
                &plan.department_id,
                &plan.name,
                plan.total_beds,
            ))
            .await
            .context("failed to create department")?;
    }

    let samples = synthetic_series(plan, Utc::now(), rng);
    let count = samples.len();
    for sample in samples {
        store
            .append_sample(sample)
            .await
            .context("failed to append sample")?;
    }
    info!(department = %plan.department_id, samples = count, "Seeded telemetry");
    Ok(count)
}
