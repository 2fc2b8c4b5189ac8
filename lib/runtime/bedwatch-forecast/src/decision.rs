//! Capacity risk bands. Thresholds are fixed; both comparisons are strict.

use bedwatch_domain::{Forecast, RiskAssessment, Severity};

/// Ratios strictly above this are at least `Warning`.
pub const WARNING_RATIO: f64 = 0.85;
/// Ratios strictly above this are `Critical`.
pub const CRITICAL_RATIO: f64 = 0.95;

pub fn classify_ratio(ratio: f64) -> Severity {
    if ratio > CRITICAL_RATIO {
        Severity::Critical
    } else if ratio > WARNING_RATIO {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

/// Classify a forecast against capacity. A department without beds is
/// treated as over capacity.
pub fn decide(forecast: &Forecast, total_beds: u32) -> RiskAssessment {
    let ratio = if total_beds == 0 {
        f64::INFINITY
    } else {
        f64::from(forecast.forecasted_occupancy) / f64::from(total_beds)
    };
    let severity = classify_ratio(ratio);

    RiskAssessment {
        forecast_id: forecast.id.clone(),
        ratio,
        severity,
        alert_message: alert_message(severity, forecast, total_beds, ratio),
    }
}

fn alert_message(
    severity: Severity,
    forecast: &Forecast,
    total_beds: u32,
    ratio: f64,
) -> Option<String> {
    let load = format!(
        "{}/{} beds forecast by {}",
        forecast.forecasted_occupancy,
        total_beds,
        forecast.target_for.format("%Y-%m-%d %H:%M UTC")
    );
    match severity {
        Severity::Normal => None,
        Severity::Warning => Some(format!(
            "WARNING: capacity exceeding 85% ({:.0}%, {load}). Begin discharge protocols.",
            ratio * 100.0
        )),
        Severity::Critical => Some(format!(
            "CRITICAL: capacity reached ({load}). Immediate diversion required. \
             Activate overflow protocols and notify on-call staffing reserve."
        )),
    }
}
