use chrono::{Duration, Utc};

use bedwatch_domain::{Forecast, LearningConfig, Observation, PipelineError};

use crate::learning::AccuracyTracker;

fn forecast(occupied: u32) -> Forecast {
    let generated_at = Utc::now() - Duration::hours(25);
    Forecast {
        id: "f-1".into(),
        department_id: "er".into(),
        forecasted_occupancy: occupied,
        total_beds: 200,
        confidence: 0.92,
        icu_beds: 27,
        model_version: "trend-v1".into(),
        generated_at,
        target_for: generated_at + Duration::hours(24),
    }
}

fn tracker() -> AccuracyTracker {
    AccuracyTracker::new(&LearningConfig::default())
}

#[test]
fn test_first_evaluation_seeds_accuracy() {
    let forecast = forecast(180);
    let actual = Observation::new("er", 175, 200, forecast.target_for).unwrap();
    let record = tracker()
        .evaluate(&forecast, &actual, None, Utc::now())
        .unwrap();
    assert_eq!(record.absolute_error, 5);
    assert_eq!(record.actual_occupancy, 175);
    assert!((record.running_accuracy - 0.975).abs() < 1e-9);
    assert_eq!(record.forecast_id, "f-1");
}

#[test]
fn test_later_evaluations_smooth_previous_accuracy() {
    let forecast = forecast(180);
    let actual = Observation::new("er", 175, 200, forecast.target_for).unwrap();
    let record = tracker()
        .evaluate(&forecast, &actual, Some(0.9), Utc::now())
        .unwrap();
    // 0.9 * 0.8 + 0.975 * 0.2
    assert!((record.running_accuracy - 0.915).abs() < 1e-9);
}

#[test]
fn test_miss_larger_than_capacity_is_clamped_after_smoothing() {
    let forecast = forecast(180);
    let actual = Observation::new("er", 10, 50, forecast.target_for).unwrap();
    let record = tracker()
        .evaluate(&forecast, &actual, Some(0.9), Utc::now())
        .unwrap();
    assert_eq!(record.absolute_error, 170);
    // 0.9 * 0.8 + (1 - 170/50) * 0.2
    assert!((record.running_accuracy - 0.24).abs() < 1e-9);

    let seeded = tracker()
        .evaluate(&forecast, &actual, None, Utc::now())
        .unwrap();
    assert_eq!(seeded.running_accuracy, 0.0);
}

#[test]
fn test_underestimates_count_the_same_as_overestimates() {
    let forecast = forecast(170);
    let actual = Observation::new("er", 175, 200, forecast.target_for).unwrap();
    let record = tracker()
        .evaluate(&forecast, &actual, None, Utc::now())
        .unwrap();
    assert_eq!(record.absolute_error, 5);
}

#[test]
fn test_rejects_actuals_before_target() {
    let forecast = forecast(180);
    let early = forecast.target_for - Duration::minutes(1);
    let actual = Observation::new("er", 175, 200, early).unwrap();
    let err = tracker()
        .evaluate(&forecast, &actual, None, Utc::now())
        .unwrap_err();
    assert!(matches!(err, PipelineError::PrematureEvaluation { .. }));
}

#[test]
fn test_rejects_other_departments() {
    let forecast = forecast(180);
    let actual = Observation::new("icu", 15, 20, forecast.target_for).unwrap();
    let err = tracker()
        .evaluate(&forecast, &actual, None, Utc::now())
        .unwrap_err();
    assert_eq!(
        err,
        PipelineError::Mismatch {
            forecast_id: "f-1".into(),
            expected: "er".into(),
            actual: "icu".into(),
        }
    );
}
