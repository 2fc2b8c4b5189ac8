use chrono::{Duration, Utc};

use bedwatch_domain::ForecastConfig;

use crate::prediction::test_support::history;
use crate::prediction::{MODEL_VERSION, TrendPredictor, weighted_trend};

fn predictor() -> TrendPredictor {
    TrendPredictor::new(ForecastConfig::default())
}

#[test]
fn test_empty_history_yields_nothing() {
    assert!(predictor().predict(&[], Utc::now()).is_none());
}

#[test]
fn test_single_observation_repeats_latest() {
    let now = Utc::now();
    let forecast = predictor().predict(&history(&[165], 200), now).unwrap();
    assert_eq!(forecast.forecasted_occupancy, 165);
    assert_eq!(forecast.confidence, 0.5);
    assert_eq!(forecast.target_for, now + Duration::hours(24));
    assert_eq!(forecast.model_version, MODEL_VERSION);
    assert_eq!(forecast.department_id, "er");
    // 15% of 165 is 24.75.
    assert_eq!(forecast.icu_beds, 25);
}

#[test]
fn test_steady_rise_extrapolates_one_step() {
    let forecast = predictor()
        .predict(&history(&[150, 155, 160, 165], 200), Utc::now())
        .unwrap();
    assert_eq!(forecast.forecasted_occupancy, 170);
    // Constant deltas carry no variance.
    assert!((forecast.confidence - 0.92).abs() < 1e-9);
}

#[test]
fn test_falling_census_extrapolates_down() {
    let forecast = predictor()
        .predict(&history(&[120, 110, 100], 200), Utc::now())
        .unwrap();
    assert_eq!(forecast.forecasted_occupancy, 90);
}

#[test]
fn test_trend_is_capped_then_clamped_to_capacity() {
    // Delta of 80 is capped to 15% of 200 = 30, then 180 + 30 clamps to 200.
    let forecast = predictor()
        .predict(&history(&[100, 180], 200), Utc::now())
        .unwrap();
    assert_eq!(forecast.forecasted_occupancy, 200);

    let forecast = predictor()
        .predict(&history(&[100, 20], 200), Utc::now())
        .unwrap();
    // -80 capped to -30.
    assert_eq!(forecast.forecasted_occupancy, 0);
}

#[test]
fn test_mild_volatility_lowers_confidence() {
    // Deltas 2, -1, 2: weighted trend 1, variance 2.
    let forecast = predictor()
        .predict(&history(&[150, 152, 151, 153], 200), Utc::now())
        .unwrap();
    assert_eq!(forecast.forecasted_occupancy, 154);
    assert!((forecast.confidence - 0.91).abs() < 1e-9);
}

#[test]
fn test_high_volatility_hits_confidence_floor() {
    let forecast = predictor()
        .predict(&history(&[150, 160, 150, 160], 200), Utc::now())
        .unwrap();
    assert_eq!(forecast.forecasted_occupancy, 163);
    assert_eq!(forecast.confidence, 0.5);
}

#[test]
fn test_running_accuracy_scales_confidence() {
    let predictor = predictor();
    let history = history(&[150, 155, 160], 200);
    let now = Utc::now();

    let calibrated = predictor
        .predict_calibrated(&history, now, Some(0.9))
        .unwrap();
    assert!((calibrated.confidence - 0.92 * 0.9).abs() < 1e-9);

    let poor = predictor
        .predict_calibrated(&history, now, Some(0.1))
        .unwrap();
    assert_eq!(poor.confidence, 0.5);

    // Single observation ignores calibration.
    let single = predictor
        .predict_calibrated(&history[..1], now, Some(0.1))
        .unwrap();
    assert_eq!(single.confidence, 0.5);
}

#[test]
fn test_weighted_trend_prefers_recent_deltas() {
    assert_eq!(weighted_trend(&[]), 0.0);
    assert!((weighted_trend(&[0.0, 6.0]) - 4.0).abs() < 1e-9);
}

#[test]
fn test_unvalidated_config_does_not_panic() {
    let predictor = TrendPredictor::new(ForecastConfig {
        max_step_fraction: -0.1,
        horizon_hours: i64::MAX,
        ..ForecastConfig::default()
    });
    let forecast = predictor
        .predict(&history(&[150, 160, 170], 200), Utc::now())
        .unwrap();
    assert_eq!(forecast.forecasted_occupancy, 170);
    assert_eq!(forecast.target_for, chrono::DateTime::<Utc>::MAX_UTC);

    let predictor = TrendPredictor::new(ForecastConfig {
        max_step_fraction: f64::NAN,
        ..ForecastConfig::default()
    });
    let forecast = predictor
        .predict(&history(&[150, 160, 170], 200), Utc::now())
        .unwrap();
    assert_eq!(forecast.forecasted_occupancy, 170);
}
