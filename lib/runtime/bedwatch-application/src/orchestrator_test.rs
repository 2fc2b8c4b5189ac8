use chrono::{Duration, Utc};
use std::sync::atomic::Ordering;

use bedwatch_domain::{
    AccuracyRecord, AgentKind, AlertFilter, Forecast, PipelineError, RawSample, Severity,
};
use bedwatch_ports::TelemetryStore;

use crate::run_state::{RunOutcome, RunPhase};
use crate::shutdown::{self, ShutdownSignal};
use crate::test_support::{harness, seed};

#[tokio::test]
async fn test_normal_run_commits_forecast_without_alert() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[100, 100]).await;

    let report = h.orchestrator.trigger("er").await.unwrap();
    assert_eq!(report.forecast.forecasted_occupancy, 100);
    assert_eq!(report.assessment.severity, Severity::Normal);
    assert!(report.alert.is_none());

    assert_eq!(h.store.inner.forecasts().await.len(), 1);
    assert!(
        h.store
            .list_alerts(AlertFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
    let log = h.store.inner.log_entries().await;
    let actions: Vec<&str> = log.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        vec!["telemetry_acquired", "forecast_generated", "risk_evaluated"]
    );
    assert!(log.iter().all(|e| e.agent != AgentKind::Communication));
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_critical_run_persists_and_notifies() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[180, 185, 190]).await;

    let report = h.orchestrator.trigger("er").await.unwrap();
    assert_eq!(report.forecast.forecasted_occupancy, 195);
    assert_eq!(report.assessment.severity, Severity::Critical);
    let alert = report.alert.unwrap();
    assert!(!alert.acknowledged);
    assert_eq!(alert.forecast_id, report.forecast.id);
    assert!(alert.message.contains("Immediate diversion required"));

    let stored = h.store.list_alerts(AlertFilter::default()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, alert.id);
    assert_eq!(h.notifier.sent().len(), 1);

    let published = h
        .store
        .inner
        .log_entries()
        .await
        .into_iter()
        .find(|e| e.action == "alert_published")
        .unwrap();
    assert_eq!(published.agent, AgentKind::Communication);
    assert_eq!(published.metadata["severity"], "critical");

    let state = h.orchestrator.tracker().state("er").unwrap();
    assert_eq!(state.phase, RunPhase::Idle);
    assert_eq!(state.last_outcome, Some(RunOutcome::Succeeded));
}

#[tokio::test]
async fn test_warning_band_reaches_alert() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[170, 175, 180]).await;

    let report = h.orchestrator.trigger("er").await.unwrap();
    assert_eq!(report.forecast.forecasted_occupancy, 185);
    assert_eq!(report.assessment.severity, Severity::Warning);
    assert!(report.alert.unwrap().message.starts_with("WARNING"));
}

#[tokio::test]
async fn test_missing_samples_fail_with_no_data() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[]).await;

    let err = h.orchestrator.trigger("er").await.unwrap_err();
    assert_eq!(err, PipelineError::NoData("er".into()));
    assert!(h.store.inner.forecasts().await.is_empty());
}

#[tokio::test]
async fn test_unknown_department_is_rejected() {
    let h = harness(ShutdownSignal::never());
    let err = h.orchestrator.trigger("ward-9").await.unwrap_err();
    assert_eq!(err, PipelineError::UnknownDepartment("ward-9".into()));
}

#[tokio::test]
async fn test_invalid_latest_sample_fails_run() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[150, 230]).await;

    let err = h.orchestrator.trigger("er").await.unwrap_err();
    assert_eq!(err.kind(), "invalid_sample");
    assert!(h.store.inner.forecasts().await.is_empty());
    assert_eq!(
        h.orchestrator.tracker().state("er").unwrap().consecutive_failures,
        1
    );
}

#[tokio::test]
async fn test_commit_failure_is_delivery_error_and_leaves_nothing() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[180, 185, 190]).await;
    h.store.fail_commits(true);

    for expected_failures in 1..=2 {
        let err = h.orchestrator.trigger("er").await.unwrap_err();
        assert_eq!(err.kind(), "delivery");
        let state = h.orchestrator.tracker().state("er").unwrap();
        assert_eq!(state.phase, RunPhase::Idle);
        assert_eq!(state.consecutive_failures, expected_failures);
    }
    assert!(h.store.inner.forecasts().await.is_empty());
    assert!(h.store.inner.log_entries().await.is_empty());
    assert!(h.notifier.sent().is_empty());

    h.store.fail_commits(false);
    h.orchestrator.trigger("er").await.unwrap();
    let state = h.orchestrator.tracker().state("er").unwrap();
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.total_failures, 2);
    assert_eq!(state.total_runs, 3);
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_run() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[180, 185, 190]).await;
    h.notifier.fail.store(true, Ordering::SeqCst);

    let report = h.orchestrator.trigger("er").await.unwrap();
    assert!(report.alert.is_some());
    assert_eq!(
        h.store
            .list_alerts(AlertFilter::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_times_out() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[150, 160]).await;
    h.store.delay_sample_reads(std::time::Duration::from_secs(60));

    let err = h.orchestrator.trigger("er").await.unwrap_err();
    assert_eq!(
        err,
        PipelineError::Timeout {
            operation: "get_latest_samples",
            elapsed: std::time::Duration::from_secs(5),
        }
    );
    let state = h.orchestrator.tracker().state("er").unwrap();
    assert_eq!(state.last_outcome, Some(RunOutcome::Failed));
    assert!(h.store.inner.forecasts().await.is_empty());
}

#[tokio::test]
async fn test_overlapping_triggers_run_once() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[150, 160]).await;
    let gate = h.store.gate_sample_reads();

    let first = tokio::spawn({
        let orchestrator = h.orchestrator.clone();
        async move { orchestrator.trigger("er").await }
    });
    while h
        .orchestrator
        .tracker()
        .state("er")
        .map(|s| s.phase)
        != Some(RunPhase::Running)
    {
        tokio::task::yield_now().await;
    }

    let err = h.orchestrator.trigger("er").await.unwrap_err();
    assert_eq!(err, PipelineError::RunInProgress("er".into()));

    gate.add_permits(1);
    first.await.unwrap().unwrap();

    let state = h.orchestrator.tracker().state("er").unwrap();
    assert_eq!(state.total_runs, 1);
    assert_eq!(state.total_failures, 0);
    assert_eq!(h.store.inner.forecasts().await.len(), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_before_next_stage() {
    let (trigger, signal) = shutdown::channel();
    let h = harness(signal);
    seed(&h.store, "er", 200, &[180, 185, 190]).await;
    trigger.trigger();

    let err = h.orchestrator.trigger("er").await.unwrap_err();
    assert_eq!(err, PipelineError::Cancelled("er".into()));
    assert!(h.store.inner.forecasts().await.is_empty());
    assert!(h.store.inner.log_entries().await.is_empty());
}

#[tokio::test]
async fn test_running_accuracy_scales_confidence() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[160, 165, 170]).await;
    h.store
        .append_accuracy_record(AccuracyRecord {
            forecast_id: "f-old".into(),
            department_id: "er".into(),
            actual_occupancy: 150,
            absolute_error: 40,
            running_accuracy: 0.6,
            evaluated_at: Utc::now(),
        })
        .await
        .unwrap();

    let report = h.orchestrator.trigger("er").await.unwrap();
    assert_eq!(report.forecast.forecasted_occupancy, 175);
    assert!((report.forecast.confidence - 0.552).abs() < 1e-9);
}

fn matured_forecast(id: &str, forecasted: u32, target_minutes_ago: i64) -> Forecast {
    let target_for = Utc::now() - Duration::minutes(target_minutes_ago);
    Forecast {
        id: id.into(),
        department_id: "er".into(),
        forecasted_occupancy: forecasted,
        total_beds: 200,
        confidence: 0.9,
        icu_beds: 27,
        model_version: "trend-v1".into(),
        generated_at: target_for - Duration::hours(24),
        target_for,
    }
}

#[tokio::test]
async fn test_learning_chains_running_accuracy() {
    let h = harness(ShutdownSignal::never());
    let now = Utc::now();
    for forecast in [
        matured_forecast("f-1", 180, 120),
        matured_forecast("f-2", 170, 30),
        matured_forecast("f-3", 160, 5),
    ] {
        h.store.append_forecast(forecast).await.unwrap();
    }
    h.store
        .append_sample(RawSample::new("er", 175, 200, now - Duration::minutes(60)))
        .await
        .unwrap();
    h.store
        .append_sample(RawSample::new("er", 185, 200, now - Duration::minutes(10)))
        .await
        .unwrap();

    let report = h.orchestrator.evaluate_matured(Utc::now()).await.unwrap();
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.pending, 1);
    assert_eq!(report.failed, 0);

    let records = h.store.inner.accuracy_records().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].forecast_id, "f-1");
    assert_eq!(records[0].absolute_error, 5);
    assert!((records[0].running_accuracy - 0.975).abs() < 1e-9);
    assert_eq!(records[1].absolute_error, 15);
    assert!((records[1].running_accuracy - 0.965).abs() < 1e-9);

    let learning_entries = h
        .store
        .inner
        .log_entries()
        .await
        .into_iter()
        .filter(|e| e.agent == AgentKind::Learning)
        .count();
    assert_eq!(learning_entries, 2);

    let again = h.orchestrator.evaluate_matured(Utc::now()).await.unwrap();
    assert_eq!(again.evaluated, 0);
    assert_eq!(again.pending, 1);
}

#[tokio::test]
async fn test_acknowledging_alert_twice_is_a_no_op() {
    let h = harness(ShutdownSignal::never());
    seed(&h.store, "er", 200, &[180, 185, 190]).await;
    let alert = h.orchestrator.trigger("er").await.unwrap().alert.unwrap();

    let store = h.orchestrator.store();
    store.acknowledge_alert(&alert.id).await.unwrap();
    store.acknowledge_alert(&alert.id).await.unwrap();

    let open = store
        .list_alerts(AlertFilter {
            unacknowledged_only: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(open.is_empty());
    let all = store.list_alerts(AlertFilter::default()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].acknowledged);
}

#[tokio::test]
async fn test_learning_skips_invalid_actual_and_continues() {
    let h = harness(ShutdownSignal::never());
    let now = Utc::now();
    h.store
        .append_forecast(matured_forecast("f-1", 180, 120))
        .await
        .unwrap();
    h.store
        .append_forecast(matured_forecast("f-2", 170, 30))
        .await
        .unwrap();
    h.store
        .append_sample(RawSample::new("er", 250, 200, now - Duration::minutes(60)))
        .await
        .unwrap();
    h.store
        .append_sample(RawSample::new("er", 175, 200, now - Duration::minutes(10)))
        .await
        .unwrap();

    let report = h.orchestrator.evaluate_matured(Utc::now()).await.unwrap();
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.pending, 0);

    let records = h.store.inner.accuracy_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].forecast_id, "f-2");
    assert!((records[0].running_accuracy - 0.975).abs() < 1e-9);

    // The skipped forecast stays pending and is retried next pass.
    let again = h.orchestrator.evaluate_matured(Utc::now()).await.unwrap();
    assert_eq!(again.failed, 1);
    assert_eq!(again.evaluated, 0);
}

#[tokio::test]
async fn test_learning_scores_departments_independently() {
    let h = harness(ShutdownSignal::never());
    let now = Utc::now();
    h.store
        .append_forecast(matured_forecast("er-1", 180, 60))
        .await
        .unwrap();
    h.store
        .append_forecast(Forecast {
            department_id: "icu".into(),
            total_beds: 20,
            icu_beds: 18,
            ..matured_forecast("icu-1", 18, 60)
        })
        .await
        .unwrap();
    h.store
        .append_sample(RawSample::new("er", 170, 200, now - Duration::minutes(30)))
        .await
        .unwrap();
    h.store
        .append_sample(RawSample::new("icu", 16, 20, now - Duration::minutes(30)))
        .await
        .unwrap();

    let report = h.orchestrator.evaluate_matured(Utc::now()).await.unwrap();
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.failed, 0);

    let er = h.store.latest_accuracy("er").await.unwrap().unwrap();
    let icu = h.store.latest_accuracy("icu").await.unwrap().unwrap();
    assert!((er - 0.95).abs() < 1e-9);
    assert!((icu - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn test_store_failure_stops_only_that_department() {
    let h = harness(ShutdownSignal::never());
    let now = Utc::now();
    for forecast in [
        matured_forecast("er-1", 180, 120),
        matured_forecast("er-2", 170, 60),
        Forecast {
            department_id: "icu".into(),
            total_beds: 20,
            ..matured_forecast("icu-1", 18, 60)
        },
    ] {
        h.store.append_forecast(forecast).await.unwrap();
    }
    h.store
        .append_sample(RawSample::new("er", 175, 200, now - Duration::minutes(30)))
        .await
        .unwrap();
    h.store
        .append_sample(RawSample::new("icu", 18, 20, now - Duration::minutes(30)))
        .await
        .unwrap();
    h.store.fail_accuracy_writes_for("er");

    let report = h.orchestrator.evaluate_matured(Utc::now()).await.unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.evaluated, 1);

    let records = h.store.inner.accuracy_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].department_id, "icu");
    assert!(h.store.latest_accuracy("er").await.unwrap().is_none());
}
