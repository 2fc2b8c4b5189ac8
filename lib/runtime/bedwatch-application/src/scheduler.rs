//! Timer-driven scheduling of pipeline runs and learning passes.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use bedwatch_domain::{DepartmentId, PipelineError, ScheduleConfig, TriggerPolicy};

use crate::agents::LearningReport;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::run_state::RunPhase;
use crate::shutdown::ShutdownSignal;

const REQUEST_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy)]
struct LastRun {
    sample_at: DateTime<Utc>,
    ran_at: DateTime<Utc>,
}

/// Decides whether a tick should start a department's run.
#[derive(Debug, Clone)]
pub struct TriggerGate {
    policy: TriggerPolicy,
    last_success: HashMap<DepartmentId, LastRun>,
}

impl TriggerGate {
    pub fn new(policy: TriggerPolicy) -> Self {
        Self {
            policy,
            last_success: HashMap::new(),
        }
    }

    pub fn should_run(
        &self,
        department_id: &str,
        latest_sample_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let heartbeat_secs = match self.policy {
            TriggerPolicy::Interval => return true,
            TriggerPolicy::OnNewData { heartbeat_secs } => heartbeat_secs,
        };
        let Some(last) = self.last_success.get(department_id) else {
            return true;
        };
        let new_data = latest_sample_at.is_some_and(|at| at > last.sample_at);
        let heartbeat_due = (now - last.ran_at).num_seconds() >= heartbeat_secs as i64;
        new_data || heartbeat_due
    }

    pub fn record_success(
        &mut self,
        department_id: &str,
        sample_at: DateTime<Utc>,
        ran_at: DateTime<Utc>,
    ) {
        self.last_success
            .insert(department_id.to_string(), LastRun { sample_at, ran_at });
    }
}

/// Requests runs from outside the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    requests: mpsc::Sender<DepartmentId>,
}

impl SchedulerHandle {
    /// Ask for an immediate run, bypassing the trigger policy.
    pub async fn request_run(&self, department_id: impl Into<DepartmentId>) -> Result<()> {
        self.requests
            .send(department_id.into())
            .await
            .map_err(|_| anyhow!("scheduler is not running"))
    }
}

type RunOutput = (DepartmentId, Result<RunReport, PipelineError>);

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    config: ScheduleConfig,
    shutdown: ShutdownSignal,
    requests_tx: mpsc::Sender<DepartmentId>,
    requests: mpsc::Receiver<DepartmentId>,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        config: ScheduleConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        let (requests_tx, requests) = mpsc::channel(REQUEST_BUFFER);
        Self {
            orchestrator,
            config,
            shutdown,
            requests_tx,
            requests,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            requests: self.requests_tx.clone(),
        }
    }

    /// Run until shutdown, then wait for in-flight runs to stop at their
    /// next stage boundary.
    pub async fn run(self) {
        let Scheduler {
            orchestrator,
            config,
            mut shutdown,
            requests_tx: _requests_tx,
            mut requests,
        } = self;

        let mut run_ticker = interval(config.interval());
        run_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut learning_ticker = interval(config.learning_interval());
        learning_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut gate = TriggerGate::new(config.trigger);
        let mut runs: JoinSet<RunOutput> = JoinSet::new();
        let mut learning: JoinSet<Result<LearningReport, PipelineError>> = JoinSet::new();

        info!(
            interval_secs = config.interval_secs,
            learning_interval_secs = config.learning_interval_secs,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = run_ticker.tick() => {
                    dispatch_tick(&orchestrator, &gate, &mut runs).await;
                }
                _ = learning_ticker.tick() => {
                    if learning.is_empty() {
                        let orchestrator = orchestrator.clone();
                        learning.spawn(async move {
                            orchestrator.evaluate_matured(Utc::now()).await
                        });
                    } else {
                        debug!("Previous learning pass still running");
                    }
                }
                Some(department_id) = requests.recv() => {
                    spawn_run(&orchestrator, &mut runs, department_id);
                }
                Some(joined) = runs.join_next(), if !runs.is_empty() => {
                    record_run(&mut gate, joined);
                }
                Some(joined) = learning.join_next(), if !learning.is_empty() => {
                    record_learning(joined);
                }
            }
        }

        info!(in_flight = runs.len(), "Scheduler stopping");
        while let Some(joined) = runs.join_next().await {
            record_run(&mut gate, joined);
        }
        while let Some(joined) = learning.join_next().await {
            record_learning(joined);
        }
        info!("Scheduler stopped");
    }
}

async fn dispatch_tick(
    orchestrator: &Arc<Orchestrator>,
    gate: &TriggerGate,
    runs: &mut JoinSet<RunOutput>,
) {
    let departments = match orchestrator.departments().await {
        Ok(departments) => departments,
        Err(err) => {
            warn!(error = %err, "Cannot list departments");
            return;
        }
    };

    let now = Utc::now();
    for department in departments {
        let running = orchestrator
            .tracker()
            .state(&department.id)
            .is_some_and(|s| s.phase == RunPhase::Running);
        if running {
            debug!(department = %department.id, "Run still active, skipping tick");
            continue;
        }

        let latest = match orchestrator.latest_sample_at(&department.id).await {
            Ok(latest) => latest,
            Err(err) => {
                warn!(department = %department.id, error = %err, "Cannot read latest sample");
                continue;
            }
        };
        if gate.should_run(&department.id, latest, now) {
            spawn_run(orchestrator, runs, department.id);
        } else {
            debug!(department = %department.id, "No new data, skipping tick");
        }
    }
}

fn spawn_run(
    orchestrator: &Arc<Orchestrator>,
    runs: &mut JoinSet<RunOutput>,
    department_id: DepartmentId,
) {
    let orchestrator = orchestrator.clone();
    runs.spawn(async move {
        let result = orchestrator.trigger(&department_id).await;
        (department_id, result)
    });
}

fn record_run(gate: &mut TriggerGate, joined: Result<RunOutput, tokio::task::JoinError>) {
    match joined {
        Ok((department_id, Ok(report))) => {
            gate.record_success(&department_id, report.latest_sample_at, Utc::now());
        }
        Ok((department_id, Err(PipelineError::RunInProgress(_)))) => {
            debug!(department = %department_id, "Run request rejected, already running");
        }
        // The orchestrator has already logged the failure.
        Ok((_, Err(_))) => {}
        Err(err) => warn!(error = %err, "Pipeline task aborted"),
    }
}

fn record_learning(joined: Result<Result<LearningReport, PipelineError>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(report)) => debug!(
            evaluated = report.evaluated,
            pending = report.pending,
            failed = report.failed,
            "Learning pass recorded"
        ),
        Ok(Err(err)) => warn!(error = %err, "Learning pass failed"),
        Err(err) => warn!(error = %err, "Learning task aborted"),
    }
}
