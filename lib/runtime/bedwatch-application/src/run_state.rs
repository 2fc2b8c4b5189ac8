//! Per-department run tracking.
//!
//! A department is `Idle` or `Running`. Finishing a run records its
//! outcome and returns the department to `Idle` in the same step, so a
//! failed department is immediately eligible for the next tick.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bedwatch_domain::{DepartmentId, PipelineError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepartmentRunState {
    pub phase: RunPhase,
    pub last_outcome: Option<RunOutcome>,
    pub consecutive_failures: u32,
    pub total_runs: u64,
    pub total_failures: u64,
    pub last_error: Option<String>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct RunTracker {
    states: Arc<Mutex<HashMap<DepartmentId, DepartmentRunState>>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DepartmentId, DepartmentRunState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the department to `Running`. Rejected, not queued, if a run is
    /// already active.
    pub fn try_begin(&self, department_id: &str) -> Result<RunGuard, PipelineError> {
        let mut states = self.lock();
        let state = states.entry(department_id.to_string()).or_default();
        if state.phase == RunPhase::Running {
            return Err(PipelineError::RunInProgress(department_id.to_string()));
        }
        state.phase = RunPhase::Running;
        state.total_runs += 1;
        state.last_started_at = Some(Utc::now());

        Ok(RunGuard {
            tracker: self.clone(),
            department_id: department_id.to_string(),
            finished: false,
        })
    }

    pub fn state(&self, department_id: &str) -> Option<DepartmentRunState> {
        self.lock().get(department_id).cloned()
    }

    /// All known departments, sorted by id.
    pub fn snapshot(&self) -> Vec<(DepartmentId, DepartmentRunState)> {
        let mut states: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    fn finish(&self, department_id: &str, outcome: RunOutcome, error: Option<String>) {
        let mut states = self.lock();
        let state = states.entry(department_id.to_string()).or_default();
        state.phase = RunPhase::Idle;
        state.last_outcome = Some(outcome);
        state.last_finished_at = Some(Utc::now());
        match outcome {
            RunOutcome::Succeeded => {
                state.consecutive_failures = 0;
                state.last_error = None;
            }
            RunOutcome::Failed => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                state.total_failures += 1;
                state.last_error = error;
            }
        }
    }
}

/// Holds a department in `Running`. Dropping it unfinished records a
/// failure.
#[derive(Debug)]
pub struct RunGuard {
    tracker: RunTracker,
    department_id: DepartmentId,
    finished: bool,
}

impl RunGuard {
    pub fn department_id(&self) -> &str {
        &self.department_id
    }

    pub fn succeed(mut self) {
        self.finished = true;
        self.tracker
            .finish(&self.department_id, RunOutcome::Succeeded, None);
    }

    /// Returns the department's consecutive failure count.
    pub fn fail(mut self, error: &PipelineError) -> u32 {
        self.finished = true;
        self.tracker
            .finish(&self.department_id, RunOutcome::Failed, Some(error.to_string()));
        self.tracker
            .state(&self.department_id)
            .map(|s| s.consecutive_failures)
            .unwrap_or_default()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.finish(
                &self.department_id,
                RunOutcome::Failed,
                Some("run aborted before completion".to_string()),
            );
        }
    }
}
