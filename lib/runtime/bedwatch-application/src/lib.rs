//! Pipeline runtime: agents, run tracking, orchestration and scheduling.

pub mod agents;
pub mod bounded_store;
pub mod orchestrator;
pub mod run_state;
pub mod scheduler;
pub mod shutdown;

pub use agents::LearningReport;
pub use bounded_store::BoundedStore;
pub use orchestrator::{Orchestrator, RunReport};
pub use run_state::{DepartmentRunState, RunGuard, RunOutcome, RunPhase, RunTracker};
pub use scheduler::{Scheduler, SchedulerHandle, TriggerGate};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};

#[cfg(test)]
mod orchestrator_test;
#[cfg(test)]
mod test_support;
