//! Pipeline stages. Each agent owns only its collaborators; run status
//! lives in the [`RunTracker`](crate::RunTracker).

pub mod acquisition;
pub mod communication;
pub mod decision;
pub mod learning;
pub mod prediction;

pub use acquisition::DataAcquisitionAgent;
pub use communication::{CommunicationAgent, build_alert};
pub use decision::DecisionAgent;
pub use learning::{LearningAgent, LearningReport};
pub use prediction::PredictionAgent;
