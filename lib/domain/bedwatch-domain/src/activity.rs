use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::alert::Alert;
use crate::forecast::Forecast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Acquisition,
    Prediction,
    Decision,
    Communication,
    Learning,
    Orchestrator,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Acquisition => "acquisition",
            AgentKind::Prediction => "prediction",
            AgentKind::Decision => "decision",
            AgentKind::Communication => "communication",
            AgentKind::Learning => "learning",
            AgentKind::Orchestrator => "orchestrator",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AgentKind::Acquisition,
            AgentKind::Prediction,
            AgentKind::Decision,
            AgentKind::Communication,
            AgentKind::Learning,
            AgentKind::Orchestrator,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s)
        .ok_or_else(|| format!("unknown agent: {s}"))
    }
}

/// Activity-log entry. `metadata` carries the inputs and outputs of the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub agent: AgentKind,
    pub action: String,
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(agent: AgentKind, action: impl Into<String>) -> Self {
        Self {
            agent,
            action: action.into(),
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Everything a successful run persists, written as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCommit {
    pub forecast: Forecast,
    pub alert: Option<Alert>,
    pub log_entries: Vec<LogEntry>,
}
