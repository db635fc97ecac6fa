//! Orchestration events: the observable record of every state transition.
//!
//! Events are immutable once emitted. The bus guarantees that a subscriber
//! sees them in emission order, so dashboards can replay a task's lifecycle
//! without reordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::{ExecutorId, TaskId};

/// The fixed enumeration of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // TaskQueue
    TaskAdded,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskRetry,
    TaskBlocked,
    CircuitOpened,
    CircuitClosed,
    QueueProcessed,
    // AgentMatcher
    MatchFound,
    MatchFailed,
    PerformanceUpdated,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TaskAdded => "task_added",
            EventKind::TaskStarted => "task_started",
            EventKind::TaskCompleted => "task_completed",
            EventKind::TaskFailed => "task_failed",
            EventKind::TaskRetry => "task_retry",
            EventKind::TaskBlocked => "task_blocked",
            EventKind::CircuitOpened => "circuit_opened",
            EventKind::CircuitClosed => "circuit_closed",
            EventKind::QueueProcessed => "queue_processed",
            EventKind::MatchFound => "match_found",
            EventKind::MatchFailed => "match_failed",
            EventKind::PerformanceUpdated => "performance_updated",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One orchestration event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorEvent {
    pub kind: EventKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,

    pub timestamp: DateTime<Utc>,

    /// Open key/value bag for event-specific detail (failure counts, match
    /// scores, pass summaries, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl OrchestratorEvent {
    pub fn new(kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            task_id: None,
            task_name: None,
            executor_id: None,
            timestamp,
            metadata: Map::new(),
        }
    }

    pub fn with_task(mut self, id: &TaskId, name: &str) -> Self {
        self.task_id = Some(id.clone());
        self.task_name = Some(name.to_string());
        self
    }

    pub fn with_executor(mut self, id: &ExecutorId) -> Self {
        self.executor_id = Some(id.clone());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
