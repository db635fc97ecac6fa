//! Task model: submission spec + owned lifecycle record.
//!
//! Design:
//! - `TaskSpec` is what callers submit (flexible, serde-friendly defaults).
//! - `Task` is the queue-owned record and the single source of truth for
//!   task state. All transitions happen through methods here, never by
//!   poking fields from the dispatch path.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ExecutorId, TaskId};

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies to complete.
    Pending,
    /// Held back: circuit refused dispatch, or a dependency failed permanently.
    Blocked,
    /// Dependencies satisfied, eligible for dispatch.
    Ready,
    /// Dispatched to an executor, awaiting its outcome report.
    Running,
    /// Terminal success.
    Completed,
    /// Terminal failure (attempts exhausted or cancelled).
    Failed,
    /// Failed transiently, waiting for its retry slot.
    Retrying,
}

impl TaskStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Why a task is `Blocked`. Kept on the record so operators can tell a task
/// that will run once a circuit recovers from one that can never run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedReason {
    /// The matched executor's circuit breaker refused dispatch.
    CircuitOpen,
    /// A dependency reached terminal failure; this task will never be ready.
    DependencyFailed,
}

fn default_max_attempts() -> u32 {
    3
}

/// What callers submit to `TaskQueue::add_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,

    /// Human-readable name (defaults to the id).
    #[serde(default)]
    pub name: Option<String>,

    /// Ids of tasks that must complete before this one becomes ready.
    /// Ids that do not exist yet are accepted; readiness is evaluated later.
    #[serde(default)]
    pub dependencies: HashSet<TaskId>,

    /// Ordering hint: higher dispatches first.
    #[serde(default)]
    pub priority: i64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            dependencies: HashSet::new(),
            priority: 0,
            max_attempts: default_max_attempts(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_dependency(mut self, dep: impl Into<TaskId>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Queue-owned task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub dependencies: HashSet<TaskId>,
    pub priority: i64,
    pub status: TaskStatus,

    /// Failed attempts so far. Circuit refusals do not count.
    pub attempt: u32,
    pub max_attempts: u32,

    /// Invariant: `Some` whenever status is `Running`.
    pub assigned_executor: Option<ExecutorId>,

    pub blocked_reason: Option<BlockedReason>,
    pub last_error: Option<String>,

    /// When a `Retrying` task becomes eligible again.
    pub next_retry_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(spec: TaskSpec, now: DateTime<Utc>) -> Self {
        let name = spec.name.unwrap_or_else(|| spec.id.as_str().to_string());
        Self {
            id: spec.id,
            name,
            dependencies: spec.dependencies,
            priority: spec.priority,
            status: TaskStatus::Pending,
            attempt: 0,
            max_attempts: spec.max_attempts.max(1),
            assigned_executor: None,
            blocked_reason: None,
            last_error: None,
            next_retry_at: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Promote to `Ready` (dependencies satisfied, or retry slot arrived,
    /// or a circuit block is being re-checked).
    pub fn mark_ready(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Ready;
        self.blocked_reason = None;
        self.next_retry_at = None;
        self.updated_at = now;
    }

    /// Dispatch to an executor.
    pub fn start(&mut self, executor: ExecutorId, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.assigned_executor = Some(executor);
        self.started_at = Some(now);
        self.updated_at = now;
    }

    /// Terminal success.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Failed transiently; eligible again at `next_retry_at`.
    pub fn schedule_retry(
        &mut self,
        next_retry_at: DateTime<Utc>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = TaskStatus::Retrying;
        self.assigned_executor = None;
        self.next_retry_at = Some(next_retry_at);
        self.last_error = error;
        self.updated_at = now;
    }

    /// Terminal failure.
    pub fn fail(&mut self, error: Option<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.last_error = error;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Hold back without consuming an attempt.
    pub fn block(&mut self, reason: BlockedReason, now: DateTime<Utc>) {
        self.status = TaskStatus::Blocked;
        self.blocked_reason = Some(reason);
        self.assigned_executor = None;
        self.updated_at = now;
    }

    /// Whether every id in `dependencies` appears in `completed`.
    pub fn dependencies_satisfied(&self, completed: &HashSet<TaskId>) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn spec_defaults_apply_on_deserialize() {
        let json = r#"{ "id": "t1" }"#;
        let spec: TaskSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.max_attempts, 3);
        assert_eq!(spec.priority, 0);
        assert!(spec.dependencies.is_empty());
        assert!(spec.name.is_none());
    }

    #[test]
    fn new_task_starts_pending_with_name_defaulting_to_id() {
        let task = Task::new(TaskSpec::new("t1"), now());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.name, "t1");
        assert_eq!(task.attempt, 0);
        assert!(task.assigned_executor.is_none());
    }

    #[test]
    fn start_records_executor_and_timestamps() {
        let t0 = now();
        let mut task = Task::new(TaskSpec::new("t1"), t0);
        task.mark_ready(t0);
        task.start(ExecutorId::new("e1"), t0);
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.assigned_executor, Some(ExecutorId::new("e1")));
        assert_eq!(task.started_at, Some(t0));
    }

    #[test]
    fn schedule_retry_clears_executor() {
        let t0 = now();
        let mut task = Task::new(TaskSpec::new("t1"), t0);
        task.start(ExecutorId::new("e1"), t0);
        task.schedule_retry(t0, Some("boom".into()), t0);
        assert_eq!(task.status, TaskStatus::Retrying);
        assert!(task.assigned_executor.is_none());
        assert_eq!(task.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn dependencies_satisfied_requires_all() {
        let spec = TaskSpec::new("t1")
            .with_dependency("a")
            .with_dependency("b");
        let task = Task::new(spec, now());

        let mut completed = HashSet::new();
        assert!(!task.dependencies_satisfied(&completed));
        completed.insert(TaskId::new("a"));
        assert!(!task.dependencies_satisfied(&completed));
        completed.insert(TaskId::new("b"));
        assert!(task.dependencies_satisfied(&completed));
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let task = Task::new(TaskSpec::new("t1").with_max_attempts(0), now());
        assert_eq!(task.max_attempts, 1);
    }
}
