//! The task queue engine: submission, promotion, dispatch, outcome reporting.
//!
//! Design:
//! - All queue state (tasks, dependency graph, circuit breakers) lives behind
//!   one async mutex. The lock is never held across an await: candidate
//!   resolution and matching run unlocked against a snapshot, and the commit
//!   re-validates that the task is still ready.
//! - `process_queue` is a two-phase pass. Phase one promotes every eligible
//!   task (dependency resolution, retry slots, circuit re-checks) so that a
//!   task completed earlier in the same pass can unblock its dependents for
//!   dispatch in that pass. Phase two dispatches ready tasks in priority
//!   order up to the concurrency ceiling.
//! - Events are collected while the lock is held and published after it is
//!   dropped, so a slow subscriber cannot stall the queue.
//! - A circuit refusal blocks the task without consuming an attempt; attempts
//!   count only reported failures.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::circuit::{CircuitBreakerRegistry, CircuitDecision, CircuitState, CircuitTransition};
use crate::config::OrchestratorConfig;
use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::{
    BlockedReason, EventKind, ExecutorId, OrchestratorEvent, Task, TaskId, TaskOutcome, TaskSpec,
    TaskStatus,
};
use crate::matcher::AgentMatcher;
use crate::observability::{PassSummary, QueueCounts};
use crate::performance::AgentPerformanceMetrics;
use crate::ports::{CandidateSource, Clock};
use crate::queue::dependency::DependencyGraph;
use crate::queue::retry::RetryPolicy;

/// Everything the lock protects. Mutated only by `TaskQueue` methods.
struct QueueState {
    tasks: HashMap<TaskId, Task>,
    graph: DependencyGraph,
    circuits: CircuitBreakerRegistry,
}

impl QueueState {
    fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    /// Phase one of a pass: promote every task whose gate has cleared.
    ///
    /// - Pending -> Ready once all dependencies are completed.
    /// - Pending -> Blocked(DependencyFailed) once any dependency is failed;
    ///   emitted once, the task then stays blocked.
    /// - Retrying -> Ready once its retry slot has arrived.
    /// - Blocked(CircuitOpen) -> Ready so the circuit is re-checked at
    ///   dispatch time.
    fn promote(&mut self, now: DateTime<Utc>, events: &mut Vec<OrchestratorEvent>) -> (usize, usize) {
        let mut completed = HashSet::new();
        let mut failed = Vec::new();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Completed => {
                    completed.insert(task.id.clone());
                }
                TaskStatus::Failed => {
                    failed.push(task.id.clone());
                }
                _ => {}
            }
        }

        // Terminal failures poison their waiting dependents, found through
        // the reverse edges.
        let mut blocked = 0;
        for failed_id in &failed {
            for dependent_id in self.graph.dependents_of(failed_id) {
                let Some(dependent) = self.tasks.get_mut(&dependent_id) else {
                    continue;
                };
                if dependent.status == TaskStatus::Pending {
                    dependent.block(BlockedReason::DependencyFailed, now);
                    blocked += 1;
                    events.push(
                        OrchestratorEvent::new(EventKind::TaskBlocked, now)
                            .with_task(&dependent.id, &dependent.name)
                            .with_meta("reason", "dependency_failed")
                            .with_meta("failed_dependency", failed_id.as_str()),
                    );
                }
            }
        }

        let mut promoted = 0;
        let ids: Vec<TaskId> = self.tasks.keys().cloned().collect();
        for id in ids {
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            match task.status {
                TaskStatus::Pending => {
                    if task.dependencies_satisfied(&completed) {
                        task.mark_ready(now);
                        promoted += 1;
                    }
                }
                TaskStatus::Retrying => {
                    if task.next_retry_at.is_none_or(|at| now >= at) {
                        task.mark_ready(now);
                        promoted += 1;
                    }
                }
                TaskStatus::Blocked => {
                    if task.blocked_reason == Some(BlockedReason::CircuitOpen) {
                        task.mark_ready(now);
                        promoted += 1;
                    }
                }
                _ => {}
            }
        }
        (promoted, blocked)
    }

    /// Ready task ids in dispatch order: priority descending, then age,
    /// then id so the order is total.
    fn dispatch_order(&self) -> Vec<TaskId> {
        let mut ready: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Ready)
            .collect();
        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        ready.into_iter().map(|t| t.id.clone()).collect()
    }
}

/// The orchestration engine.
///
/// Owns all task state, the per-executor circuit breakers, and (through the
/// matcher) the performance records. Cheap to share behind an `Arc`; every
/// method takes `&self`.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    /// Serializes `process_queue` passes; everything else may interleave.
    pass_guard: Mutex<()>,
    matcher: Arc<AgentMatcher>,
    candidates: Arc<dyn CandidateSource>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
    max_concurrent: usize,
}

impl TaskQueue {
    pub fn new(
        config: OrchestratorConfig,
        candidates: Arc<dyn CandidateSource>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> OrchestratorResult<Self> {
        config.validate()?;
        let matcher = Arc::new(AgentMatcher::new(
            config.matcher(),
            Arc::clone(&bus),
            Arc::clone(&clock),
        )?);
        Ok(Self {
            state: Mutex::new(QueueState {
                tasks: HashMap::new(),
                graph: DependencyGraph::new(),
                circuits: CircuitBreakerRegistry::new(config.circuit_breaker()),
            }),
            pass_guard: Mutex::new(()),
            matcher,
            candidates,
            bus,
            clock,
            retry_policy: config.retry_policy(),
            max_concurrent: config.max_concurrent,
        })
    }

    pub fn matcher(&self) -> &Arc<AgentMatcher> {
        &self.matcher
    }

    /// Submit a task. It enters as `Pending` and is promoted on the next
    /// pass; duplicate ids are rejected.
    pub async fn add_task(&self, spec: TaskSpec) -> OrchestratorResult<()> {
        let now = self.clock.now();
        let event = {
            let mut st = self.state.lock().await;
            if st.tasks.contains_key(&spec.id) {
                return Err(OrchestratorError::DuplicateTask(spec.id));
            }
            let task = Task::new(spec, now);
            for dep in &task.dependencies {
                st.graph.add_dependency(&task.id, dep);
            }
            let event = OrchestratorEvent::new(EventKind::TaskAdded, now)
                .with_task(&task.id, &task.name)
                .with_meta("priority", task.priority)
                .with_meta("dependency_count", task.dependencies.len());
            debug!(task = %task.id, deps = task.dependencies.len(), "task added");
            st.tasks.insert(task.id.clone(), task);
            event
        };
        self.bus.publish(&event);
        Ok(())
    }

    /// Run one full pass: promote, then dispatch.
    ///
    /// Passes never overlap. Idempotent when nothing is eligible.
    pub async fn process_queue(&self) -> PassSummary {
        let _pass = self.pass_guard.lock().await;
        let mut summary = PassSummary::default();

        // Phase one: promotion, completed before any dispatch decision so a
        // freshly unblocked dependent is dispatchable in this same pass.
        let now = self.clock.now();
        let (order, events) = {
            let mut st = self.state.lock().await;
            let mut events = Vec::new();
            let (promoted, blocked) = st.promote(now, &mut events);
            summary.promoted = promoted;
            summary.blocked = blocked;
            (st.dispatch_order(), events)
        };
        for event in &events {
            self.bus.publish(event);
        }

        // Phase two: dispatch in order, re-validating under the lock after
        // each unlocked match round.
        for task_id in order {
            let mut at_ceiling = false;
            let snapshot = {
                let st = self.state.lock().await;
                if st.running_count() >= self.max_concurrent {
                    at_ceiling = true;
                    None
                } else {
                    st.tasks
                        .get(&task_id)
                        .filter(|t| t.status == TaskStatus::Ready)
                        .cloned()
                }
            };
            if at_ceiling {
                debug!(limit = self.max_concurrent, "concurrency ceiling reached");
                break;
            }
            let Some(task) = snapshot else { continue };

            let candidates = self.candidates.candidates_for(&task).await;
            let outcome = self.matcher.select(&task.id, &task.name, &candidates);
            let Some(executor) = outcome.executor().cloned() else {
                // No match: the task stays ready for a later pass.
                continue;
            };

            let now = self.clock.now();
            let mut events = Vec::new();
            {
                let mut st = self.state.lock().await;
                let still_ready = st
                    .tasks
                    .get(&task_id)
                    .is_some_and(|t| t.status == TaskStatus::Ready);
                if !still_ready || st.running_count() >= self.max_concurrent {
                    continue;
                }
                match st.circuits.check_dispatch(&executor, now) {
                    CircuitDecision::Permitted => {
                        if let Some(task) = st.tasks.get_mut(&task_id) {
                            task.start(executor.clone(), now);
                            summary.dispatched += 1;
                            events.push(
                                OrchestratorEvent::new(EventKind::TaskStarted, now)
                                    .with_task(&task.id, &task.name)
                                    .with_executor(&executor)
                                    .with_meta("attempt", task.attempt + 1),
                            );
                        }
                    }
                    CircuitDecision::Refused { retry_at } => {
                        if let Some(task) = st.tasks.get_mut(&task_id) {
                            task.block(BlockedReason::CircuitOpen, now);
                            summary.blocked += 1;
                            events.push(
                                OrchestratorEvent::new(EventKind::TaskBlocked, now)
                                    .with_task(&task.id, &task.name)
                                    .with_executor(&executor)
                                    .with_meta("reason", "circuit_breaker_open")
                                    .with_meta("retry_at", retry_at.to_rfc3339()),
                            );
                        }
                    }
                }
            }
            for event in &events {
                self.bus.publish(event);
            }
        }

        self.bus.publish(
            &OrchestratorEvent::new(EventKind::QueueProcessed, self.clock.now())
                .with_meta("promoted", summary.promoted)
                .with_meta("dispatched", summary.dispatched)
                .with_meta("blocked", summary.blocked),
        );
        summary
    }

    /// Report the outcome of a running task.
    ///
    /// Success completes the task and credits the executor's circuit. Every
    /// failure is charged to the executor's circuit breaker (a half-open
    /// probe failure reopens it) and consumes an attempt: retry while
    /// attempts remain, terminal failure otherwise. A cancelled outcome
    /// fails the task immediately with no attempt consumed and no circuit
    /// or performance record; it only releases a held probe slot. Reports
    /// for tasks that are not running are logged and ignored.
    pub async fn report_outcome(
        &self,
        task_id: &TaskId,
        outcome: TaskOutcome,
    ) -> OrchestratorResult<()> {
        let now = self.clock.now();
        let mut events = Vec::new();
        let completion: Option<(ExecutorId, bool)> = {
            let mut st = self.state.lock().await;
            let Some(task) = st.tasks.get(task_id) else {
                return Err(OrchestratorError::TaskNotFound(task_id.clone()));
            };
            if task.status != TaskStatus::Running {
                warn!(task = %task_id, status = ?task.status, "outcome for non-running task ignored");
                return Ok(());
            }
            let Some(executor) = task.assigned_executor.clone() else {
                warn!(task = %task_id, "running task has no executor; outcome ignored");
                return Ok(());
            };

            if outcome.cancelled {
                let task = st
                    .tasks
                    .get_mut(task_id)
                    .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.clone()))?;
                task.fail(outcome.error.clone(), now);
                events.push(
                    OrchestratorEvent::new(EventKind::TaskFailed, now)
                        .with_task(&task.id, &task.name)
                        .with_executor(&executor)
                        .with_meta("cancelled", true)
                        .with_meta("attempt", task.attempt),
                );
                // Not the executor's fault, so no failure is recorded, but a
                // held half-open probe slot must come back.
                st.circuits.release_probe(&executor);
                None
            } else if outcome.success {
                let task = st
                    .tasks
                    .get_mut(task_id)
                    .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.clone()))?;
                task.complete(now);
                events.push(
                    OrchestratorEvent::new(EventKind::TaskCompleted, now)
                        .with_task(&task.id, &task.name)
                        .with_executor(&executor)
                        .with_meta("duration_ms", outcome.duration_ms),
                );
                if let Some(transition) = st.circuits.record_success(&executor) {
                    events.push(circuit_event(&executor, &transition, now));
                }
                Some((executor, true))
            } else {
                let task = st
                    .tasks
                    .get_mut(task_id)
                    .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.clone()))?;
                task.attempt += 1;
                if task.attempt < task.max_attempts {
                    let delay = self.retry_policy.next_delay(task.attempt);
                    let next_retry_at = now + clamp_delta(delay);
                    task.schedule_retry(next_retry_at, outcome.error.clone(), now);
                    events.push(
                        OrchestratorEvent::new(EventKind::TaskRetry, now)
                            .with_task(&task.id, &task.name)
                            .with_executor(&executor)
                            .with_meta("attempt", task.attempt)
                            .with_meta("max_attempts", task.max_attempts)
                            .with_meta("next_retry_at", next_retry_at.to_rfc3339()),
                    );
                } else {
                    task.fail(outcome.error.clone(), now);
                    events.push(
                        OrchestratorEvent::new(EventKind::TaskFailed, now)
                            .with_task(&task.id, &task.name)
                            .with_executor(&executor)
                            .with_meta("attempt", task.attempt),
                    );
                }
                // Every failure counts against the executor, retryable or
                // not; this is also what reopens a probed circuit.
                if let Some(transition) = st.circuits.record_failure(&executor, now) {
                    events.push(circuit_event(&executor, &transition, now));
                }
                Some((executor, false))
            }
        };
        for event in &events {
            self.bus.publish(event);
        }
        if let Some((executor, success)) = completion {
            self.matcher.record_task_completion(
                &executor,
                task_id,
                success,
                outcome.duration_ms,
                outcome.quality_score,
            );
        }
        Ok(())
    }

    pub async fn get_task(&self, task_id: &TaskId) -> Option<Task> {
        self.state.lock().await.tasks.get(task_id).cloned()
    }

    pub async fn counts_by_status(&self) -> QueueCounts {
        let st = self.state.lock().await;
        let mut counts = QueueCounts::default();
        for task in st.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Blocked => counts.blocked += 1,
                TaskStatus::Ready => counts.ready += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Retrying => counts.retrying += 1,
            }
        }
        counts
    }

    pub async fn circuit_state(&self, executor: &ExecutorId) -> Option<CircuitState> {
        self.state.lock().await.circuits.state(executor)
    }

    pub async fn all_circuit_states(&self) -> HashMap<ExecutorId, CircuitState> {
        self.state.lock().await.circuits.all_states()
    }

    pub fn agent_performance(&self, executor: &ExecutorId) -> Option<AgentPerformanceMetrics> {
        self.matcher.performance(executor)
    }

    pub fn all_performance_metrics(&self) -> HashMap<ExecutorId, AgentPerformanceMetrics> {
        self.matcher.all_performance_metrics()
    }
}

fn circuit_event(
    executor: &ExecutorId,
    transition: &CircuitTransition,
    now: DateTime<Utc>,
) -> OrchestratorEvent {
    match transition {
        CircuitTransition::Opened {
            failure_count,
            next_attempt_at,
        } => OrchestratorEvent::new(EventKind::CircuitOpened, now)
            .with_executor(executor)
            .with_meta("failure_count", *failure_count)
            .with_meta("next_attempt_at", next_attempt_at.to_rfc3339()),
        CircuitTransition::Closed => {
            OrchestratorEvent::new(EventKind::CircuitClosed, now).with_executor(executor)
        }
    }
}

fn clamp_delta(delay: std::time::Duration) -> TimeDelta {
    let ms = delay.as_millis().min(i64::MAX as u128) as i64;
    TimeDelta::milliseconds(ms)
}
