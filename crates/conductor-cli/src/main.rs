//! Demo driver: runs the orchestration engine against simulated executors.
//!
//! Three executors with different reliability profiles compete for a small
//! task graph. Watch the event feed: the always-failing executor trips its
//! circuit breaker, the flaky one loses its similarity advantage as its
//! performance record degrades, and the steady one ends up with the work.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use conductor_core::{
    EventBus, ExecutorCandidate, OrchestratorConfig, StaticCandidates, SystemClock, TaskId,
    TaskOutcome, TaskQueue, TaskSpec, TaskStatus,
};

/// Simulated executor: fails its first `n` assignments, then succeeds.
struct SimulatedExecutor {
    remaining_failures: AtomicU32,
    latency_ms: u64,
    quality: f64,
}

impl SimulatedExecutor {
    fn new(failures: u32, latency_ms: u64, quality: f64) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            latency_ms,
            quality,
        }
    }

    fn run(&self) -> TaskOutcome {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            TaskOutcome::failure(self.latency_ms, format!("simulated failure (left={left})"))
        } else {
            TaskOutcome::success(self.latency_ms).with_quality(self.quality)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // (A) Executor pool. "cinder" looks most similar but never succeeds;
    // "atlas" is flaky; "birch" is slow-ish but dependable.
    let mut pool: HashMap<&str, SimulatedExecutor> = HashMap::new();
    pool.insert("cinder", SimulatedExecutor::new(u32::MAX, 80, 0.0));
    pool.insert("atlas", SimulatedExecutor::new(2, 150, 0.9));
    pool.insert("birch", SimulatedExecutor::new(0, 900, 0.8));

    let candidates = StaticCandidates::new(vec![
        ExecutorCandidate::new("cinder", 0.95),
        ExecutorCandidate::new("atlas", 0.90),
        ExecutorCandidate::new("birch", 0.85),
    ]);

    // (B) Event feed straight to the log.
    let bus = Arc::new(EventBus::new());
    bus.subscribe_fn(|ev| {
        info!(
            kind = %ev.kind,
            task = ev.task_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            executor = ev.executor_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            meta = %serde_json::Value::Object(ev.metadata.clone()),
            "event"
        );
    });

    let config = OrchestratorConfig {
        circuit_breaker_threshold: 2,
        ..OrchestratorConfig::default()
    };
    let queue = TaskQueue::new(
        config,
        Arc::new(candidates),
        bus,
        Arc::new(SystemClock),
    )?;

    // (C) A small task graph plus two doomed one-shot tasks that will
    // exhaust on "cinder" and trip its breaker.
    let task_ids: Vec<TaskId> = ["ingest", "transform", "publish", "audit", "doomed-1", "doomed-2"]
        .iter()
        .map(|name| TaskId::new(*name))
        .collect();
    queue.add_task(TaskSpec::new("ingest").with_priority(10)).await?;
    queue
        .add_task(TaskSpec::new("transform").with_dependency("ingest"))
        .await?;
    queue
        .add_task(TaskSpec::new("publish").with_dependency("transform"))
        .await?;
    queue.add_task(TaskSpec::new("audit").with_max_attempts(5)).await?;
    queue
        .add_task(TaskSpec::new("doomed-1").with_max_attempts(1))
        .await?;
    queue
        .add_task(TaskSpec::new("doomed-2").with_max_attempts(1))
        .await?;

    // (D) Drive passes until every task is terminal: dispatch, then play
    // the executors' outcomes back into the queue.
    for pass in 1..=50 {
        let summary = queue.process_queue().await;
        info!(pass, ?summary, "pass done");

        for id in &task_ids {
            let Some(task) = queue.get_task(id).await else { continue };
            if task.status != TaskStatus::Running {
                continue;
            }
            let Some(executor) = task.assigned_executor.as_ref() else { continue };
            if let Some(sim) = pool.get(executor.as_str()) {
                queue.report_outcome(id, sim.run()).await?;
            }
        }

        let counts = queue.counts_by_status().await;
        if counts.completed + counts.failed == task_ids.len() {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    // (E) Final state: counts, stragglers, breaker states, and the
    // performance records the matcher accumulated.
    let counts = queue.counts_by_status().await;
    info!(?counts, "final counts");
    for id in &task_ids {
        let Some(task) = queue.get_task(id).await else { continue };
        if !task.status.is_terminal() {
            warn!(
                task = %task.id,
                status = ?task.status,
                blocked_reason = ?task.blocked_reason,
                "task did not reach a terminal state"
            );
        }
    }
    for (executor, state) in queue.all_circuit_states().await {
        info!(executor = %executor, ?state, "circuit");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&queue.all_performance_metrics())?
    );
    Ok(())
}
