//! End-to-end scenarios through the public API: lifecycle event feeds,
//! circuit recovery, performance-driven selection drift, dependency chains.

use std::sync::{Arc, Mutex};

use chrono::{TimeDelta, Utc};

use conductor_core::{
    CircuitState, Clock, EventBus, EventKind, ExecutorCandidate, ExecutorId, FixedClock,
    OrchestratorConfig, StaticCandidates, TaskId, TaskOutcome, TaskQueue, TaskSpec, TaskStatus,
};

struct Harness {
    queue: TaskQueue,
    clock: Arc<FixedClock>,
    events: Arc<Mutex<Vec<EventKind>>>,
}

fn harness(config: OrchestratorConfig, executors: &[(&str, f64)]) -> Harness {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let bus = Arc::new(EventBus::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.subscribe_fn(move |ev| sink.lock().unwrap().push(ev.kind));

    let candidates: Vec<ExecutorCandidate> = executors
        .iter()
        .map(|(id, sim)| ExecutorCandidate::new(*id, *sim))
        .collect();
    let clock_port: Arc<dyn Clock> = clock.clone();
    let queue = TaskQueue::new(
        config,
        Arc::new(StaticCandidates::new(candidates)),
        bus,
        clock_port,
    )
    .unwrap();
    Harness { queue, clock, events }
}

impl Harness {
    fn seen(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn single_task_lifecycle_emits_the_full_event_feed_in_order() {
    let h = harness(OrchestratorConfig::default(), &[("e1", 0.9)]);

    h.queue.add_task(TaskSpec::new("t1")).await.unwrap();
    h.queue.process_queue().await;
    h.queue
        .report_outcome(&TaskId::new("t1"), TaskOutcome::success(150).with_quality(0.9))
        .await
        .unwrap();

    assert_eq!(
        h.seen(),
        vec![
            EventKind::TaskAdded,
            EventKind::MatchFound,
            EventKind::TaskStarted,
            EventKind::QueueProcessed,
            EventKind::TaskCompleted,
            EventKind::PerformanceUpdated,
        ]
    );
    let t1 = h.queue.get_task(&TaskId::new("t1")).await.unwrap();
    assert_eq!(t1.status, TaskStatus::Completed);
    assert!(t1.completed_at.is_some());
}

#[tokio::test]
async fn dependency_chain_completes_across_passes() {
    let h = harness(OrchestratorConfig::default(), &[("e1", 0.9)]);

    h.queue.add_task(TaskSpec::new("fetch")).await.unwrap();
    h.queue
        .add_task(TaskSpec::new("build").with_dependency("fetch"))
        .await
        .unwrap();
    h.queue
        .add_task(TaskSpec::new("deploy").with_dependency("build"))
        .await
        .unwrap();

    h.queue.process_queue().await;
    h.queue
        .report_outcome(&TaskId::new("fetch"), TaskOutcome::success(10))
        .await
        .unwrap();
    h.queue.process_queue().await;
    h.queue
        .report_outcome(&TaskId::new("build"), TaskOutcome::success(10))
        .await
        .unwrap();
    h.queue.process_queue().await;
    h.queue
        .report_outcome(&TaskId::new("deploy"), TaskOutcome::success(10))
        .await
        .unwrap();

    let counts = h.queue.counts_by_status().await;
    assert_eq!(counts.completed, 3);
    assert_eq!(counts.pending + counts.ready + counts.running, 0);
}

#[tokio::test]
async fn circuit_opens_refuses_and_recovers_through_half_open_probes() {
    let config = OrchestratorConfig {
        circuit_breaker_threshold: 2,
        circuit_breaker_timeout_ms: 30_000,
        circuit_breaker_success_threshold: 2,
        ..OrchestratorConfig::default()
    };
    let h = harness(config, &[("e1", 0.9)]);
    let e1 = ExecutorId::new("e1");

    // Two exhausted tasks trip the breaker.
    for name in ["f1", "f2"] {
        h.queue
            .add_task(TaskSpec::new(name).with_max_attempts(1))
            .await
            .unwrap();
        h.queue.process_queue().await;
        h.queue
            .report_outcome(&TaskId::new(name), TaskOutcome::failure(20, "crash"))
            .await
            .unwrap();
    }
    assert_eq!(h.queue.circuit_state(&e1).await, Some(CircuitState::Open));
    assert!(h.seen().contains(&EventKind::CircuitOpened));

    // New work is refused, not failed, and consumes no attempt.
    h.queue.add_task(TaskSpec::new("t3")).await.unwrap();
    let summary = h.queue.process_queue().await;
    assert_eq!(summary.dispatched, 0);
    let t3 = h.queue.get_task(&TaskId::new("t3")).await.unwrap();
    assert_eq!(t3.status, TaskStatus::Blocked);
    assert_eq!(t3.attempt, 0);

    // After the timeout the blocked task becomes the first probe.
    h.clock.advance(TimeDelta::milliseconds(30_000));
    let summary = h.queue.process_queue().await;
    assert_eq!(summary.dispatched, 1);
    assert_eq!(h.queue.circuit_state(&e1).await, Some(CircuitState::HalfOpen));
    h.queue
        .report_outcome(&TaskId::new("t3"), TaskOutcome::success(15))
        .await
        .unwrap();
    assert_eq!(h.queue.circuit_state(&e1).await, Some(CircuitState::HalfOpen));

    // Second consecutive probe success closes the circuit.
    h.queue.add_task(TaskSpec::new("t4")).await.unwrap();
    h.queue.process_queue().await;
    h.queue
        .report_outcome(&TaskId::new("t4"), TaskOutcome::success(15))
        .await
        .unwrap();
    assert_eq!(h.queue.circuit_state(&e1).await, Some(CircuitState::Closed));
    assert!(h.seen().contains(&EventKind::CircuitClosed));
}

#[tokio::test]
async fn repeated_failures_shift_selection_to_the_steadier_executor() {
    let h = harness(
        OrchestratorConfig::default(),
        &[("sharp", 0.9), ("steady", 0.85)],
    );
    let sharp = ExecutorId::new("sharp");
    let steady = ExecutorId::new("steady");

    // With no history "sharp" wins on similarity alone.
    h.queue
        .add_task(TaskSpec::new("warmup").with_max_attempts(1))
        .await
        .unwrap();
    h.queue.process_queue().await;
    let warmup = h.queue.get_task(&TaskId::new("warmup")).await.unwrap();
    assert_eq!(warmup.assigned_executor, Some(sharp.clone()));
    h.queue
        .report_outcome(&TaskId::new("warmup"), TaskOutcome::failure(100, "flaky").with_quality(0.0))
        .await
        .unwrap();

    let metrics = h.queue.agent_performance(&sharp).unwrap();
    assert_eq!(metrics.success_rate, 0.0);

    // "sharp" now scores 0.9*0.7 + ~0.2*0.3 ~= 0.69; the untried "steady"
    // keeps its neutral 0.85*0.7 + 0.5*0.3 = 0.745 and takes over.
    h.queue.add_task(TaskSpec::new("decider")).await.unwrap();
    h.queue.process_queue().await;
    let decider = h.queue.get_task(&TaskId::new("decider")).await.unwrap();
    assert_eq!(decider.assigned_executor, Some(steady));
}

#[tokio::test]
async fn completions_free_slots_under_the_concurrency_ceiling() {
    let config = OrchestratorConfig {
        max_concurrent: 2,
        ..OrchestratorConfig::default()
    };
    let h = harness(config, &[("e1", 0.9)]);
    for name in ["a", "b", "c", "d"] {
        h.queue.add_task(TaskSpec::new(name)).await.unwrap();
    }

    let summary = h.queue.process_queue().await;
    assert_eq!(summary.dispatched, 2);

    // One completion frees exactly one slot.
    let running: Vec<TaskId> = {
        let counts = h.queue.counts_by_status().await;
        assert_eq!(counts.running, 2);
        let mut running = Vec::new();
        for name in ["a", "b", "c", "d"] {
            let task = h.queue.get_task(&TaskId::new(name)).await.unwrap();
            if task.status == TaskStatus::Running {
                running.push(task.id);
            }
        }
        running
    };
    h.queue
        .report_outcome(&running[0], TaskOutcome::success(30))
        .await
        .unwrap();

    let summary = h.queue.process_queue().await;
    assert_eq!(summary.dispatched, 1);
    let counts = h.queue.counts_by_status().await;
    assert_eq!(counts.running, 2);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.ready, 1);
}

#[tokio::test]
async fn retry_with_backoff_waits_for_its_slot() {
    let config = OrchestratorConfig {
        retry_base_delay_ms: 5_000,
        ..OrchestratorConfig::default()
    };
    let h = harness(config, &[("e1", 0.9)]);

    h.queue
        .add_task(TaskSpec::new("t1").with_max_attempts(3))
        .await
        .unwrap();
    h.queue.process_queue().await;
    h.queue
        .report_outcome(&TaskId::new("t1"), TaskOutcome::failure(10, "transient"))
        .await
        .unwrap();

    // Before the slot: still retrying, nothing dispatched.
    let summary = h.queue.process_queue().await;
    assert_eq!(summary.dispatched, 0);
    let t1 = h.queue.get_task(&TaskId::new("t1")).await.unwrap();
    assert_eq!(t1.status, TaskStatus::Retrying);

    h.clock.advance(TimeDelta::milliseconds(5_000));
    let summary = h.queue.process_queue().await;
    assert_eq!(summary.promoted, 1);
    assert_eq!(summary.dispatched, 1);
}
