//! conductor-core
//!
//! Task orchestration engine for multi-agent platforms.
//!
//! # Module layout
//! - **domain**: domain model (ids, task, outcome, events, errors)
//! - **ports**: abstraction layer (Clock, CandidateSource)
//! - **queue**: the engine (TaskQueue, dependency graph, retry policy)
//! - **matcher**: performance-weighted executor selection
//! - **circuit**: per-executor circuit breakers
//! - **performance**: per-executor completion history
//! - **bus**: ordered in-process event delivery
//! - **config**: engine configuration
//! - **observability**: status views (counts, pass summaries)

pub mod bus;
pub mod circuit;
pub mod config;
pub mod domain;
pub mod matcher;
pub mod observability;
pub mod performance;
pub mod ports;
pub mod queue;

pub use bus::{EventBus, EventListener, SubscriptionId};
pub use circuit::{CircuitBreakerConfig, CircuitState};
pub use config::OrchestratorConfig;
pub use domain::{
    BlockedReason, EventKind, ExecutorId, OrchestratorError, OrchestratorEvent, OrchestratorResult,
    Task, TaskId, TaskOutcome, TaskSpec, TaskStatus,
};
pub use matcher::{AgentMatcher, MatchOutcome, MatcherConfig};
pub use observability::{PassSummary, QueueCounts};
pub use performance::AgentPerformanceMetrics;
pub use ports::{CandidateSource, Clock, ExecutorCandidate, FixedClock, StaticCandidates, SystemClock};
pub use queue::{RetryPolicy, TaskQueue};
