//! Circuit breaker: per-executor failure isolation and self-healing.
//!
//! State machine:
//! - Closed: dispatch permitted; failures accumulate inside a rolling window.
//! - Open: dispatch refused until the open timeout elapses; the next check
//!   after that lazily moves to HalfOpen (no background timer).
//! - HalfOpen: one probe in flight at a time; enough consecutive successes
//!   close the circuit, any failure reopens it immediately.
//!
//! The breaker is a pure state machine over an injected `now`; the queue's
//! dispatch path owns the registry and serializes all mutation.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::ids::ExecutorId;

/// Breaker state visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// When false, every check permits dispatch unconditionally.
    pub enabled: bool,

    /// Failures within the window that trip the circuit.
    pub failure_threshold: u32,

    /// Rolling window for failure counting, in milliseconds.
    pub window_ms: u64,

    /// How long an open circuit refuses traffic before probing, in
    /// milliseconds.
    pub open_timeout_ms: u64,

    /// Consecutive half-open successes required to close.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            window_ms: 60_000,
            open_timeout_ms: 30_000,
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.failure_threshold == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "circuit breaker failure threshold must be at least 1".into(),
            ));
        }
        if self.success_threshold == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "circuit breaker success threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a dispatch check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    Permitted,
    /// Refused; traffic may be permitted again at `retry_at`.
    Refused { retry_at: DateTime<Utc> },
}

impl CircuitDecision {
    pub fn is_permitted(self) -> bool {
        matches!(self, CircuitDecision::Permitted)
    }
}

/// A state transition the caller should surface as an event.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitTransition {
    Opened {
        failure_count: u32,
        next_attempt_at: DateTime<Utc>,
    },
    Closed,
}

/// Per-executor breaker record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_window_start: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub half_open_successes: u32,
    /// Half-open admits one probe at a time; set while that probe is
    /// outstanding.
    pub probe_in_flight: bool,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            failure_window_start: None,
            last_failure_at: None,
            opened_at: None,
            half_open_successes: 0,
            probe_in_flight: false,
        }
    }

    fn ms_since(earlier: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(earlier).num_milliseconds()
    }

    /// May this executor receive a dispatch right now?
    ///
    /// Open circuits whose timeout has elapsed lazily move to HalfOpen here,
    /// and the same check then admits the first probe.
    fn check_dispatch(&mut self, cfg: &CircuitBreakerConfig, now: DateTime<Utc>) -> CircuitDecision {
        if !cfg.enabled {
            return CircuitDecision::Permitted;
        }

        match self.state {
            CircuitState::Closed => CircuitDecision::Permitted,
            CircuitState::Open => {
                let opened_at = match self.opened_at {
                    Some(t) => t,
                    None => {
                        // Unreachable by construction; heal rather than refuse forever.
                        self.state = CircuitState::Closed;
                        return CircuitDecision::Permitted;
                    }
                };
                if Self::ms_since(opened_at, now) >= cfg.open_timeout_ms as i64 {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    self.probe_in_flight = true;
                    CircuitDecision::Permitted
                } else {
                    CircuitDecision::Refused {
                        retry_at: opened_at + TimeDelta::milliseconds(cfg.open_timeout_ms as i64),
                    }
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    // Probes are serial: concurrent attempts wait like Open.
                    CircuitDecision::Refused { retry_at: now }
                } else {
                    self.probe_in_flight = true;
                    CircuitDecision::Permitted
                }
            }
        }
    }

    fn record_success(&mut self, cfg: &CircuitBreakerConfig) -> Option<CircuitTransition> {
        match self.state {
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                self.half_open_successes += 1;
                if self.half_open_successes >= cfg.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.failure_window_start = None;
                    self.half_open_successes = 0;
                    self.opened_at = None;
                    Some(CircuitTransition::Closed)
                } else {
                    None
                }
            }
            // Closed successes carry no state; window expiry forgets failures.
            // Open successes are stragglers dispatched before the trip.
            CircuitState::Closed | CircuitState::Open => None,
        }
    }

    fn record_failure(
        &mut self,
        cfg: &CircuitBreakerConfig,
        now: DateTime<Utc>,
    ) -> Option<CircuitTransition> {
        self.last_failure_at = Some(now);
        match self.state {
            CircuitState::Closed => {
                let window_expired = match self.failure_window_start {
                    Some(start) => Self::ms_since(start, now) > cfg.window_ms as i64,
                    None => true,
                };
                if window_expired {
                    self.failure_count = 1;
                    self.failure_window_start = Some(now);
                } else {
                    self.failure_count += 1;
                }

                if self.failure_count >= cfg.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                    Some(CircuitTransition::Opened {
                        failure_count: self.failure_count,
                        next_attempt_at: now + TimeDelta::milliseconds(cfg.open_timeout_ms as i64),
                    })
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                // One failed probe reopens instantly; pin the count at the
                // threshold so the window cannot forget it.
                self.probe_in_flight = false;
                self.half_open_successes = 0;
                self.failure_count = cfg.failure_threshold;
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                Some(CircuitTransition::Opened {
                    failure_count: self.failure_count,
                    next_attempt_at: now + TimeDelta::milliseconds(cfg.open_timeout_ms as i64),
                })
            }
            // Straggler report from before the trip; already open.
            CircuitState::Open => None,
        }
    }

    /// Give back a half-open probe slot without recording an outcome.
    ///
    /// Used when a probe dispatch ends in neither success nor failure (a
    /// cancelled task); without this the serial probe gate would refuse
    /// the executor forever.
    fn release_probe(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.probe_in_flight = false;
        }
    }
}

/// Owned map of executor id -> breaker, created lazily on first dispatch
/// check. Exclusively mutated by the queue's dispatch/outcome paths.
pub struct CircuitBreakerRegistry {
    cfg: CircuitBreakerConfig,
    breakers: HashMap<ExecutorId, CircuitBreaker>,
}

impl CircuitBreakerRegistry {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            breakers: HashMap::new(),
        }
    }

    pub fn check_dispatch(&mut self, executor: &ExecutorId, now: DateTime<Utc>) -> CircuitDecision {
        self.breakers
            .entry(executor.clone())
            .or_insert_with(CircuitBreaker::new)
            .check_dispatch(&self.cfg, now)
    }

    pub fn record_success(&mut self, executor: &ExecutorId) -> Option<CircuitTransition> {
        self.breakers
            .entry(executor.clone())
            .or_insert_with(CircuitBreaker::new)
            .record_success(&self.cfg)
    }

    pub fn record_failure(
        &mut self,
        executor: &ExecutorId,
        now: DateTime<Utc>,
    ) -> Option<CircuitTransition> {
        self.breakers
            .entry(executor.clone())
            .or_insert_with(CircuitBreaker::new)
            .record_failure(&self.cfg, now)
    }

    pub fn release_probe(&mut self, executor: &ExecutorId) {
        if let Some(breaker) = self.breakers.get_mut(executor) {
            breaker.release_probe();
        }
    }

    /// `None` until a dispatch check has touched this executor (queries do
    /// not create breakers).
    pub fn state(&self, executor: &ExecutorId) -> Option<CircuitState> {
        self.breakers.get(executor).map(|b| b.state)
    }

    pub fn all_states(&self) -> HashMap<ExecutorId, CircuitState> {
        self.breakers
            .iter()
            .map(|(id, b)| (id.clone(), b.state))
            .collect()
    }
}
