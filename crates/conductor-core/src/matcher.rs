//! AgentMatcher: performance-weighted executor selection.
//!
//! The matcher combines an externally supplied similarity score with the
//! executor's historical performance:
//!
//! ```text
//! weighted = similarity * (1 - w) + performance * w
//! ```
//!
//! with `w` the configured performance weight. Executors without history get
//! a neutral performance score so newcomers are neither penalized nor
//! favored. Ties break on lowest executor id so selection is reproducible.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::EventBus;
use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::{EventKind, ExecutorId, OrchestratorEvent, TaskId};
use crate::performance::{AgentPerformanceMetrics, PerformanceTracker};
use crate::ports::{Clock, ExecutorCandidate};

/// Performance score used when an executor has no recorded history.
const NEUTRAL_PERFORMANCE_SCORE: f64 = 0.5;

/// Matcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// When false, completions are not recorded and selection is pure
    /// similarity ranking.
    pub enable_tracking: bool,

    /// Share of the weighted score taken from historical performance, [0, 1].
    pub performance_weight: f64,

    /// Quality assumed when a completion report carries no score.
    pub default_quality_score: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            enable_tracking: true,
            performance_weight: 0.3,
            default_quality_score: 0.8,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> OrchestratorResult<()> {
        if !(0.0..=1.0).contains(&self.performance_weight) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "performance weight must be in [0, 1], got {}",
                self.performance_weight
            )));
        }
        if !(0.0..=1.0).contains(&self.default_quality_score) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "default quality score must be in [0, 1], got {}",
                self.default_quality_score
            )));
        }
        Ok(())
    }
}

/// Result of a selection round. Exhausted candidate lists are a normal
/// outcome, not an error: the task simply stays ready for the next pass.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched {
        executor_id: ExecutorId,
        similarity: f64,
        weighted_score: f64,
    },
    NoMatch,
}

impl MatchOutcome {
    pub fn executor(&self) -> Option<&ExecutorId> {
        match self {
            MatchOutcome::Matched { executor_id, .. } => Some(executor_id),
            MatchOutcome::NoMatch => None,
        }
    }
}

/// Selects the best executor for a task and owns the performance records.
pub struct AgentMatcher {
    config: MatcherConfig,
    tracker: PerformanceTracker,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl AgentMatcher {
    pub fn new(
        config: MatcherConfig,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> OrchestratorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tracker: PerformanceTracker::new(),
            bus,
            clock,
        })
    }

    fn performance_score(&self, executor: &ExecutorId) -> f64 {
        self.tracker
            .get(executor)
            .map(|m| m.performance_score())
            .unwrap_or(NEUTRAL_PERFORMANCE_SCORE)
    }

    /// Pick the highest weighted-score candidate for `task_id`.
    ///
    /// Emits `match_found` or `match_failed`.
    pub fn select(
        &self,
        task_id: &TaskId,
        task_name: &str,
        candidates: &[ExecutorCandidate],
    ) -> MatchOutcome {
        let started = Instant::now();
        let weight = if self.config.enable_tracking {
            self.config.performance_weight
        } else {
            0.0
        };

        let mut best: Option<(&ExecutorCandidate, f64)> = None;
        for candidate in candidates {
            let performance = self.performance_score(&candidate.id);
            let weighted = candidate.similarity * (1.0 - weight) + performance * weight;

            let better = match best {
                None => true,
                Some((current, current_score)) => {
                    weighted > current_score
                        || (weighted == current_score && candidate.id < current.id)
                }
            };
            if better {
                best = Some((candidate, weighted));
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let now = self.clock.now();

        match best {
            Some((candidate, weighted_score)) => {
                debug!(task = %task_id, executor = %candidate.id, weighted_score, "match found");
                self.bus.publish(
                    &OrchestratorEvent::new(EventKind::MatchFound, now)
                        .with_task(task_id, task_name)
                        .with_executor(&candidate.id)
                        .with_meta("similarity_score", candidate.similarity)
                        .with_meta("weighted_score", weighted_score)
                        .with_meta("match_reason", "highest_weighted_score")
                        .with_meta("match_duration_ms", duration_ms),
                );
                MatchOutcome::Matched {
                    executor_id: candidate.id.clone(),
                    similarity: candidate.similarity,
                    weighted_score,
                }
            }
            None => {
                debug!(task = %task_id, "no eligible candidates");
                self.bus.publish(
                    &OrchestratorEvent::new(EventKind::MatchFailed, now)
                        .with_task(task_id, task_name)
                        .with_meta("candidate_count", candidates.len())
                        .with_meta("match_duration_ms", duration_ms),
                );
                MatchOutcome::NoMatch
            }
        }
    }

    /// Record one task completion against an executor's history.
    ///
    /// This is the sole mutator of performance state. Emits
    /// `performance_updated` with a snapshot of the new metrics. A no-op when
    /// tracking is disabled.
    pub fn record_task_completion(
        &self,
        executor: &ExecutorId,
        task_id: &TaskId,
        success: bool,
        completion_time_ms: u64,
        quality_score: Option<f64>,
    ) {
        if !self.config.enable_tracking {
            return;
        }

        let quality = quality_score
            .unwrap_or(self.config.default_quality_score)
            .clamp(0.0, 1.0);
        let now = self.clock.now();
        let snapshot = self
            .tracker
            .record_completion(executor, success, completion_time_ms, quality, now);

        let metrics_json =
            serde_json::to_value(&snapshot).unwrap_or_else(|_| serde_json::Value::Null);
        self.bus.publish(
            &OrchestratorEvent::new(EventKind::PerformanceUpdated, now)
                .with_task(task_id, task_id.as_str())
                .with_executor(executor)
                .with_meta("success", success)
                .with_meta("metrics", metrics_json),
        );
    }

    pub fn performance(&self, executor: &ExecutorId) -> Option<AgentPerformanceMetrics> {
        self.tracker.get(executor)
    }

    pub fn all_performance_metrics(
        &self,
    ) -> std::collections::HashMap<ExecutorId, AgentPerformanceMetrics> {
        self.tracker.all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::SystemClock;
    use rstest::rstest;
    use std::sync::Mutex;

    fn matcher(config: MatcherConfig) -> AgentMatcher {
        AgentMatcher::new(config, Arc::new(EventBus::new()), Arc::new(SystemClock)).unwrap()
    }

    fn candidates(pairs: &[(&str, f64)]) -> Vec<ExecutorCandidate> {
        pairs
            .iter()
            .map(|(id, sim)| ExecutorCandidate::new(*id, *sim))
            .collect()
    }

    #[test]
    fn no_history_uses_neutral_performance() {
        // 0.9*0.7 + 0.5*0.3 = 0.78 vs 0.85*0.7 + 0.5*0.3 = 0.745
        let m = matcher(MatcherConfig::default());
        let outcome = m.select(
            &TaskId::new("t1"),
            "t1",
            &candidates(&[("a", 0.9), ("b", 0.85)]),
        );
        match outcome {
            MatchOutcome::Matched {
                executor_id,
                weighted_score,
                ..
            } => {
                assert_eq!(executor_id, ExecutorId::new("a"));
                assert!((weighted_score - 0.78).abs() < 1e-9);
            }
            MatchOutcome::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn empty_candidates_yield_no_match_not_error() {
        let m = matcher(MatcherConfig::default());
        assert_eq!(m.select(&TaskId::new("t1"), "t1", &[]), MatchOutcome::NoMatch);
    }

    #[test]
    fn zero_weight_is_pure_similarity_ranking() {
        let config = MatcherConfig {
            performance_weight: 0.0,
            ..MatcherConfig::default()
        };
        let m = matcher(config);

        // Give "b" a dismal history; with weight 0 it must not matter.
        for _ in 0..10 {
            m.record_task_completion(&ExecutorId::new("b"), &TaskId::new("t"), false, 60_000, Some(0.0));
        }
        let outcome = m.select(
            &TaskId::new("t1"),
            "t1",
            &candidates(&[("a", 0.4), ("b", 0.6)]),
        );
        assert_eq!(outcome.executor(), Some(&ExecutorId::new("b")));
    }

    #[test]
    fn history_shifts_selection_when_weighted() {
        let m = matcher(MatcherConfig::default());

        // "fast" is reliable and quick; "close" merely similar.
        for _ in 0..10 {
            m.record_task_completion(&ExecutorId::new("fast"), &TaskId::new("t"), true, 100, Some(1.0));
            m.record_task_completion(&ExecutorId::new("close"), &TaskId::new("t"), false, 25_000, Some(0.1));
        }
        let outcome = m.select(
            &TaskId::new("t1"),
            "t1",
            &candidates(&[("close", 0.82), ("fast", 0.80)]),
        );
        assert_eq!(outcome.executor(), Some(&ExecutorId::new("fast")));
    }

    #[test]
    fn ties_break_on_lowest_executor_id() {
        let m = matcher(MatcherConfig::default());
        let outcome = m.select(
            &TaskId::new("t1"),
            "t1",
            &candidates(&[("zeta", 0.5), ("alpha", 0.5), ("mid", 0.5)]),
        );
        assert_eq!(outcome.executor(), Some(&ExecutorId::new("alpha")));
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.3)]
    #[case(0.7)]
    #[case(1.0)]
    fn weighted_score_is_monotone_in_similarity(#[case] weight: f64) {
        let config = MatcherConfig {
            performance_weight: weight,
            ..MatcherConfig::default()
        };
        let m = matcher(config);

        // Same (empty) history for both, so higher similarity must never
        // rank below lower similarity at any weight. At weight 1.0 the two
        // tie on neutral performance and "hi" still wins the id break.
        let outcome = m.select(
            &TaskId::new("t1"),
            "t1",
            &candidates(&[("hi", 0.9), ("lo", 0.2)]),
        );
        assert_eq!(outcome.executor(), Some(&ExecutorId::new("hi")));
    }

    #[test]
    fn tracking_disabled_records_nothing() {
        let config = MatcherConfig {
            enable_tracking: false,
            ..MatcherConfig::default()
        };
        let m = matcher(config);
        m.record_task_completion(&ExecutorId::new("e1"), &TaskId::new("t1"), true, 100, None);
        assert!(m.performance(&ExecutorId::new("e1")).is_none());
    }

    #[test]
    fn default_quality_applies_when_report_has_none() {
        let m = matcher(MatcherConfig::default());
        m.record_task_completion(&ExecutorId::new("e1"), &TaskId::new("t1"), true, 100, None);
        let metrics = m.performance(&ExecutorId::new("e1")).unwrap();
        assert!((metrics.average_quality_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn match_events_are_published() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        bus.subscribe_fn(move |ev| seen2.lock().unwrap().push(ev.kind));

        let m = AgentMatcher::new(MatcherConfig::default(), Arc::clone(&bus), Arc::new(SystemClock))
            .unwrap();
        m.select(&TaskId::new("t1"), "t1", &candidates(&[("a", 0.9)]));
        m.select(&TaskId::new("t2"), "t2", &[]);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::MatchFound, EventKind::MatchFailed]
        );
    }

    #[test]
    fn invalid_weight_is_fatal_at_construction() {
        let config = MatcherConfig {
            performance_weight: 1.5,
            ..MatcherConfig::default()
        };
        assert!(AgentMatcher::new(config, Arc::new(EventBus::new()), Arc::new(SystemClock)).is_err());
    }
}
