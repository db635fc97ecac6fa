//! Per-executor performance metrics (reliability / quality / speed).
//!
//! Records are created on first completion, updated as running averages, and
//! never deleted by the engine. The matcher's completion-recording path is
//! the sole writer; everyone else gets snapshots.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ExecutorId;

/// Rolling metrics for one executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformanceMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_tasks: u64,

    /// Running average of reported completion times.
    pub average_completion_time_ms: f64,

    /// Running average of reported quality scores, in [0, 1].
    pub average_quality_score: f64,

    /// Derived: success_count / total_tasks, as a percentage.
    pub success_rate: f64,

    pub last_updated: DateTime<Utc>,
}

impl AgentPerformanceMetrics {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            total_tasks: 0,
            average_completion_time_ms: 0.0,
            average_quality_score: 0.0,
            success_rate: 0.0,
            last_updated: now,
        }
    }

    fn record(&mut self, success: bool, completion_time_ms: u64, quality: f64, now: DateTime<Utc>) {
        self.total_tasks += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }

        // Stable running average: new = old + (x - old) / n.
        let n = self.total_tasks as f64;
        self.average_completion_time_ms +=
            (completion_time_ms as f64 - self.average_completion_time_ms) / n;
        self.average_quality_score += (quality - self.average_quality_score) / n;
        self.success_rate = self.success_count as f64 / n * 100.0;
        self.last_updated = now;
    }

    /// Blend of reliability, quality, and speed in [0, 1].
    ///
    /// Speed saturates at 30s: anything slower scores 0 on that component.
    pub fn performance_score(&self) -> f64 {
        let speed = 1.0 - (self.average_completion_time_ms / 30_000.0).min(1.0);
        0.5 * (self.success_rate / 100.0)
            + 0.3 * self.average_quality_score
            + 0.2 * speed.max(0.0)
    }
}

/// Owned map of executor id -> metrics.
pub struct PerformanceTracker {
    metrics: RwLock<HashMap<ExecutorId, AgentPerformanceMetrics>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Record one completion and return the updated snapshot.
    pub fn record_completion(
        &self,
        executor: &ExecutorId,
        success: bool,
        completion_time_ms: u64,
        quality: f64,
        now: DateTime<Utc>,
    ) -> AgentPerformanceMetrics {
        let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        let entry = metrics
            .entry(executor.clone())
            .or_insert_with(|| AgentPerformanceMetrics::new(now));
        entry.record(success, completion_time_ms, quality, now);
        entry.clone()
    }

    pub fn get(&self, executor: &ExecutorId) -> Option<AgentPerformanceMetrics> {
        self.metrics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(executor)
            .cloned()
    }

    pub fn all(&self) -> HashMap<ExecutorId, AgentPerformanceMetrics> {
        self.metrics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}
