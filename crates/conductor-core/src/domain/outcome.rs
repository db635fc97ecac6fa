//! Outcome model: what an executor reports back after working on a task.
//!
//! This is deliberately a struct rather than loose parameters so the
//! completion callback surface cannot grow implicit "undefined means skip"
//! arguments: defaults are stated here once.

use serde::{Deserialize, Serialize};

/// Result of one execution attempt, reported through
/// `TaskQueue::report_outcome`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,

    /// Wall-clock execution time as measured by the executor.
    pub duration_ms: u64,

    /// Subjective quality of the result in [0, 1]. `None` falls back to the
    /// matcher's configured default (0.8).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,

    /// Cancellation is failure-shaped but non-retryable: it terminalizes the
    /// task without consuming attempts or charging the executor's circuit.
    #[serde(default)]
    pub cancelled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn success(duration_ms: u64) -> Self {
        Self {
            success: true,
            duration_ms,
            quality_score: None,
            cancelled: false,
            error: None,
        }
    }

    pub fn failure(duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_ms,
            quality_score: None,
            cancelled: false,
            error: Some(error.into()),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_ms: 0,
            quality_score: None,
            cancelled: true,
            error: Some(reason.into()),
        }
    }

    pub fn with_quality(mut self, quality_score: f64) -> Self {
        self.quality_score = Some(quality_score);
        self
    }
}
