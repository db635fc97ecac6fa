//! Status views for dashboards and tests.

use serde::{Deserialize, Serialize};

/// Task counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub blocked: usize,
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub retrying: usize,
}

/// What one `process_queue` pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    /// Tasks promoted to ready this pass.
    pub promoted: usize,
    /// Tasks dispatched to executors this pass.
    pub dispatched: usize,
    /// Tasks blocked this pass (circuit refusal or failed dependency).
    pub blocked: usize,
}
