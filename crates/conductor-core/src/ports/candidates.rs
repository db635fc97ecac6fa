//! CandidateSource port - who could run this task, and how well does it fit.
//!
//! Similarity scoring (embedding cosine similarity or anything else) happens
//! outside the engine; the queue only consumes the resulting `[0, 1]` score
//! attached to each candidate.

use async_trait::async_trait;

use crate::domain::{ExecutorId, Task};

/// An executor offered for a task, annotated with its precomputed
/// task/executor similarity score in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorCandidate {
    pub id: ExecutorId,
    pub similarity: f64,
}

impl ExecutorCandidate {
    pub fn new(id: impl Into<ExecutorId>, similarity: f64) -> Self {
        Self {
            id: id.into(),
            similarity: similarity.clamp(0.0, 1.0),
        }
    }
}

/// Supplies candidate executors for a task during a queue pass.
///
/// Implementations may call out to an embedding service; the queue never
/// holds internal locks while awaiting this.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates_for(&self, task: &Task) -> Vec<ExecutorCandidate>;
}

/// Fixed candidate list, same for every task. Useful for demos and tests.
pub struct StaticCandidates {
    candidates: Vec<ExecutorCandidate>,
}

impl StaticCandidates {
    pub fn new(candidates: Vec<ExecutorCandidate>) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl CandidateSource for StaticCandidates {
    async fn candidates_for(&self, _task: &Task) -> Vec<ExecutorCandidate> {
        self.candidates.clone()
    }
}
