//! Domain identifiers (strongly-typed IDs).
//!
//! Both task ids and executor ids are supplied by the caller (the engine does
//! not generate identity), so these are thin newtypes over `String`. The point
//! of keeping them as distinct types is that a `TaskId` and an `ExecutorId`
//! can never be swapped in a signature by accident.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a task (unique within the queue).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of an executor ("agent"). Opaque to the engine: the matcher and
/// circuit breaker key their per-executor state by this id and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorId(String);

impl ExecutorId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ExecutorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_their_raw_value() {
        assert_eq!(TaskId::new("t1").to_string(), "t1");
        assert_eq!(ExecutorId::new("agent-7").to_string(), "agent-7");
    }

    #[test]
    fn ids_are_ordered_lexicographically() {
        // The matcher relies on this for its deterministic tie-break.
        assert!(ExecutorId::new("a") < ExecutorId::new("b"));
        assert!(ExecutorId::new("agent-1") < ExecutorId::new("agent-2"));
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = TaskId::new("t1");
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"t1\"");
        let back: TaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }
}
