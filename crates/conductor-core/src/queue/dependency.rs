//! Dependency graph for task readiness.
//!
//! Design:
//! - Forward edges: task -> tasks it waits for.
//! - Reverse edges: task -> tasks waiting for it.
//! - Invariant: the two edge maps are kept in sync.
//!
//! Edges may reference task ids that have not been added yet; readiness is
//! always evaluated against actual task state, never against the graph alone.
//! A dependency that never completes legitimately blocks its dependents
//! forever, so there is no cycle rejection here.

use std::collections::{HashMap, HashSet};

use crate::domain::TaskId;

/// Forward + reverse dependency edges over task ids.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// task -> tasks it depends on.
    edges: HashMap<TaskId, HashSet<TaskId>>,

    /// task -> tasks that depend on it. O(1) "who is waiting for this?".
    reverse_edges: HashMap<TaskId, HashSet<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `task` depends on `depends_on`.
    pub fn add_dependency(&mut self, task: &TaskId, depends_on: &TaskId) {
        self.edges
            .entry(task.clone())
            .or_default()
            .insert(depends_on.clone());
        self.reverse_edges
            .entry(depends_on.clone())
            .or_default()
            .insert(task.clone());
    }

    /// Tasks that were waiting for `completed` (they may still have other
    /// unmet dependencies; the caller re-checks full readiness).
    pub fn dependents_of(&self, completed: &TaskId) -> Vec<TaskId> {
        self.reverse_edges
            .get(completed)
            .map(|waiting| waiting.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dependencies_of(&self, task: &TaskId) -> Vec<TaskId> {
        self.edges
            .get(task)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_dependencies(&self, task: &TaskId) -> bool {
        self.edges.get(task).is_some_and(|deps| !deps.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TaskId {
        TaskId::new(s)
    }

    #[test]
    fn new_graph_is_empty() {
        let graph = DependencyGraph::new();
        assert!(!graph.has_dependencies(&id("t1")));
        assert!(graph.dependents_of(&id("t1")).is_empty());
    }

    #[test]
    fn add_dependency_creates_both_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&id("b"), &id("a")); // B waits for A

        assert!(graph.has_dependencies(&id("b")));
        assert!(!graph.has_dependencies(&id("a")));
        assert_eq!(graph.dependencies_of(&id("b")), vec![id("a")]);
        assert_eq!(graph.dependents_of(&id("a")), vec![id("b")]);
    }

    #[test]
    fn multiple_dependents_are_all_reported() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&id("b"), &id("a"));
        graph.add_dependency(&id("c"), &id("a"));

        let mut waiting = graph.dependents_of(&id("a"));
        waiting.sort();
        assert_eq!(waiting, vec![id("b"), id("c")]);
    }

    #[test]
    fn diamond_shape_keeps_edges_distinct() {
        let mut graph = DependencyGraph::new();
        // d waits for b and c, both wait for a.
        graph.add_dependency(&id("b"), &id("a"));
        graph.add_dependency(&id("c"), &id("a"));
        graph.add_dependency(&id("d"), &id("b"));
        graph.add_dependency(&id("d"), &id("c"));

        let mut deps = graph.dependencies_of(&id("d"));
        deps.sort();
        assert_eq!(deps, vec![id("b"), id("c")]);
        assert_eq!(graph.dependents_of(&id("b")), vec![id("d")]);
    }

    #[test]
    fn edges_may_point_at_unknown_tasks() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&id("b"), &id("never-added"));
        assert!(graph.has_dependencies(&id("b")));
    }
}
