//! Dependency graph materialized from a document's `depends_on` links.
//!
//! # Overview
//!
//! Each task's `depends_on` list is a set of outgoing edges `task → dependency`.
//! The graph is a read-only snapshot: build it with
//! [`DependencyGraph::from_document`] and rebuild after mutating.
//!
//! Links are weak references. Edges whose target does not exist in the
//! document are kept out of the traversable graph (they are reported by the
//! validator as dangling) but still show up in [`DependencyGraph::dependents_of`],
//! so a caller deleting a task learns who still points at it.
//!
//! `blocks` entries are the inverse spelling of the same relationship and are
//! not required to be symmetric. They count as dependents for deletion
//! purposes but are not traversed for cycles or readiness.
//!
//! Iteration order follows document order, so traversal results are
//! deterministic.

#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::collections::HashMap;

use crate::model::{Document, Status};

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Task ids in document order (first occurrence wins for duplicates).
    order: Vec<String>,
    /// task → existing dependencies, in declared order, without repeats.
    edges: HashMap<String, Vec<String>>,
    /// referenced id → tasks that depend on it or declare that it blocks them.
    dependents: HashMap<String, Vec<String>>,
    status: HashMap<String, Status>,
}

impl DependencyGraph {
    pub fn from_document(doc: &Document) -> Self {
        let mut graph = Self::default();

        for task in &doc.tasks {
            if graph.status.contains_key(&task.id) {
                continue;
            }
            graph.order.push(task.id.clone());
            graph.status.insert(task.id.clone(), task.status);
        }

        for task in &doc.tasks {
            let edges = graph.edges.entry(task.id.clone()).or_default();
            for dep in &task.depends_on {
                if graph.status.contains_key(dep) && !edges.contains(dep) {
                    edges.push(dep.clone());
                }
            }
            for dep in &task.depends_on {
                push_unique(graph.dependents.entry(dep.clone()).or_default(), &task.id);
            }
            for blocked in &task.blocks {
                push_unique(graph.dependents.entry(task.id.clone()).or_default(), blocked);
            }
        }

        graph
    }

    pub fn contains(&self, id: &str) -> bool {
        self.status.contains_key(id)
    }

    /// Task ids in document order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Existing tasks `id` depends on.
    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.edges.get(id).map_or(&[], Vec::as_slice)
    }

    /// Tasks that depend on `id` (via their `depends_on`, or via `id`'s `blocks`).
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.dependents
            .get(id)
            .map(|v| v.iter().map(String::as_str).filter(|d| *d != id).collect())
            .unwrap_or_default()
    }

    pub fn status_of(&self, id: &str) -> Option<Status> {
        self.status.get(id).copied()
    }

    /// Whether every declared dependency of `task` exists and is done.
    ///
    /// Dangling references count as unsatisfied.
    pub fn dependencies_done(&self, doc: &Document, task_id: &str) -> bool {
        doc.task(task_id).is_some_and(|task| {
            task.depends_on
                .iter()
                .all(|dep| self.status_of(dep) == Some(Status::Done))
        })
    }

    /// Tasks that can be picked up now: not started and nothing left to wait on.
    pub fn ready_tasks<'a>(&'a self, doc: &Document) -> Vec<&'a str> {
        self.task_ids()
            .filter(|id| {
                matches!(
                    self.status_of(id),
                    Some(Status::Backlog | Status::Todo | Status::Reopened)
                ) && self.dependencies_done(doc, id)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use chrono::{DateTime, Utc};

    fn task(id: &str, status: Status, deps: &[&str]) -> Task {
        let mut t = Task::minimal(id, id, DateTime::<Utc>::UNIX_EPOCH);
        t.status = status;
        t.depends_on = deps.iter().map(ToString::to_string).collect();
        t
    }

    fn doc(tasks: Vec<Task>) -> Document {
        Document {
            tasks,
            ..Document::default()
        }
    }

    #[test]
    fn dangling_edges_are_not_traversed() {
        let d = doc(vec![task("A", Status::Todo, &["B", "GHOST"]), task("B", Status::Done, &[])]);
        let g = DependencyGraph::from_document(&d);
        assert_eq!(g.dependencies_of("A"), ["B".to_string()]);
        assert_eq!(g.dependents_of("GHOST"), vec!["A"]);
        assert!(!g.dependencies_done(&d, "A"));
    }

    #[test]
    fn blocks_entries_count_as_dependents() {
        let mut a = task("A", Status::Todo, &[]);
        a.blocks = vec!["C".into()];
        let d = doc(vec![a, task("C", Status::Blocked, &[])]);
        let g = DependencyGraph::from_document(&d);
        assert_eq!(g.dependents_of("A"), vec!["C"]);
        assert!(g.dependencies_of("C").is_empty());
    }

    #[test]
    fn ready_requires_done_dependencies() {
        let d = doc(vec![
            task("A", Status::Done, &[]),
            task("B", Status::Todo, &["A"]),
            task("C", Status::Todo, &["B"]),
            task("D", Status::InProgress, &[]),
        ]);
        let g = DependencyGraph::from_document(&d);
        assert_eq!(g.ready_tasks(&d), vec!["B"]);
    }
}
