//! Cycle detection over the `depends_on` relation.
//!
//! # Overview
//!
//! A dependency cycle leaves every task on it waiting forever. Two entry
//! points cover the two places cycles matter:
//!
//! - [`find_all_cycles`] walks the whole graph for the validator. A DFS runs
//!   from every unvisited task with an explicit path stack; reaching a task
//!   that is already on the stack reports the stack suffix as one cycle, in
//!   traversal order.
//! - [`detect_cycle_on_add`] answers "would adding `from → to` close a loop?"
//!   before a create/edit is applied, so the mutation can be refused.
//!
//! Both are O(V+E). Diamonds and chains revisit finished nodes, which is
//! never a cycle, so only on-stack hits are reported.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tally_core::graph::{DependencyGraph, cycles::detect_cycle_on_add};
//!
//! let graph = DependencyGraph::from_document(&doc);
//! if let Some(cycle) = detect_cycle_on_add(&graph, "TASK-002", "TASK-001") {
//!     eprintln!("refusing: {cycle}");
//! }
//! ```

#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::deps::DependencyGraph;

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// A dependency loop.
///
/// `path` starts and ends at the same task: adding `A → B` to an existing
/// `B → C → A` gives `["A", "B", "C", "A"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub path: Vec<String>,
}

impl Cycle {
    /// Number of distinct tasks in the loop.
    pub fn len(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A task that depends on itself.
    pub fn is_self_loop(&self) -> bool {
        self.len() == 1
    }

    /// Two tasks depending on each other.
    pub fn is_mutual(&self) -> bool {
        self.len() == 2
    }

    /// Whether `id` sits on the loop.
    pub fn contains(&self, id: &str) -> bool {
        self.path.iter().any(|p| p == id)
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_self_loop() {
            write!(f, "circular dependency: {} depends on itself", self.path[0])
        } else if self.is_mutual() {
            write!(
                f,
                "circular dependency: {} and {} depend on each other",
                self.path[0], self.path[1]
            )
        } else {
            write!(f, "circular dependency: {}", self.path.join(" → "))
        }
    }
}

// ---------------------------------------------------------------------------
// Whole-graph scan
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

/// Every cycle reachable in the graph, one per back edge, in traversal order.
///
/// Roots are tried in document order and edges in declared order, so the
/// result is stable for a given document.
pub fn find_all_cycles(graph: &DependencyGraph) -> Vec<Cycle> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut cycles = Vec::new();

    for root in graph.task_ids() {
        if !marks.contains_key(root) {
            walk(graph, root, &mut marks, &mut cycles);
        }
    }

    cycles
}

/// Depth-first walk from `root` on a heap-allocated frame stack.
fn walk<'g>(
    graph: &'g DependencyGraph,
    root: &'g str,
    marks: &mut HashMap<&'g str, Mark>,
    cycles: &mut Vec<Cycle>,
) {
    let mut path: Vec<&'g str> = vec![root];
    let mut frames: Vec<std::slice::Iter<'g, String>> = vec![graph.dependencies_of(root).iter()];
    marks.insert(root, Mark::OnStack);

    while let Some(frame) = frames.last_mut() {
        let Some(dep) = frame.next() else {
            frames.pop();
            if let Some(node) = path.pop() {
                marks.insert(node, Mark::Done);
            }
            continue;
        };
        let dep = dep.as_str();
        match marks.get(dep) {
            Some(Mark::OnStack) => {
                if let Some(pos) = path.iter().position(|s| *s == dep) {
                    let mut looped: Vec<String> =
                        path[pos..].iter().map(ToString::to_string).collect();
                    looped.push(dep.to_string());
                    cycles.push(Cycle { path: looped });
                }
            }
            Some(Mark::Done) => {}
            None => {
                marks.insert(dep, Mark::OnStack);
                path.push(dep);
                frames.push(graph.dependencies_of(dep).iter());
            }
        }
    }
}

/// Whether the graph contains at least one cycle.
pub fn has_cycles(graph: &DependencyGraph) -> bool {
    !find_all_cycles(graph).is_empty()
}

// ---------------------------------------------------------------------------
// Edge check
// ---------------------------------------------------------------------------

/// Check whether adding the edge `from → to` (from depends on to) would
/// create a cycle.
///
/// Searches for an existing path `to ⇝ from`. Returns the loop the new edge
/// would close, or `None` if the edge is safe. Unknown endpoints never close
/// a loop, except the self-edge `from == to`.
pub fn detect_cycle_on_add(graph: &DependencyGraph, from: &str, to: &str) -> Option<Cycle> {
    if from == to {
        return Some(Cycle {
            path: vec![from.to_string(), from.to_string()],
        });
    }
    if !graph.contains(to) {
        return None;
    }

    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut pending: Vec<&str> = vec![to];
    seen.insert(to);

    while let Some(node) = pending.pop() {
        if node == from {
            let mut rev = vec![from];
            let mut cursor = from;
            while let Some(&prev) = parent.get(cursor) {
                rev.push(prev);
                cursor = prev;
            }
            let mut path = vec![from.to_string()];
            path.extend(rev.into_iter().rev().map(ToString::to_string));
            return Some(Cycle { path });
        }
        for dep in graph.dependencies_of(node) {
            if seen.insert(dep.as_str()) {
                parent.insert(dep.as_str(), node);
                pending.push(dep.as_str());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, Task};
    use chrono::{DateTime, Utc};

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let tasks = edges
            .iter()
            .map(|(id, deps)| {
                let mut t = Task::minimal(*id, *id, DateTime::<Utc>::UNIX_EPOCH);
                t.depends_on = deps.iter().map(ToString::to_string).collect();
                t
            })
            .collect();
        DependencyGraph::from_document(&Document {
            tasks,
            ..Document::default()
        })
    }

    #[test]
    fn very_long_chains_do_not_exhaust_the_stack() {
        let ids: Vec<String> = (0..200_000).map(|n| format!("T-{n}")).collect();
        let tasks = ids
            .iter()
            .enumerate()
            .map(|(n, id)| {
                let mut t = Task::minimal(id.as_str(), id.as_str(), DateTime::<Utc>::UNIX_EPOCH);
                let next = (n + 1) % ids.len();
                t.depends_on = vec![ids[next].clone()];
                t
            })
            .collect();
        let g = DependencyGraph::from_document(&Document {
            tasks,
            ..Document::default()
        });

        let cycles = find_all_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].path.len(), ids.len() + 1);
        assert_eq!(cycles[0].path.first(), cycles[0].path.last());
    }

    #[test]
    fn mutual_dependency_is_a_cycle() {
        let cycles = find_all_cycles(&graph(&[("A", &["B"]), ("B", &["A"])]));
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].path, vec!["A", "B", "A"]);
        assert!(cycles[0].is_mutual());
    }

    #[test]
    fn three_node_cycle_in_traversal_order() {
        let cycles = find_all_cycles(&graph(&[("A", &["B"]), ("B", &["C"]), ("C", &["A"])]));
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].path, vec!["A", "B", "C", "A"]);
        assert_eq!(cycles[0].to_string(), "circular dependency: A → B → C → A");
    }

    #[test]
    fn cycle_below_an_acyclic_root() {
        let cycles = find_all_cycles(&graph(&[("R", &["A"]), ("A", &["B"]), ("B", &["A"])]));
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].path, vec!["A", "B", "A"]);
        assert!(!cycles[0].contains("R"));
    }

    #[test]
    fn self_loop() {
        let cycles = find_all_cycles(&graph(&[("A", &["A"])]));
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].is_self_loop());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let g = graph(&[("A", &["B", "C"]), ("B", &["D"]), ("C", &["D"]), ("D", &[])]);
        assert!(!has_cycles(&g));
    }

    #[test]
    fn chain_is_not_a_cycle() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &["D"]), ("D", &[])]);
        assert!(!has_cycles(&g));
    }

    #[test]
    fn adding_back_edge_is_detected() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &[])]);
        let cycle = detect_cycle_on_add(&g, "C", "A").unwrap();
        assert_eq!(cycle.path, vec!["C", "A", "B", "C"]);
        assert!(detect_cycle_on_add(&g, "A", "C").is_none());
    }

    #[test]
    fn adding_edge_to_unknown_task_is_safe() {
        let g = graph(&[("A", &[])]);
        assert!(detect_cycle_on_add(&g, "A", "GHOST").is_none());
        assert!(detect_cycle_on_add(&g, "A", "A").is_some());
    }
}
