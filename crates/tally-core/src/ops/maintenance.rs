//! Bulk housekeeping: archiving finished work and repairing the id counter.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::graph::DependencyGraph;
use crate::model::{Document, Status, Task};

/// Remove done tasks and return them in document order.
///
/// A done task is kept while any task that is not itself being archived
/// still depends on it, so archiving never creates dangling `depends_on`
/// references.
pub fn archive_completed(doc: &mut Document, now: DateTime<Utc>) -> Vec<Task> {
    let graph = DependencyGraph::from_document(doc);
    let mut archivable: HashSet<String> = doc
        .tasks
        .iter()
        .filter(|t| t.status == Status::Done)
        .map(|t| t.id.clone())
        .collect();

    // Drop candidates with a live dependent until nothing changes; a kept
    // task can pin the done tasks it depends on in turn.
    loop {
        let pinned: Vec<String> = archivable
            .iter()
            .filter(|id| {
                graph
                    .dependents_of(id)
                    .into_iter()
                    .any(|d| graph.contains(d) && !archivable.contains(d))
            })
            .cloned()
            .collect();
        if pinned.is_empty() {
            break;
        }
        for id in pinned {
            archivable.remove(&id);
        }
    }

    if archivable.is_empty() {
        return Vec::new();
    }

    let (archived, kept): (Vec<Task>, Vec<Task>) = std::mem::take(&mut doc.tasks)
        .into_iter()
        .partition(|t| archivable.contains(&t.id));
    doc.tasks = kept;
    doc.touch(now);
    tracing::info!(count = archived.len(), "archived completed tasks");
    archived
}

/// Raise `next_id` above every existing id number.
///
/// Returns `(old, new)` when the counter moved.
pub fn repair_next_id(doc: &mut Document, now: DateTime<Utc>) -> Option<(u64, u64)> {
    let previous = doc.raise_next_id()?;
    doc.touch(now);
    tracing::warn!(from = previous, to = doc.meta.next_id, "repaired next_id");
    Some((previous, doc.meta.next_id))
}
