//! Task lifecycle operations.

use chrono::{DateTime, NaiveDate, Utc};

use super::{OpResult, actions, entry, record, require_actor, require_task};
use crate::error::PreconditionError;
use crate::graph::{DependencyGraph, detect_cycle_on_add};
use crate::model::{AgentStatus, Deliverable, Document, Priority, Status, Task};
use crate::parse::values::dedup_ordered;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Fields for [`create_task`]. Everything but the title is optional.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    /// Defaults to `todo`.
    pub status: Option<Status>,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    pub due: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
    pub blocks: Vec<String>,
    pub estimated_hours: Option<f64>,
    pub description: String,
    pub deliverables: Vec<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Field changes for [`edit_task`]. `None` leaves a field alone; for the
/// nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Option<String>>,
    pub due: Option<Option<NaiveDate>>,
    pub tags: Option<Vec<String>>,
    pub depends_on: Option<Vec<String>>,
    pub blocks: Option<Vec<String>>,
    pub estimated_hours: Option<Option<f64>>,
    pub actual_hours: Option<Option<f64>>,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Mint a fresh id and append a new task. Returns the new id.
///
/// # Errors
///
/// Empty title or actor, or a `depends_on`/`blocks` entry naming a task that
/// does not exist.
pub fn create_task(
    doc: &mut Document,
    new: NewTask,
    actor: &str,
    now: DateTime<Utc>,
) -> OpResult<String> {
    let actor = &require_actor(actor)?;
    let title = new.title.trim();
    if title.is_empty() {
        return Err(PreconditionError::EmptyTitle);
    }
    require_hours("estimated_hours", new.estimated_hours)?;
    let depends_on = dedup_ordered(new.depends_on);
    let blocks = dedup_ordered(new.blocks);
    for reference in depends_on.iter().chain(&blocks) {
        if doc.task(reference).is_none() {
            return Err(PreconditionError::UnknownReference {
                id: "(new)".to_string(),
                reference: reference.clone(),
            });
        }
    }

    let Some(id) = doc.mint_id() else {
        return Err(PreconditionError::IdSpaceExhausted {
            prefix: doc.meta.id_prefix.clone(),
        });
    };
    let mut task = Task::minimal(id.clone(), title, now);
    task.status = new.status.unwrap_or(Status::Todo);
    task.priority = new.priority;
    task.assigned_to = new.assigned_to;
    task.created_by = actor.to_string();
    task.due = new.due;
    task.tags = dedup_ordered(new.tags);
    task.depends_on = depends_on;
    task.blocks = blocks;
    task.estimated_hours = new.estimated_hours;
    task.description = new.description;
    task.deliverables = new
        .deliverables
        .into_iter()
        .map(|name| Deliverable { name, done: false })
        .collect();
    task.record(entry(now, actor, actions::CREATED));

    doc.tasks.push(task);
    doc.touch(now);
    tracing::debug!(task = %id, actor = %actor, "created task");
    Ok(id)
}

// ---------------------------------------------------------------------------
// Claim / release
// ---------------------------------------------------------------------------

/// Take ownership of a task and move it to `in_progress`.
///
/// If the actor is on the roster, its status and `working_on` follow.
///
/// # Errors
///
/// Unknown task, an existing claim, or a task already done.
pub fn claim_task(doc: &mut Document, id: &str, actor: &str, now: DateTime<Utc>) -> OpResult<()> {
    let actor = &require_actor(actor)?;
    let task = require_task(doc, id)?;
    if let Some(by) = &task.claimed_by {
        return Err(PreconditionError::AlreadyClaimed {
            id: id.to_string(),
            by: by.clone(),
        });
    }
    if task.status == Status::Done {
        return Err(PreconditionError::AlreadyDone { id: id.to_string() });
    }
    let from = task.status;

    if let Some(task) = doc.task_mut(id) {
        task.claimed_by = Some(actor.to_string());
        task.status = Status::InProgress;
    }
    record(
        doc,
        id,
        entry(now, actor, actions::CLAIMED).with_transition(from, Status::InProgress),
    );
    if let Some(agent) = doc.agent_mut(actor) {
        agent.status = AgentStatus::Working;
        agent.working_on = Some(id.to_string());
        agent.last_active = Some(now);
    }
    Ok(())
}

/// Drop the actor's claim. An `in_progress` task falls back to `todo`.
///
/// # Errors
///
/// Unknown task, no claim, or a claim held by someone else.
pub fn release_task(
    doc: &mut Document,
    id: &str,
    actor: &str,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> OpResult<()> {
    let actor = &require_actor(actor)?;
    let task = require_task(doc, id)?;
    match &task.claimed_by {
        None => return Err(PreconditionError::NotClaimed { id: id.to_string() }),
        Some(by) if by != actor => {
            return Err(PreconditionError::ClaimedByOther {
                id: id.to_string(),
                by: by.clone(),
                actor: actor.to_string(),
            });
        }
        Some(_) => {}
    }
    let from = task.status;
    let to = if from == Status::InProgress { Status::Todo } else { from };

    if let Some(task) = doc.task_mut(id) {
        task.claimed_by = None;
        task.status = to;
    }
    let mut released = entry(now, actor, actions::RELEASED);
    if from != to {
        released = released.with_transition(from, to);
    }
    if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
        released = released.with_note(note);
    }
    record(doc, id, released);
    clear_working_on(doc, actor, id, now);
    Ok(())
}

// ---------------------------------------------------------------------------
// Complete / reopen
// ---------------------------------------------------------------------------

/// Mark a task done, drop its claim, and unblock dependents that were only
/// waiting on finished work.
///
/// A dependent moves from `blocked` to `todo` when every one of its
/// `depends_on` entries is done. Each such task gets its own history entry
/// attributed to `actor`. Returns the unblocked ids in document order.
///
/// # Errors
///
/// Unknown task, or a task already done.
pub fn complete_task(
    doc: &mut Document,
    id: &str,
    actor: &str,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> OpResult<Vec<String>> {
    let actor = &require_actor(actor)?;
    let task = require_task(doc, id)?;
    if task.status == Status::Done {
        return Err(PreconditionError::AlreadyDone { id: id.to_string() });
    }
    let from = task.status;
    let claimant = task.claimed_by.clone();

    if let Some(task) = doc.task_mut(id) {
        task.status = Status::Done;
        task.claimed_by = None;
    }
    let mut done = entry(now, actor, actions::COMPLETED).with_transition(from, Status::Done);
    if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
        done = done.with_note(note);
    }
    record(doc, id, done);
    if let Some(claimant) = claimant {
        clear_working_on(doc, &claimant, id, now);
    }

    let graph = DependencyGraph::from_document(doc);
    let unblocked: Vec<String> = graph
        .dependents_of(id)
        .into_iter()
        .filter(|dep| {
            graph.status_of(dep) == Some(Status::Blocked)
                && doc.task(dep).is_some_and(|t| t.depends_on.iter().any(|d| d == id))
                && graph.dependencies_done(doc, dep)
        })
        .map(ToString::to_string)
        .collect();

    for dep in &unblocked {
        if let Some(task) = doc.task_mut(dep) {
            task.status = Status::Todo;
        }
        record(
            doc,
            dep,
            entry(now, actor, actions::UNBLOCKED)
                .with_note(format!("unblocked by completion of {id}"))
                .with_transition(Status::Blocked, Status::Todo),
        );
    }
    if !unblocked.is_empty() {
        tracing::info!(task = %id, unblocked = ?unblocked, "completion unblocked dependents");
    }
    Ok(unblocked)
}

/// Move a done task back to `reopened`.
///
/// # Errors
///
/// Unknown task, or a task that is not done.
pub fn reopen_task(
    doc: &mut Document,
    id: &str,
    actor: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> OpResult<()> {
    let actor = &require_actor(actor)?;
    let task = require_task(doc, id)?;
    if task.status != Status::Done {
        return Err(PreconditionError::NotDone { id: id.to_string() });
    }

    if let Some(task) = doc.task_mut(id) {
        task.status = Status::Reopened;
    }
    let mut reopened =
        entry(now, actor, actions::REOPENED).with_transition(Status::Done, Status::Reopened);
    if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
        reopened = reopened.with_note(reason);
    }
    record(doc, id, reopened);
    Ok(())
}

// ---------------------------------------------------------------------------
// Edit
// ---------------------------------------------------------------------------

/// Apply field changes with a single `edited` history entry.
///
/// The entry's note lists the changed fields. A status change is recorded as
/// the from/to transition; a priority change takes the from/to pair when the
/// status stayed put, and is spelled out in the note when both moved.
/// Setting `done` here does not unblock dependents.
///
/// # Errors
///
/// Unknown task, empty title, unknown or self references, a new dependency
/// that would close a cycle, or an edit that changes nothing.
pub fn edit_task(
    doc: &mut Document,
    id: &str,
    edit: TaskEdit,
    actor: &str,
    now: DateTime<Utc>,
) -> OpResult<()> {
    let actor = &require_actor(actor)?;
    let current = require_task(doc, id)?;

    if let Some(title) = &edit.title {
        if title.trim().is_empty() {
            return Err(PreconditionError::EmptyTitle);
        }
    }
    require_hours("estimated_hours", edit.estimated_hours.flatten())?;
    require_hours("actual_hours", edit.actual_hours.flatten())?;
    let depends_on = edit.depends_on.map(dedup_ordered);
    let blocks = edit.blocks.map(dedup_ordered);
    for reference in depends_on.iter().flatten().chain(blocks.iter().flatten()) {
        if reference == id || doc.task(reference).is_none() {
            return Err(PreconditionError::UnknownReference {
                id: id.to_string(),
                reference: reference.clone(),
            });
        }
    }
    if let Some(deps) = &depends_on {
        let graph = DependencyGraph::from_document(doc);
        for dep in deps.iter().filter(|d| !current.depends_on.contains(d)) {
            if let Some(cycle) = detect_cycle_on_add(&graph, id, dep) {
                return Err(PreconditionError::CycleDetected(cycle.to_string()));
            }
        }
    }

    let mut next = current.clone();
    let mut changed: Vec<&str> = Vec::new();
    macro_rules! apply {
        ($field:ident, $value:expr) => {
            if let Some(value) = $value {
                if next.$field != value {
                    next.$field = value;
                    changed.push(stringify!($field));
                }
            }
        };
    }
    apply!(title, edit.title.map(|t| t.trim().to_string()));
    apply!(status, edit.status);
    apply!(priority, edit.priority);
    apply!(assigned_to, edit.assigned_to);
    apply!(due, edit.due);
    apply!(tags, edit.tags.map(dedup_ordered));
    apply!(depends_on, depends_on);
    apply!(blocks, blocks);
    apply!(estimated_hours, edit.estimated_hours);
    apply!(actual_hours, edit.actual_hours);
    apply!(description, edit.description);

    if changed.is_empty() {
        return Err(PreconditionError::NothingToChange { id: id.to_string() });
    }

    let status_moved = next.status != current.status;
    let priority_moved = next.priority != current.priority;
    let mut note = changed.join(", ");
    if status_moved && priority_moved {
        note.push_str(&format!(" (priority {} -> {})", current.priority, next.priority));
    }
    let mut edited = entry(now, actor, actions::EDITED).with_note(note);
    if status_moved {
        edited = edited.with_transition(current.status, next.status);
    } else if priority_moved {
        edited = edited.with_transition(current.priority, next.priority);
    }
    if let Some(task) = doc.task_mut(id) {
        *task = next;
    }
    record(doc, id, edited);
    Ok(())
}

// ---------------------------------------------------------------------------
// Delete / comment / deliverables
// ---------------------------------------------------------------------------

/// Remove a task and return it. References to it elsewhere are left as-is.
///
/// # Errors
///
/// Unknown task; without `force`, a task others depend on or one with an
/// active claim.
pub fn delete_task(
    doc: &mut Document,
    id: &str,
    actor: &str,
    force: bool,
    now: DateTime<Utc>,
) -> OpResult<Task> {
    let actor = &require_actor(actor)?;
    let task = require_task(doc, id)?;
    if !force {
        let graph = DependencyGraph::from_document(doc);
        let dependents: Vec<String> = graph
            .dependents_of(id)
            .into_iter()
            .filter(|d| graph.contains(d))
            .map(ToString::to_string)
            .collect();
        if !dependents.is_empty() {
            return Err(PreconditionError::HasDependents {
                id: id.to_string(),
                dependents,
            });
        }
        if let Some(by) = &task.claimed_by {
            return Err(PreconditionError::ActiveClaim {
                id: id.to_string(),
                by: by.clone(),
            });
        }
    }

    let Some(index) = doc.task_index(id) else {
        return Err(PreconditionError::TaskNotFound { id: id.to_string() });
    };
    let removed = doc.tasks.remove(index);
    doc.touch(now);
    tracing::info!(task = %id, actor = %actor, force, "deleted task");
    Ok(removed)
}

/// Append a comment to a task's history.
///
/// # Errors
///
/// Unknown task or an empty comment.
pub fn comment_on_task(
    doc: &mut Document,
    id: &str,
    actor: &str,
    text: &str,
    now: DateTime<Utc>,
) -> OpResult<()> {
    let actor = &require_actor(actor)?;
    require_task(doc, id)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(PreconditionError::EmptyComment { id: id.to_string() });
    }
    record(doc, id, entry(now, actor, actions::COMMENTED).with_note(text));
    Ok(())
}

/// Tick or untick a named deliverable.
///
/// # Errors
///
/// Unknown task or deliverable, or a deliverable already in that state.
pub fn set_deliverable(
    doc: &mut Document,
    id: &str,
    name: &str,
    done: bool,
    actor: &str,
    now: DateTime<Utc>,
) -> OpResult<()> {
    let actor = &require_actor(actor)?;
    let task = require_task(doc, id)?;
    let Some(index) = task.deliverables.iter().position(|d| d.name == name) else {
        return Err(PreconditionError::DeliverableNotFound {
            id: id.to_string(),
            name: name.to_string(),
        });
    };
    if task.deliverables[index].done == done {
        return Err(PreconditionError::NothingToChange { id: id.to_string() });
    }

    if let Some(task) = doc.task_mut(id) {
        task.deliverables[index].done = done;
    }
    let state = if done { "done" } else { "open" };
    record(
        doc,
        id,
        entry(now, actor, actions::DELIVERABLE).with_note(format!("{name}: {state}")),
    );
    Ok(())
}

fn require_hours(field: &str, hours: Option<f64>) -> OpResult<()> {
    match hours {
        Some(h) if !h.is_finite() || h < 0.0 => Err(PreconditionError::InvalidHours {
            field: field.to_string(),
        }),
        _ => Ok(()),
    }
}

fn clear_working_on(doc: &mut Document, agent: &str, id: &str, now: DateTime<Utc>) {
    if let Some(agent) = doc.agent_mut(agent) {
        if agent.working_on.as_deref() == Some(id) {
            agent.working_on = None;
            agent.status = AgentStatus::Idle;
        }
        agent.last_active = Some(now);
    }
}
