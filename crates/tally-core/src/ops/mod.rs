//! In-memory operations on a [`Document`].
//!
//! Every operation takes the document, the acting agent and the wall-clock
//! time, checks all of its preconditions first, and only then mutates.
//! A refused operation returns a [`PreconditionError`] and leaves the document
//! exactly as it was.
//!
//! Successful operations append history (one entry per touched task) and
//! refresh both the task's and the document's `updated` timestamps. They do
//! no I/O; [`crate::store::Ledger`] wraps them in a read/write cycle.

use chrono::{DateTime, Utc};

use crate::error::PreconditionError;
use crate::model::{Document, HistoryEntry, Task, normalize_agent_name};

pub mod agent;
pub mod maintenance;
pub mod task;

pub use agent::{AgentUpdate, register_agent, set_agent_status};
pub use maintenance::{archive_completed, repair_next_id};
pub use task::{
    NewTask, TaskEdit, claim_task, comment_on_task, complete_task, create_task, delete_task,
    edit_task, release_task, reopen_task, set_deliverable,
};

/// History `action` values written by the operations.
pub mod actions {
    pub const CREATED: &str = "created";
    pub const CLAIMED: &str = "claimed";
    pub const RELEASED: &str = "released";
    pub const COMPLETED: &str = "completed";
    pub const UNBLOCKED: &str = "unblocked";
    pub const EDITED: &str = "edited";
    pub const REOPENED: &str = "reopened";
    pub const COMMENTED: &str = "commented";
    pub const DELIVERABLE: &str = "deliverable";
}

pub type OpResult<T> = Result<T, PreconditionError>;

/// Reject an empty actor and return it with its leading `@`.
pub(crate) fn require_actor(actor: &str) -> OpResult<String> {
    let name = normalize_agent_name(actor);
    if name.is_empty() {
        return Err(PreconditionError::EmptyActor);
    }
    Ok(name)
}

pub(crate) fn require_task<'d>(doc: &'d Document, id: &str) -> OpResult<&'d Task> {
    doc.task(id).ok_or_else(|| PreconditionError::TaskNotFound { id: id.to_string() })
}

/// Append `entry` to task `id` and bump the document timestamp.
///
/// Callers have already checked that the task exists.
pub(crate) fn record(doc: &mut Document, id: &str, entry: HistoryEntry) {
    let now = entry.ts;
    if let Some(task) = doc.task_mut(id) {
        task.record(entry);
    }
    doc.touch(now);
}

pub(crate) fn entry(now: DateTime<Utc>, actor: &str, action: &str) -> HistoryEntry {
    HistoryEntry::new(now, actor, action)
}
