use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::Agent;
use super::task::{Status, Task, format_task_id};

/// Schema version written into new ledgers.
pub const SCHEMA_VERSION: &str = "1";

/// Id prefix used when a ledger does not declare one.
pub const DEFAULT_ID_PREFIX: &str = "TASK";

/// Ledger-wide metadata stored in the front matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub project: String,
    pub title: Option<String>,
    pub version: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub states: Vec<String>,
    pub id_prefix: String,
    /// Counter for the next minted id. Always above every existing id suffix.
    pub next_id: u64,
}

impl ProjectMeta {
    pub fn new(project: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            project: project.into(),
            title: None,
            version: SCHEMA_VERSION.to_string(),
            created: now,
            updated: now,
            states: default_states(),
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            next_id: 1,
        }
    }
}

impl Default for ProjectMeta {
    fn default() -> Self {
        Self {
            project: String::new(),
            title: None,
            version: String::new(),
            created: DateTime::<Utc>::UNIX_EPOCH,
            updated: DateTime::<Utc>::UNIX_EPOCH,
            states: default_states(),
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            next_id: 1,
        }
    }
}

#[must_use]
pub fn default_states() -> Vec<String> {
    Status::ALL.iter().map(|s| s.as_str().to_string()).collect()
}

/// The whole ledger: metadata, optional prose, roster and tasks in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub meta: ProjectMeta,
    pub preamble: String,
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
}

impl Document {
    pub fn new(project: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            meta: ProjectMeta::new(project, now),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    #[must_use]
    pub fn task_index(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    #[must_use]
    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn agent_mut(&mut self, name: &str) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.name == name)
    }

    /// Largest numeric id suffix present in the document.
    #[must_use]
    pub fn max_id_number(&self) -> Option<u64> {
        self.tasks.iter().filter_map(Task::id_number).max()
    }

    /// Raise `next_id` above every existing id. Never lowers it.
    ///
    /// Saturates at `u64::MAX`. Returns the previous value when it had to move.
    pub fn raise_next_id(&mut self) -> Option<u64> {
        let floor = self.max_id_number().map_or(1, |n| n.saturating_add(1));
        if self.meta.next_id < floor {
            let previous = self.meta.next_id;
            self.meta.next_id = floor;
            Some(previous)
        } else {
            None
        }
    }

    /// Mint the next task id and advance the counter.
    ///
    /// `None` once the counter can no longer move past an unused value; the
    /// counter is then left alone.
    pub(crate) fn mint_id(&mut self) -> Option<String> {
        let max = self.max_id_number();
        let floor = max.map_or(1, |n| n.saturating_add(1));
        let n = self.meta.next_id.max(floor);
        if max.is_some_and(|max| max >= n) {
            return None;
        }
        self.meta.next_id = n.checked_add(1)?;
        Some(format_task_id(&self.meta.id_prefix, n))
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.meta.updated = now;
    }
}
