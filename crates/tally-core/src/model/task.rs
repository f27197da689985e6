use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The seven workflow states a task can be in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
    Blocked,
    Reopened,
}

impl Status {
    pub const ALL: [Self; 7] = [
        Self::Backlog,
        Self::Todo,
        Self::InProgress,
        Self::Review,
        Self::Done,
        Self::Blocked,
        Self::Reopened,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Reopened => "reopened",
        }
    }

    /// Map a trailing heading glyph to a status.
    #[must_use]
    pub fn from_glyph(glyph: &str) -> Option<Self> {
        match glyph.trim_end_matches('\u{fe0f}') {
            "✅" | "✔" => Some(Self::Done),
            "🚧" | "🔨" => Some(Self::InProgress),
            "👀" => Some(Self::Review),
            "📋" => Some(Self::Todo),
            "💤" => Some(Self::Backlog),
            "⛔" | "🔒" | "🚫" => Some(Self::Blocked),
            "🔄" => Some(Self::Reopened),
            _ => None,
        }
    }

    /// Whether a claimant can still pick this task up.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Task priority.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// One entry of a task's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: DateTime<Utc>,
    pub who: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl HistoryEntry {
    pub fn new(ts: DateTime<Utc>, who: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            ts,
            who: who.into(),
            action: action.into(),
            note: None,
            from: None,
            to: None,
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn with_transition(mut self, from: impl fmt::Display, to: impl fmt::Display) -> Self {
        self.from = Some(from.to_string());
        self.to = Some(to.to_string());
        self
    }
}

/// Append-only audit trail.
///
/// Entries can be read and appended, never removed, reordered or edited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<HistoryEntry>);

impl History {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.0.push(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[HistoryEntry] {
        &self.0
    }
}

impl From<Vec<HistoryEntry>> for History {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        Self(entries)
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A named deliverable with a completion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    pub name: String,
    #[serde(default)]
    pub done: bool,
}

/// A unit of work in the ledger.
///
/// `assigned_to`, `claimed_by`, `depends_on` and `blocks` are weak references:
/// plain identifiers resolved by lookup and allowed to dangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: Status,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    pub claimed_by: Option<String>,
    pub created_by: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub due: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
    pub blocks: Vec<String>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub description: String,
    pub history: History,
    pub deliverables: Vec<Deliverable>,
}

impl Task {
    /// A task carrying only an id, a title and safe defaults.
    pub fn minimal(id: impl Into<String>, title: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: Status::default(),
            priority: Priority::default(),
            assigned_to: None,
            claimed_by: None,
            created_by: String::new(),
            created: ts,
            updated: ts,
            due: None,
            tags: Vec::new(),
            depends_on: Vec::new(),
            blocks: Vec::new(),
            estimated_hours: None,
            actual_hours: None,
            description: String::new(),
            history: History::new(),
            deliverables: Vec::new(),
        }
    }

    /// Record an audit entry and refresh `updated`.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.updated = entry.ts;
        self.history.append(entry);
    }

    /// Numeric suffix of the id (`TASK-042` → 42), if any.
    #[must_use]
    pub fn id_number(&self) -> Option<u64> {
        id_number(&self.id)
    }
}

/// Numeric suffix of a task id after its last `-`.
#[must_use]
pub fn id_number(id: &str) -> Option<u64> {
    id.rsplit_once('-').and_then(|(_, n)| n.parse().ok())
}

/// Mint a task id from a prefix and counter value.
#[must_use]
pub fn format_task_id(prefix: &str, n: u64) -> String {
    format!("{prefix}-{n:03}")
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase and fold every run of non-alphanumerics into one `_`.
pub(crate) fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.trim().chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "backlog" | "icebox" => Ok(Self::Backlog),
            "todo" | "to_do" | "open" | "ready" => Ok(Self::Todo),
            "in_progress" | "inprogress" | "wip" | "doing" | "started" | "active" => {
                Ok(Self::InProgress)
            }
            "review" | "in_review" | "reviewing" => Ok(Self::Review),
            "done" | "complete" | "completed" | "closed" | "finished" => Ok(Self::Done),
            "blocked" | "on_hold" => Ok(Self::Blocked),
            "reopened" | "reopen" => Ok(Self::Reopened),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "urgent" | "critical" | "p0" => Ok(Self::Urgent),
            "high" | "p1" => Ok(Self::High),
            "medium" | "normal" | "med" | "p2" => Ok(Self::Medium),
            "low" | "minor" | "p3" => Ok(Self::Low),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}
