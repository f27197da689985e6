//! Dual-dialect ledger reader.
//!
//! Turns ledger text into a [`Document`] plus a list of non-fatal
//! [`ParseIssue`]s. Reading never fails: malformed pieces degrade to
//! defaults and are reported instead.
//!
//! # Pipeline
//!
//! 1. [`frontmatter::split`] separates the YAML front matter from the body and
//!    decodes [`ProjectMeta`](crate::model::ProjectMeta) field by field.
//! 2. [`roster::extract_agents`] reads the agent table.
//! 3. Two independent scanners read tasks:
//!    - [`strict::scan`] for `### ID · Title` headings with a fenced YAML block,
//!    - [`freeform::scan`] for `## ID: Title` headings with bold key lines.
//! 4. [`merge_tasks`] keeps every strict task and drops any freeform task whose
//!    id a strict block already produced. The two are never merged field by field.

pub mod freeform;
pub mod frontmatter;
pub mod roster;
pub mod strict;
pub mod values;

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{Document, Task};

// ---------------------------------------------------------------------------
// ParseIssue
// ---------------------------------------------------------------------------

/// What part of the ledger an issue was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Front matter missing, unterminated, or not valid YAML.
    Frontmatter,
    /// A single front-matter field had the wrong shape.
    MetaField,
    /// An agent table row could not be read.
    AgentRow,
    /// A task heading without a usable structured block.
    TaskBlock,
    /// A single task field had the wrong shape and was defaulted.
    TaskField,
    /// A freeform task was discarded because a strict block has the same id.
    ShadowedTask,
    /// The file held bytes that are not UTF-8; they were replaced on read.
    Encoding,
}

impl IssueKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Frontmatter => "frontmatter",
            Self::MetaField => "meta_field",
            Self::AgentRow => "agent_row",
            Self::TaskBlock => "task_block",
            Self::TaskField => "task_field",
            Self::ShadowedTask => "shadowed_task",
            Self::Encoding => "encoding",
        }
    }
}

/// A non-fatal problem encountered while reading.
///
/// `recoverable` is `true` when nothing written in the ledger was lost
/// (a value was only normalised or defaulted), and `false` when some
/// content could not be carried into the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseIssue {
    pub kind: IssueKind,
    pub task_id: Option<String>,
    pub message: String,
    pub recoverable: bool,
}

impl ParseIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            task_id: None,
            message: message.into(),
            recoverable: true,
        }
    }

    #[must_use]
    pub fn for_task(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    #[must_use]
    pub const fn lossy(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task_id {
            Some(id) => write!(f, "[{}] {}: {}", self.kind.as_str(), id, self.message),
            None => write!(f, "[{}] {}", self.kind.as_str(), self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse ledger text into a best-effort document and the issues found.
#[must_use]
pub fn parse_document(text: &str) -> (Document, Vec<ParseIssue>) {
    let mut issues = Vec::new();

    let (meta, body) = frontmatter::split(text, &mut issues);
    let lines: Vec<&str> = body.lines().collect();

    let preamble = extract_preamble(&lines);
    let agents = roster::extract_agents(&lines, &mut issues);

    let (strict_tasks, strict_issues) = strict::scan(&lines, meta.created);
    let (freeform_tasks, freeform_issues) = freeform::scan(&lines, meta.created);
    issues.extend(strict_issues);
    issues.extend(freeform_issues);

    let tasks = merge_tasks(strict_tasks, freeform_tasks, &mut issues);

    debug!(
        tasks = tasks.len(),
        agents = agents.len(),
        issues = issues.len(),
        "parsed ledger"
    );

    (
        Document {
            meta,
            preamble,
            agents,
            tasks,
        },
        issues,
    )
}

/// Combine the two scanners' output: strict first, then unshadowed freeform.
#[must_use]
pub fn merge_tasks(strict: Vec<Task>, freeform: Vec<Task>, issues: &mut Vec<ParseIssue>) -> Vec<Task> {
    let seen: HashSet<String> = strict.iter().map(|t| t.id.clone()).collect();
    let mut tasks = strict;

    for task in freeform {
        if seen.contains(&task.id) {
            warn!(id = %task.id, "freeform task shadowed by structured block");
            issues.push(
                ParseIssue::new(
                    IssueKind::ShadowedTask,
                    "freeform block ignored; a structured block with the same id takes precedence",
                )
                .for_task(&task.id)
                .lossy(),
            );
            continue;
        }
        tasks.push(task);
    }

    tasks
}

/// Prose between the front matter and the first section heading.
fn extract_preamble(lines: &[&str]) -> String {
    let end = lines
        .iter()
        .position(|line| is_section_heading(line))
        .unwrap_or(lines.len());
    lines[..end].join("\n").trim().to_string()
}

/// `##` and `###` headings delimit sections; `#` titles belong to prose.
pub(crate) fn is_section_heading(line: &str) -> bool {
    line.starts_with("## ") || line.starts_with("### ")
}

/// Any markdown heading line.
pub(crate) fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}
