//! Canonical ledger writer.
//!
//! Serializes a [`Document`] to ledger text. Guarantees:
//!
//! - Always the strict dialect: freeform input comes out normalized.
//! - Every front-matter field is present, including defaulted ones.
//! - Roster columns in the fixed order of [`roster::COLUMNS`].
//! - One `### ID · Title` block per task, in document order, with the
//!   description re-emitted as a `>` blockquote.
//! - Deterministic: the same document always produces the same bytes.
//!
//! Re-reading the output gives back the same document, so
//! `parse(serialize(parse(x)))` is a fixed point after one pass.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::model::{Agent, Document, Task};
use crate::parse::frontmatter::DELIMITER;
use crate::parse::roster;
use crate::parse::strict::TITLE_SEPARATOR;

/// Heading under which the roster is written.
pub const AGENTS_HEADING: &str = "## Agents";

/// Heading written above the task blocks.
pub const TASKS_HEADING: &str = "## Tasks";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while serializing a document.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// A structured block failed to serialize.
    #[error("failed to serialize structured block: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct FrontMatter<'a> {
    project: &'a str,
    title: Option<&'a str>,
    version: &'a str,
    created: String,
    updated: String,
    states: &'a [String],
    id_prefix: &'a str,
    next_id: u64,
}

#[derive(Serialize)]
struct TaskBlock<'a> {
    status: &'static str,
    priority: &'static str,
    assigned_to: Option<&'a str>,
    claimed_by: Option<&'a str>,
    created_by: &'a str,
    created: String,
    updated: String,
    due: Option<String>,
    tags: &'a [String],
    depends_on: &'a [String],
    blocks: &'a [String],
    estimated_hours: Option<f64>,
    actual_hours: Option<f64>,
    deliverables: Vec<DeliverableBlock<'a>>,
    history: Vec<HistoryBlock<'a>>,
}

#[derive(Serialize)]
struct DeliverableBlock<'a> {
    name: &'a str,
    done: bool,
}

#[derive(Serialize)]
struct HistoryBlock<'a> {
    ts: String,
    who: &'a str,
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Serialize a whole document to canonical ledger text.
///
/// # Errors
///
/// Returns [`WriteError::Yaml`] if a structured block fails to serialize.
pub fn serialize_document(doc: &Document) -> Result<String, WriteError> {
    let mut out = String::new();

    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&front_matter(doc)?);
    out.push_str(DELIMITER);
    out.push_str("\n\n");

    if !doc.preamble.trim().is_empty() {
        out.push_str(doc.preamble.trim());
        out.push_str("\n\n");
    }

    out.push_str(AGENTS_HEADING);
    out.push_str("\n\n");
    out.push_str(&agent_table(&doc.agents));
    out.push('\n');

    out.push_str(TASKS_HEADING);
    out.push('\n');
    for task in &doc.tasks {
        out.push('\n');
        out.push_str(&task_block(task)?);
    }

    Ok(out)
}

/// Render one task in the strict dialect, ending with a newline.
///
/// # Errors
///
/// Returns [`WriteError::Yaml`] if the structured block fails to serialize.
pub fn task_block(task: &Task) -> Result<String, WriteError> {
    let block = TaskBlock {
        status: task.status.as_str(),
        priority: task.priority.as_str(),
        assigned_to: task.assigned_to.as_deref(),
        claimed_by: task.claimed_by.as_deref(),
        created_by: &task.created_by,
        created: timestamp(task.created),
        updated: timestamp(task.updated),
        due: task.due.map(|d| d.format("%Y-%m-%d").to_string()),
        tags: &task.tags,
        depends_on: &task.depends_on,
        blocks: &task.blocks,
        estimated_hours: task.estimated_hours,
        actual_hours: task.actual_hours,
        deliverables: task
            .deliverables
            .iter()
            .map(|d| DeliverableBlock {
                name: &d.name,
                done: d.done,
            })
            .collect(),
        history: task
            .history
            .iter()
            .map(|h| HistoryBlock {
                ts: timestamp(h.ts),
                who: &h.who,
                action: &h.action,
                note: h.note.as_deref(),
                from: h.from.as_deref(),
                to: h.to.as_deref(),
            })
            .collect(),
    };

    let mut out = format!(
        "### {} {TITLE_SEPARATOR} {}\n\n```yaml\n",
        task.id,
        single_line(&task.title)
    );
    out.push_str(&serde_yaml::to_string(&block)?);
    out.push_str("```\n");

    if !task.description.is_empty() {
        out.push('\n');
        out.push_str(&blockquote(&task.description));
    }

    Ok(out)
}

/// Lossless RFC 3339 rendering used for every timestamp in the ledger.
#[must_use]
pub fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// ---------------------------------------------------------------------------
// Pieces
// ---------------------------------------------------------------------------

fn front_matter(doc: &Document) -> Result<String, WriteError> {
    let meta = &doc.meta;
    let fm = FrontMatter {
        project: &meta.project,
        title: meta.title.as_deref(),
        version: &meta.version,
        created: timestamp(meta.created),
        updated: timestamp(meta.updated),
        states: &meta.states,
        id_prefix: &meta.id_prefix,
        next_id: meta.next_id,
    };
    Ok(serde_yaml::to_string(&fm)?)
}

fn agent_table(agents: &[Agent]) -> String {
    let mut out = format!("| {} |\n", roster::COLUMNS.join(" | "));
    out.push('|');
    for column in roster::COLUMNS {
        out.push_str(&"-".repeat(column.len() + 2));
        out.push('|');
    }
    out.push('\n');

    for agent in agents {
        let roles = if agent.roles.is_empty() {
            "-".to_string()
        } else {
            agent
                .roles
                .iter()
                .map(|r| r.replace(',', "\\,"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let cells = [
            agent.name.clone(),
            agent.kind.to_string(),
            roles,
            agent.status.to_string(),
            agent.working_on.clone().unwrap_or_else(|| "-".to_string()),
            agent.last_active.map_or_else(|| "-".to_string(), timestamp),
            agent.trust.to_string(),
        ];
        let cells: Vec<String> = cells.iter().map(|c| table_cell(c)).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

/// Escape a value for a pipe-table cell.
fn table_cell(raw: &str) -> String {
    let flat = single_line(raw);
    if flat.is_empty() {
        return "-".to_string();
    }
    flat.replace('|', "\\|")
}

/// Collapse line breaks so a value fits on a heading or table row.
fn single_line(raw: &str) -> String {
    raw.split(['\r', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn blockquote(text: &str) -> String {
    let mut out = String::new();
    for line in text.split('\n') {
        if line.is_empty() {
            out.push_str(">\n");
        } else {
            out.push_str("> ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentKind, HistoryEntry, Status};
    use crate::parse::parse_document;

    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    fn sample() -> Document {
        let mut doc = Document::new("acme", epoch());
        let mut agent = Agent::new("alice", AgentKind::Human);
        agent.roles = vec!["dev".into(), "ops|oncall".into()];
        doc.agents.push(agent);

        let mut task = Task::minimal("TASK-001", r#"Fix "quoted" <b>bold</b> | piped"#, epoch());
        task.status = Status::Todo;
        task.description = "first\n\n  indented\n".to_string();
        task.record(HistoryEntry::new(epoch(), "@alice", "created").with_note("multi\nline"));
        doc.tasks.push(task);
        doc
    }

    #[test]
    fn output_reparses_to_same_document() {
        let doc = sample();
        let text = serialize_document(&doc).unwrap();
        let (reparsed, issues) = parse_document(&text);
        assert!(issues.is_empty(), "{issues:?}\n{text}");
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn all_meta_fields_are_emitted() {
        let text = serialize_document(&Document::default()).unwrap();
        for key in [
            "project:", "title:", "version:", "created:", "updated:", "states:", "id_prefix:", "next_id:",
        ] {
            assert!(text.contains(key), "missing {key} in\n{text}");
        }
    }

    #[test]
    fn heading_and_table_stay_well_formed() {
        let text = serialize_document(&sample()).unwrap();
        assert!(text.contains("### TASK-001 · Fix \"quoted\" <b>bold</b> | piped\n"));
        assert!(text.contains(r"dev, ops\|oncall"));
    }

    #[test]
    fn titles_are_flattened() {
        let mut task = Task::minimal("TASK-002", "two\nlines", epoch());
        task.description = String::new();
        let block = task_block(&task).unwrap();
        assert!(block.starts_with("### TASK-002 · two lines\n"));
        assert!(!block.contains('>'));
    }

    #[test]
    fn blockquote_marks_empty_lines() {
        assert_eq!(blockquote("a\n\nb"), "> a\n>\n> b\n");
    }
}
